use std::collections::{HashMap, HashSet};

use thiserror::Error;
use validator::Validate;

use crate::db::models::{Exam, Question, Student};
use crate::db::types::ExamStatus;
use crate::services::assignment::{self, AssignmentIssue, AssignmentReport};

#[derive(Debug, Error)]
pub(crate) enum ExamRuleError {
    #[error("exam is invalid: {}", .problems.join("; "))]
    Validation { problems: Vec<String>, failing_students: Vec<String> },
    #[error("cannot move exam from {} to {}", .from.as_str(), .to.as_str())]
    Transition { from: ExamStatus, to: ExamStatus },
}

impl ExamRuleError {
    /// `blocking` are the assignment issues that caused the rejection.
    fn from_problems(problems: Vec<String>, blocking: Vec<AssignmentIssue>) -> Self {
        let failing_students = AssignmentReport { issues: blocking }.failing_students();
        ExamRuleError::Validation { problems, failing_students }
    }
}

/// `roster` should hold the roster entries of the exam's assigned students.
pub(crate) fn assignment_report(
    exam: &Exam,
    questions: &[Question],
    roster: &[Student],
) -> AssignmentReport {
    let bank: HashSet<&str> = questions.iter().map(|question| question.id.as_str()).collect();
    let standing: HashMap<&str, _> =
        roster.iter().map(|student| (student.id.as_str(), student.status)).collect();
    assignment::validate(
        &exam.assigned_student_ids.0,
        &exam.question_assignments.0,
        &bank,
        &standing,
    )
}

/// Checks an exam and its bank before any write.
///
/// Drafts may be saved with incomplete assignments or students not yet on the
/// roster; any other status must satisfy the full assignment invariant.
pub(crate) fn validate_for_save(
    exam: &Exam,
    questions: &[Question],
    roster: &[Student],
) -> Result<AssignmentReport, ExamRuleError> {
    let mut problems = Vec::new();

    if let Err(errors) = exam.validate() {
        problems.push(errors.to_string());
    }

    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            problems.push(format!("question id {} is used more than once", question.id));
        }
        if question.exam_id != exam.id {
            problems.push(format!("question {} belongs to another exam", question.id));
        }
        if let Err(errors) = question.validate() {
            problems.push(format!("question {}: {errors}", question.id));
        }
        if let Some(violation) = question.invariant_violation() {
            problems.push(violation);
        }
    }

    let report = assignment_report(exam, questions, roster);
    let require_complete = exam.status != ExamStatus::Draft;
    let blocking: Vec<AssignmentIssue> = report
        .issues
        .iter()
        .filter(|issue| require_complete || issue.blocks_save())
        .cloned()
        .collect();
    problems.extend(blocking.iter().map(AssignmentIssue::describe));

    if problems.is_empty() {
        Ok(report)
    } else {
        Err(ExamRuleError::from_problems(problems, blocking))
    }
}

pub(crate) fn is_allowed_transition(from: ExamStatus, to: ExamStatus) -> bool {
    use ExamStatus::*;
    matches!(
        (from, to),
        (Draft, Published) | (Published, Ongoing) | (Ongoing, Completed) | (Published, Draft)
    )
}

pub(crate) fn check_transition(
    exam: &Exam,
    questions: &[Question],
    roster: &[Student],
    to: ExamStatus,
) -> Result<(), ExamRuleError> {
    if !is_allowed_transition(exam.status, to) {
        return Err(ExamRuleError::Transition { from: exam.status, to });
    }

    if exam.status == ExamStatus::Draft {
        let report = assignment_report(exam, questions, roster);
        if !report.is_clean() {
            let problems = report.issues.iter().map(|issue| issue.describe()).collect();
            return Err(ExamRuleError::from_problems(problems, report.issues));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures::{assign, descriptive, exam, mcq, student};
    use crate::db::types::StudentStatus;

    fn bank() -> Vec<Question> {
        vec![mcq("q1", &["A", "B"], "A"), descriptive("q2", "essay")]
    }

    fn roster() -> Vec<Student> {
        vec![student("s1", StudentStatus::Active), student("s2", StudentStatus::Active)]
    }

    #[test]
    fn only_forward_moves_and_unpublish_are_allowed() {
        use ExamStatus::*;
        assert!(is_allowed_transition(Draft, Published));
        assert!(is_allowed_transition(Published, Ongoing));
        assert!(is_allowed_transition(Ongoing, Completed));
        assert!(is_allowed_transition(Published, Draft));
        assert!(!is_allowed_transition(Draft, Ongoing));
        assert!(!is_allowed_transition(Completed, Ongoing));
        assert!(!is_allowed_transition(Ongoing, Draft));
    }

    #[test]
    fn publishing_requires_complete_assignments() {
        let mut draft = exam("exam-1", ExamStatus::Draft, &["s1", "s2"]);
        assign(&mut draft, "s1", &["q1"]);

        match check_transition(&draft, &bank(), &roster(), ExamStatus::Published) {
            Err(ExamRuleError::Validation { failing_students, .. }) => {
                assert_eq!(failing_students, vec!["s2".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assign(&mut draft, "s2", &["q1", "q2"]);
        assert!(check_transition(&draft, &bank(), &roster(), ExamStatus::Published).is_ok());
    }

    #[test]
    fn drafts_save_with_incomplete_assignments() {
        let draft = exam("exam-1", ExamStatus::Draft, &["s1"]);
        let report = validate_for_save(&draft, &bank(), &roster()).expect("draft saves");
        assert_eq!(report.flagged_students(), vec!["s1".to_string()]);
    }

    #[test]
    fn published_exams_must_stay_complete() {
        let published = exam("exam-1", ExamStatus::Published, &["s1"]);
        assert!(validate_for_save(&published, &bank(), &roster()).is_err());
    }

    #[test]
    fn unknown_question_ids_block_any_save() {
        let mut draft = exam("exam-1", ExamStatus::Draft, &["s1"]);
        assign(&mut draft, "s1", &["q1", "missing"]);

        let err = validate_for_save(&draft, &bank(), &roster()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn invalid_questions_and_fields_are_all_reported() {
        let mut draft = exam("exam-1", ExamStatus::Draft, &[]);
        draft.title.clear();
        let questions = vec![mcq("q1", &["A", "B"], "C"), mcq("q1", &["A", "B"], "A")];

        match validate_for_save(&draft, &questions, &roster()) {
            Err(ExamRuleError::Validation { problems, .. }) => assert!(problems.len() >= 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn publishing_requires_active_roster_entries() {
        let mut draft = exam("exam-1", ExamStatus::Draft, &[]);
        assign(&mut draft, "s1", &["q1"]);
        assign(&mut draft, "s2", &["q2"]);
        assign(&mut draft, "s9", &["q1"]);
        let mut roster = roster();
        roster[1].status = StudentStatus::Inactive;

        assert!(validate_for_save(&draft, &bank(), &roster).is_ok());
        match check_transition(&draft, &bank(), &roster, ExamStatus::Published) {
            Err(ExamRuleError::Validation { problems, failing_students }) => {
                assert_eq!(failing_students, vec!["s2".to_string(), "s9".to_string()]);
                assert!(problems.iter().any(|problem| problem.contains("s9 is not on the roster")));
                assert!(problems.iter().any(|problem| problem.contains("s2 is inactive")));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        draft.status = ExamStatus::Published;
        assert!(validate_for_save(&draft, &bank(), &roster).is_err());
    }

    #[test]
    fn rejected_drafts_name_only_the_blocking_students() {
        let mut draft = exam("exam-1", ExamStatus::Draft, &[]);
        assign(&mut draft, "s1", &["q1", "missing"]);
        assign(&mut draft, "s9", &["q1"]);

        match validate_for_save(&draft, &bank(), &roster()) {
            Err(ExamRuleError::Validation { failing_students, .. }) => {
                assert_eq!(failing_students, vec!["s1".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
