use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::db::types::StudentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum AssignmentIssue {
    NoStudentsAssigned,
    MissingAssignment { student_id: String },
    EmptyAssignment { student_id: String },
    UnknownQuestions { student_id: String, question_ids: Vec<String> },
    UnassignedStudent { student_id: String },
    UnknownStudent { student_id: String },
    InactiveStudent { student_id: String },
}

impl AssignmentIssue {
    pub(crate) fn student_id(&self) -> Option<&str> {
        match self {
            AssignmentIssue::NoStudentsAssigned => None,
            AssignmentIssue::MissingAssignment { student_id }
            | AssignmentIssue::EmptyAssignment { student_id }
            | AssignmentIssue::UnknownQuestions { student_id, .. }
            | AssignmentIssue::UnassignedStudent { student_id }
            | AssignmentIssue::UnknownStudent { student_id }
            | AssignmentIssue::InactiveStudent { student_id } => Some(student_id),
        }
    }

    /// Issues that make the stored document inconsistent, as opposed to merely incomplete.
    pub(crate) fn blocks_save(&self) -> bool {
        matches!(
            self,
            AssignmentIssue::UnknownQuestions { .. } | AssignmentIssue::UnassignedStudent { .. }
        )
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            AssignmentIssue::NoStudentsAssigned => "no students are assigned".to_string(),
            AssignmentIssue::MissingAssignment { student_id } => {
                format!("student {student_id} has no question assignment")
            }
            AssignmentIssue::EmptyAssignment { student_id } => {
                format!("student {student_id} has an empty question assignment")
            }
            AssignmentIssue::UnknownQuestions { student_id, question_ids } => format!(
                "student {student_id} is assigned questions outside the bank: {}",
                question_ids.join(", ")
            ),
            AssignmentIssue::UnassignedStudent { student_id } => {
                format!("assignment for {student_id} who is not an assigned student")
            }
            AssignmentIssue::UnknownStudent { student_id } => {
                format!("student {student_id} is not on the roster")
            }
            AssignmentIssue::InactiveStudent { student_id } => {
                format!("student {student_id} is inactive")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct AssignmentReport {
    pub(crate) issues: Vec<AssignmentIssue>,
}

impl AssignmentReport {
    pub(crate) fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Students assigned to the exam without a non-empty question set.
    pub(crate) fn flagged_students(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                AssignmentIssue::MissingAssignment { student_id }
                | AssignmentIssue::EmptyAssignment { student_id } => Some(student_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every student id mentioned by any issue, deduplicated and sorted.
    pub(crate) fn failing_students(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter_map(AssignmentIssue::student_id)
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Collects every assignment problem in one pass instead of stopping at the first.
///
/// `roster` holds the standing of every assigned student found on the roster.
pub(crate) fn validate(
    assigned_student_ids: &[String],
    assignments: &BTreeMap<String, Vec<String>>,
    question_bank_ids: &HashSet<&str>,
    roster: &HashMap<&str, StudentStatus>,
) -> AssignmentReport {
    let mut issues = Vec::new();

    if assigned_student_ids.is_empty() {
        issues.push(AssignmentIssue::NoStudentsAssigned);
    }

    let mut seen = HashSet::new();
    for student_id in assigned_student_ids {
        if !seen.insert(student_id.as_str()) {
            continue;
        }
        match assignments.get(student_id) {
            None => issues.push(AssignmentIssue::MissingAssignment { student_id: student_id.clone() }),
            Some(question_ids) if question_ids.is_empty() => {
                issues.push(AssignmentIssue::EmptyAssignment { student_id: student_id.clone() })
            }
            Some(_) => {}
        }
        match roster.get(student_id.as_str()) {
            None => issues.push(AssignmentIssue::UnknownStudent { student_id: student_id.clone() }),
            Some(StudentStatus::Inactive) => {
                issues.push(AssignmentIssue::InactiveStudent { student_id: student_id.clone() })
            }
            Some(StudentStatus::Active) => {}
        }
    }

    for (student_id, question_ids) in assignments {
        if !seen.contains(student_id.as_str()) {
            issues.push(AssignmentIssue::UnassignedStudent { student_id: student_id.clone() });
        }
        let unknown: Vec<String> = question_ids
            .iter()
            .filter(|id| !question_bank_ids.contains(id.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            issues.push(AssignmentIssue::UnknownQuestions {
                student_id: student_id.clone(),
                question_ids: unknown,
            });
        }
    }

    AssignmentReport { issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn map(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries.iter().map(|(student, questions)| (student.to_string(), ids(questions))).collect()
    }

    fn bank(values: &[&'static str]) -> HashSet<&'static str> {
        values.iter().copied().collect()
    }

    fn active(values: &[&'static str]) -> HashMap<&'static str, StudentStatus> {
        values.iter().map(|id| (*id, StudentStatus::Active)).collect()
    }

    #[test]
    fn flags_students_without_an_assignment() {
        let report = validate(
            &ids(&["s1", "s2"]),
            &map(&[("s1", &["q1"])]),
            &bank(&["q1"]),
            &active(&["s1", "s2"]),
        );
        assert_eq!(report.flagged_students(), ids(&["s2"]));
    }

    #[test]
    fn flags_empty_assignments_and_reports_all_at_once() {
        let report = validate(
            &ids(&["s1", "s2", "s3"]),
            &map(&[("s1", &[]), ("s2", &["q1"])]),
            &bank(&["q1"]),
            &active(&["s1", "s2", "s3"]),
        );
        assert_eq!(report.flagged_students(), ids(&["s1", "s3"]));
        assert!(!report.is_clean());
    }

    #[test]
    fn clean_when_every_student_has_known_questions() {
        let report = validate(
            &ids(&["s1", "s2"]),
            &map(&[("s1", &["q1"]), ("s2", &["q1", "q2"])]),
            &bank(&["q1", "q2"]),
            &active(&["s1", "s2"]),
        );
        assert!(report.is_clean());
        assert!(report.flagged_students().is_empty());
    }

    #[test]
    fn empty_assignment_list_is_an_issue() {
        let report = validate(&[], &BTreeMap::new(), &bank(&["q1"]), &HashMap::new());
        assert_eq!(report.issues, vec![AssignmentIssue::NoStudentsAssigned]);
        assert!(report.failing_students().is_empty());
    }

    #[test]
    fn unknown_ids_and_stray_keys_are_separate_from_the_flagged_set() {
        let report = validate(
            &ids(&["s1"]),
            &map(&[("s1", &["q1", "q9"]), ("ghost", &["q1"])]),
            &bank(&["q1"]),
            &active(&["s1", "ghost"]),
        );
        assert!(report.flagged_students().is_empty());
        assert!(report.issues.iter().all(AssignmentIssue::blocks_save));
        assert_eq!(report.failing_students(), ids(&["ghost", "s1"]));
        assert!(report.issues.contains(&AssignmentIssue::UnknownQuestions {
            student_id: "s1".to_string(),
            question_ids: ids(&["q9"]),
        }));
    }

    #[test]
    fn flagged_set_matches_definition_for_mixed_rosters() {
        let assigned = ids(&["a", "b", "c", "d"]);
        let assignments = map(&[("a", &["q1"]), ("b", &[]), ("d", &["q2"])]);
        let roster = active(&["a", "b", "c", "d"]);
        let report = validate(&assigned, &assignments, &bank(&["q1", "q2"]), &roster);

        let expected: Vec<String> = assigned
            .iter()
            .filter(|s| assignments.get(*s).map_or(true, Vec::is_empty))
            .cloned()
            .collect();
        assert_eq!(report.flagged_students(), expected);
    }

    #[test]
    fn unknown_and_inactive_students_are_reported_but_do_not_block_drafts() {
        let mut roster = active(&["s1"]);
        roster.insert("s2", StudentStatus::Inactive);
        let report = validate(
            &ids(&["s1", "s2", "s3"]),
            &map(&[("s1", &["q1"]), ("s2", &["q1"]), ("s3", &["q1"])]),
            &bank(&["q1"]),
            &roster,
        );

        assert_eq!(
            report.issues,
            vec![
                AssignmentIssue::InactiveStudent { student_id: "s2".to_string() },
                AssignmentIssue::UnknownStudent { student_id: "s3".to_string() },
            ]
        );
        assert!(report.issues.iter().all(|issue| !issue.blocks_save()));
        assert!(report.flagged_students().is_empty());
        assert_eq!(report.failing_students(), ids(&["s2", "s3"]));
    }
}
