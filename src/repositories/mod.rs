//! Store boundary for exams, question banks, submissions and the student roster.
//!
//! Every document is checked on the way in and on the way out: required fields,
//! the question invariant and the schema version. Callers never see a loosely
//! shaped document.

pub(crate) mod exams;
pub(crate) mod memory;
pub(crate) mod postgres;
pub(crate) mod questions;
pub(crate) mod students;
pub(crate) mod submissions;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;
use validator::Validate;

use crate::db::models::{Exam, Question, Student, Submission, SCHEMA_VERSION};
use crate::db::types::{ExamStatus, StudentStatus};

pub(crate) use memory::MemoryExamStore;
pub(crate) use postgres::PgExamStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed {kind} document {id}: {reason}")]
    Malformed { kind: &'static str, id: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Conflict(String),
}

impl StoreError {
    /// Maps a unique-key violation to `Conflict`; anything else stays a database error.
    pub(crate) fn from_write(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        let duplicate =
            err.as_database_error().is_some_and(|db_err| db_err.is_unique_violation());
        if duplicate {
            StoreError::Conflict(conflict())
        } else {
            StoreError::Database(err)
        }
    }
}

/// A graded attempt ready to be written. The store assigns `id` and `submitted_at`.
#[derive(Debug, Clone)]
pub(crate) struct NewSubmission {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) answers: BTreeMap<String, String>,
    pub(crate) score: i32,
    pub(crate) total_auto_graded: i32,
    pub(crate) total_questions: i32,
    pub(crate) question_snapshot: Option<Vec<Question>>,
}

/// Document counts for the admin overview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PortalTotals {
    pub(crate) students: u64,
    pub(crate) active_students: u64,
    pub(crate) submissions: u64,
    pub(crate) exams_by_status: BTreeMap<&'static str, u64>,
}

impl PortalTotals {
    pub(crate) fn exams(&self) -> u64 {
        self.exams_by_status.values().sum()
    }
}

#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;

    async fn list_exams(&self, status: Option<ExamStatus>) -> Result<Vec<Exam>, StoreError>;

    /// Published or ongoing exams whose `assigned_student_ids` contain `student_id`.
    async fn list_exams_for_student(&self, student_id: &str) -> Result<Vec<Exam>, StoreError>;

    /// Writes the exam and its question bank in one unit.
    async fn insert_exam(&self, exam: &Exam, questions: &[Question]) -> Result<(), StoreError>;

    /// Replaces exam metadata and the whole question bank in one unit.
    /// Returns `false` when the exam does not exist.
    async fn update_exam(&self, exam: &Exam, questions: &[Question]) -> Result<bool, StoreError>;

    async fn update_exam_status(
        &self,
        exam_id: &str,
        status: ExamStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;

    async fn delete_exam(&self, exam_id: &str) -> Result<bool, StoreError>;

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError>;

    async fn delete_questions(&self, exam_id: &str) -> Result<u64, StoreError>;

    async fn submission_exists(&self, exam_id: &str, student_id: &str) -> Result<bool, StoreError>;

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError>;

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError>;

    async fn list_submissions_by_exam(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError>;

    async fn list_submissions_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn delete_submissions(&self, exam_id: &str) -> Result<u64, StoreError>;

    /// Newest first, at most `limit` entries.
    async fn list_recent_submissions(&self, limit: u32) -> Result<Vec<Submission>, StoreError>;

    async fn find_student(&self, student_id: &str) -> Result<Option<Student>, StoreError>;

    /// Roster entries for the given ids; unknown ids are simply absent.
    async fn find_students(&self, student_ids: &[String]) -> Result<Vec<Student>, StoreError>;

    /// Ordered by name, then id.
    async fn list_students(&self, status: Option<StudentStatus>)
        -> Result<Vec<Student>, StoreError>;

    /// Fails with `Conflict` when the id, email or student number is taken.
    async fn insert_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Updates name, student number and status. Returns `false` when the student does not exist.
    async fn update_student(&self, student: &Student) -> Result<bool, StoreError>;

    async fn portal_totals(&self) -> Result<PortalTotals, StoreError>;
}

pub(crate) fn check_exam(exam: &Exam) -> Result<(), StoreError> {
    check_version("exam", &exam.id, exam.schema_version)?;
    exam.validate().map_err(|err| malformed("exam", &exam.id, err))
}

pub(crate) fn check_question(question: &Question) -> Result<(), StoreError> {
    check_version("question", &question.id, question.schema_version)?;
    question.validate().map_err(|err| malformed("question", &question.id, err))?;
    match question.invariant_violation() {
        Some(reason) => Err(malformed("question", &question.id, reason)),
        None => Ok(()),
    }
}

pub(crate) fn check_submission(submission: &Submission) -> Result<(), StoreError> {
    check_version("submission", &submission.id, submission.schema_version)?;
    submission.validate().map_err(|err| malformed("submission", &submission.id, err))?;
    if submission.score > submission.total_auto_graded
        || submission.total_auto_graded > submission.total_questions
    {
        return Err(malformed(
            "submission",
            &submission.id,
            "score, total_auto_graded and total_questions are inconsistent",
        ));
    }
    Ok(())
}

pub(crate) fn check_student(student: &Student) -> Result<(), StoreError> {
    check_version("student", &student.id, student.schema_version)?;
    student.validate().map_err(|err| malformed("student", &student.id, err))
}

pub(crate) fn check_new_submission(submission: &NewSubmission) -> Result<(), StoreError> {
    let key = format!("{}/{}", submission.exam_id, submission.student_id);
    if submission.exam_id.is_empty() || submission.student_id.is_empty() {
        return Err(malformed("submission", &key, "exam_id and student_id are required"));
    }
    if submission.score < 0
        || submission.score > submission.total_auto_graded
        || submission.total_auto_graded > submission.total_questions
    {
        return Err(malformed("submission", &key, "grade counters are inconsistent"));
    }
    if let Some(snapshot) = &submission.question_snapshot {
        snapshot.iter().try_for_each(check_question)?;
    }
    Ok(())
}

fn check_version(kind: &'static str, id: &str, version: i32) -> Result<(), StoreError> {
    if version == SCHEMA_VERSION {
        return Ok(());
    }
    Err(malformed(kind, id, format!("unsupported schema_version {version}")))
}

fn malformed(kind: &'static str, id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Malformed { kind, id: id.to_string(), reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures::{descriptive, mcq, student};

    #[test]
    fn rejects_future_schema_versions() {
        let mut question = mcq("q1", &["A", "B"], "A");
        question.schema_version = SCHEMA_VERSION + 1;

        let err = check_question(&question).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { kind: "question", .. }));
    }

    #[test]
    fn rejects_questions_breaking_the_mcq_invariant() {
        assert!(check_question(&descriptive("q2", "essay")).is_ok());
        assert!(check_question(&mcq("q1", &["A", "B"], "Z")).is_err());
    }

    #[test]
    fn rejects_students_without_a_valid_email() {
        let mut entry = student("s1", StudentStatus::Active);
        assert!(check_student(&entry).is_ok());

        entry.email = "not-an-address".to_string();
        let err = check_student(&entry).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { kind: "student", .. }));
    }

    #[test]
    fn totals_sum_exams_across_statuses() {
        let totals = PortalTotals {
            exams_by_status: BTreeMap::from([("draft", 2), ("published", 1)]),
            ..PortalTotals::default()
        };
        assert_eq!(totals.exams(), 3);
    }

    #[test]
    fn rejects_inconsistent_grade_counters() {
        let submission = NewSubmission {
            exam_id: "exam-1".to_string(),
            student_id: "s1".to_string(),
            student_name: "Student".to_string(),
            answers: BTreeMap::new(),
            score: 2,
            total_auto_graded: 1,
            total_questions: 3,
            question_snapshot: None,
        };
        assert!(check_new_submission(&submission).is_err());
    }
}
