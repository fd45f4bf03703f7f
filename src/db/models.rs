use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::{Date, PrimitiveDateTime};
use validator::Validate;

use crate::db::types::{ExamStatus, QuestionKind, StudentStatus};

/// Version stamped on every stored document. Bump when a field changes meaning.
pub(crate) const SCHEMA_VERSION: i32 = 1;

pub(crate) const MIN_OPTIONS: usize = 2;
pub(crate) const MAX_OPTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub(crate) struct Question {
    #[validate(length(min = 1, message = "id must not be empty"))]
    pub(crate) id: String,
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub(crate) exam_id: String,
    pub(crate) kind: QuestionKind,
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: String,
    #[validate(length(min = 1, message = "canonical_answer must not be empty"))]
    pub(crate) canonical_answer: String,
    pub(crate) options: Option<Json<Vec<String>>>,
    pub(crate) position: i32,
    pub(crate) schema_version: i32,
}

impl Question {
    pub(crate) fn options(&self) -> &[String] {
        self.options.as_ref().map(|options| options.0.as_slice()).unwrap_or_default()
    }

    /// Returns a description of the first broken invariant, if any.
    pub(crate) fn invariant_violation(&self) -> Option<String> {
        if self.prompt.trim().is_empty() {
            return Some(format!("question {} has an empty prompt", self.id));
        }
        if self.canonical_answer.trim().is_empty() {
            return Some(format!("question {} has no canonical answer", self.id));
        }

        match self.kind {
            QuestionKind::MultipleChoice => {
                let options = self.options();
                if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
                    return Some(format!(
                        "question {} must have between {MIN_OPTIONS} and {MAX_OPTIONS} options",
                        self.id
                    ));
                }
                if options.iter().any(|option| option.trim().is_empty()) {
                    return Some(format!("question {} has an empty option", self.id));
                }
                if !options.contains(&self.canonical_answer) {
                    return Some(format!(
                        "question {} canonical answer is not one of its options",
                        self.id
                    ));
                }
            }
            QuestionKind::Descriptive => {
                if self.options.is_some() {
                    return Some(format!("descriptive question {} must not carry options", self.id));
                }
            }
        }

        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub(crate) struct Exam {
    #[validate(length(min = 1, message = "id must not be empty"))]
    pub(crate) id: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[validate(length(min = 1, message = "description must not be empty"))]
    pub(crate) description: String,
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_date: Date,
    pub(crate) status: ExamStatus,
    pub(crate) assigned_student_ids: Json<Vec<String>>,
    pub(crate) question_assignments: Json<BTreeMap<String, Vec<String>>>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) schema_version: i32,
}

impl Exam {
    pub(crate) fn is_assigned_to(&self, student_id: &str) -> bool {
        self.assigned_student_ids.0.iter().any(|id| id == student_id)
    }

    pub(crate) fn questions_for(&self, student_id: &str) -> &[String] {
        self.question_assignments.0.get(student_id).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub(crate) struct Submission {
    pub(crate) id: String,
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub(crate) exam_id: String,
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) answers: Json<BTreeMap<String, String>>,
    #[validate(range(min = 0, message = "score must be non-negative"))]
    pub(crate) score: i32,
    #[validate(range(min = 0, message = "total_auto_graded must be non-negative"))]
    pub(crate) total_auto_graded: i32,
    #[validate(range(min = 0, message = "total_questions must be non-negative"))]
    pub(crate) total_questions: i32,
    pub(crate) question_snapshot: Option<Json<Vec<Question>>>,
    pub(crate) schema_version: i32,
}

/// Roster entry. `id` is the identity-provider subject used in exam assignments;
/// `student_number` is the institution's own registration number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate)]
pub(crate) struct Student {
    #[validate(length(min = 1, message = "id must not be empty"))]
    pub(crate) id: String,
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "student_number must not be empty"))]
    pub(crate) student_number: String,
    pub(crate) status: StudentStatus,
    pub(crate) joined_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) schema_version: i32,
}

impl Student {
    pub(crate) fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use time::macros::date;

    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::ExamStatus;

    pub(crate) fn exam(id: &str, status: ExamStatus, students: &[&str]) -> Exam {
        let now = primitive_now_utc();
        Exam {
            id: id.to_string(),
            title: "Midterm".to_string(),
            description: "Chapters 1-4".to_string(),
            duration_minutes: 30,
            scheduled_date: date!(2025 - 03 - 01),
            status,
            assigned_student_ids: Json(students.iter().map(|id| id.to_string()).collect()),
            question_assignments: Json(BTreeMap::new()),
            created_by: "admin".to_string(),
            created_at: now,
            updated_at: now,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Assigns `question_ids` to `student_id`, adding the student if needed.
    pub(crate) fn assign(exam: &mut Exam, student_id: &str, question_ids: &[&str]) {
        if !exam.is_assigned_to(student_id) {
            exam.assigned_student_ids.0.push(student_id.to_string());
        }
        exam.question_assignments
            .0
            .insert(student_id.to_string(), question_ids.iter().map(|id| id.to_string()).collect());
    }

    pub(crate) fn student(id: &str, status: StudentStatus) -> Student {
        let now = primitive_now_utc();
        Student {
            id: id.to_string(),
            name: format!("Student {id}"),
            email: format!("{id}@school.test"),
            student_number: format!("N-{id}"),
            status,
            joined_at: now,
            updated_at: now,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub(crate) fn mcq(id: &str, options: &[&str], answer: &str) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            kind: QuestionKind::MultipleChoice,
            prompt: format!("Prompt for {id}"),
            canonical_answer: answer.to_string(),
            options: Some(Json(options.iter().map(|item| item.to_string()).collect())),
            position: 0,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub(crate) fn descriptive(id: &str, answer: &str) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            kind: QuestionKind::Descriptive,
            prompt: format!("Prompt for {id}"),
            canonical_answer: answer.to_string(),
            options: None,
            position: 0,
            schema_version: SCHEMA_VERSION,
        }
    }
}
