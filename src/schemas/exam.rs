use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::Date;
use validator::Validate;

use crate::core::time::parse_date;
use crate::db::types::{ExamStatus, QuestionKind};
use crate::services::assignment::AssignmentIssue;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionInput {
    /// Kept across edits so answers stay attached to the same question.
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(alias = "type")]
    pub(crate) kind: QuestionKind,
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: String,
    #[serde(alias = "canonicalAnswer")]
    #[validate(length(min = 1, message = "canonical_answer must not be empty"))]
    pub(crate) canonical_answer: String,
    #[serde(default)]
    pub(crate) options: Option<Vec<String>>,
}

/// Full exam document. Used for create and for whole-document replacement.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamPayload {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[validate(length(min = 1, message = "description must not be empty"))]
    pub(crate) description: String,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(alias = "scheduledDate", deserialize_with = "deserialize_date")]
    pub(crate) scheduled_date: Date,
    #[serde(default, alias = "assignedStudentIds")]
    pub(crate) assigned_student_ids: Vec<String>,
    #[serde(default, alias = "studentQuestionAssignments")]
    pub(crate) question_assignments: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "questionBank")]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamStatusUpdate {
    pub(crate) status: ExamStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default)]
    pub(crate) status: Option<ExamStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) canonical_answer: String,
    pub(crate) options: Option<Vec<String>>,
    pub(crate) position: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_date: String,
    pub(crate) status: ExamStatus,
    pub(crate) assigned_student_ids: Vec<String>,
    pub(crate) question_assignments: BTreeMap<String, Vec<String>>,
    pub(crate) questions: Vec<QuestionResponse>,
    /// Outstanding assignment problems; empty once the exam can be published.
    pub(crate) assignment_issues: Vec<AssignmentIssue>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) scheduled_date: String,
    pub(crate) duration_minutes: i32,
    pub(crate) status: ExamStatus,
    pub(crate) student_count: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_date: String,
    pub(crate) status: ExamStatus,
    pub(crate) question_count: usize,
    pub(crate) submitted: bool,
    pub(crate) submission_id: Option<String>,
    pub(crate) submitted_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamDeletionResponse {
    pub(crate) exam_id: String,
    pub(crate) completed: Vec<&'static str>,
    pub(crate) pending: Vec<&'static str>,
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Date, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(|err| D::Error::custom(format!("invalid date '{raw}': {err}")))
}
