use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::types::QuestionKind;
use crate::services::session::SessionPhase;

/// A question as the student sees it: no canonical answer.
#[derive(Debug, Serialize)]
pub(crate) struct SessionQuestion {
    pub(crate) id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResult {
    pub(crate) submission_id: String,
    pub(crate) submitted_at: String,
    pub(crate) score: i32,
    pub(crate) total_auto_graded: i32,
    pub(crate) total_questions: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) phase: SessionPhase,
    pub(crate) questions: Vec<SessionQuestion>,
    pub(crate) answers: BTreeMap<String, String>,
    pub(crate) cursor: usize,
    pub(crate) remaining_seconds: u64,
    pub(crate) started_at: String,
    pub(crate) result: Option<SessionResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerUpdate {
    pub(crate) answer: String,
}

/// Out-of-range indexes are clamped to the first or last question.
#[derive(Debug, Deserialize)]
pub(crate) struct NavigateRequest {
    pub(crate) index: i64,
}
