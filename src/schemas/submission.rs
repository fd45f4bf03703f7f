use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::types::ExamStatus;
use crate::services::grading::AnswerReview;

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionSummaryResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) submitted_at: String,
    pub(crate) score: i32,
    pub(crate) total_auto_graded: i32,
    pub(crate) total_questions: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum GradedAgainst {
    /// Questions frozen in the submission.
    Snapshot,
    /// The exam's current bank; edits made after submitting show up here.
    LiveBank,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionDetailResponse {
    #[serde(flatten)]
    pub(crate) summary: SubmissionSummaryResponse,
    pub(crate) exam_title: Option<String>,
    pub(crate) graded_against: GradedAgainst,
    pub(crate) review: Vec<AnswerReview>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonitoringEntry {
    pub(crate) exam_id: String,
    pub(crate) title: String,
    pub(crate) status: ExamStatus,
    pub(crate) assigned_students: usize,
    pub(crate) submissions: usize,
    /// Mean of `score / total_auto_graded` over submissions with auto-graded questions.
    pub(crate) average_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonitoringResponse {
    pub(crate) active_sessions: usize,
    pub(crate) exams: Vec<MonitoringEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PortalTotalsResponse {
    pub(crate) students: u64,
    pub(crate) active_students: u64,
    pub(crate) exams: u64,
    pub(crate) submissions: u64,
}

/// Admin overview: counts, exam status distribution and the latest submissions.
#[derive(Debug, Serialize)]
pub(crate) struct PortalSummaryResponse {
    pub(crate) totals: PortalTotalsResponse,
    pub(crate) exams_by_status: BTreeMap<&'static str, u64>,
    pub(crate) recent_submissions: Vec<SubmissionSummaryResponse>,
    pub(crate) active_sessions: usize,
}
