use axum::extract::State;
use axum::{routing::get, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::submissions::submission_summary;
use crate::core::state::AppState;
use crate::db::models::Submission;
use crate::db::types::ExamStatus;
use crate::schemas::submission::{
    MonitoringEntry, MonitoringResponse, PortalSummaryResponse, PortalTotalsResponse,
};

const RECENT_SUBMISSIONS: u32 = 5;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(monitoring)).route("/summary", get(summary))
}

async fn summary(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PortalSummaryResponse>, ApiError> {
    let totals = state.store().portal_totals().await?;
    let recent = state.store().list_recent_submissions(RECENT_SUBMISSIONS).await?;

    Ok(Json(PortalSummaryResponse {
        totals: PortalTotalsResponse {
            students: totals.students,
            active_students: totals.active_students,
            exams: totals.exams(),
            submissions: totals.submissions,
        },
        exams_by_status: totals.exams_by_status,
        recent_submissions: recent.into_iter().map(submission_summary).collect(),
        active_sessions: state.sessions().active_count().await,
    }))
}

async fn monitoring(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<MonitoringResponse>, ApiError> {
    let exams = state.store().list_exams(Some(ExamStatus::Ongoing)).await?;

    let mut entries = Vec::with_capacity(exams.len());
    for exam in exams {
        let submissions = state.store().list_submissions_by_exam(&exam.id).await?;
        entries.push(MonitoringEntry {
            assigned_students: exam.assigned_student_ids.0.len(),
            submissions: submissions.len(),
            average_score: average_score(&submissions),
            exam_id: exam.id,
            title: exam.title,
            status: exam.status,
        });
    }

    Ok(Json(MonitoringResponse {
        active_sessions: state.sessions().active_count().await,
        exams: entries,
    }))
}

fn average_score(submissions: &[Submission]) -> Option<f64> {
    let ratios: Vec<f64> = submissions
        .iter()
        .filter(|submission| submission.total_auto_graded > 0)
        .map(|submission| f64::from(submission.score) / f64::from(submission.total_auto_graded))
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
}
