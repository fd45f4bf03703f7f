use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::{routing::get, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::db::models::Submission;
use crate::schemas::submission::{
    GradedAgainst, SubmissionDetailResponse, SubmissionSummaryResponse,
};
use crate::services::grading;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:submission_id", get(get_submission))
}

/// Detail view for manual review of descriptive answers.
///
/// Reviews against the frozen questions when the submission carries them,
/// otherwise against the exam's current bank.
async fn get_submission(
    CurrentAdmin(_admin): CurrentAdmin,
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionDetailResponse>, ApiError> {
    let submission = state
        .store()
        .find_submission(&submission_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    let exam = state.store().find_exam(&submission.exam_id).await?;

    let (presented, graded_against) = match &submission.question_snapshot {
        Some(snapshot) => (snapshot.0.clone(), GradedAgainst::Snapshot),
        None => {
            // The presented set was not stored: use the student's current assignment.
            let assigned: HashSet<&str> = exam
                .as_ref()
                .map(|exam| exam.questions_for(&submission.student_id))
                .unwrap_or_default()
                .iter()
                .map(String::as_str)
                .collect();
            let questions: Vec<_> = state
                .store()
                .list_questions(&submission.exam_id)
                .await?
                .into_iter()
                .filter(|question| assigned.contains(question.id.as_str()))
                .collect();
            (questions, GradedAgainst::LiveBank)
        }
    };
    let review = grading::review(&presented, &submission.answers.0);

    Ok(Json(SubmissionDetailResponse {
        summary: submission_summary(submission),
        exam_title: exam.map(|exam| exam.title),
        graded_against,
        review,
    }))
}

pub(crate) fn submission_summary(submission: Submission) -> SubmissionSummaryResponse {
    SubmissionSummaryResponse {
        id: submission.id,
        exam_id: submission.exam_id,
        student_id: submission.student_id,
        student_name: submission.student_name,
        submitted_at: format_primitive(submission.submitted_at),
        score: submission.score,
        total_auto_graded: submission.total_auto_graded,
        total_questions: submission.total_questions,
    }
}

#[cfg(test)]
mod tests;
