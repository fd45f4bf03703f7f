use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, routing::put, Json, Router};
use time::Duration;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::core::time::{format_date, format_primitive, primitive_now_utc};
use crate::db::models::Submission;
use crate::schemas::exam::StudentExamResponse;
use crate::schemas::session::{
    AnswerUpdate, NavigateRequest, SessionQuestion, SessionResponse, SessionResult,
};
use crate::services::session::{Participant, SessionError, SessionRunner, SharedSession};

/// Submitted exams stay on the dashboard this long.
const SUBMITTED_VISIBILITY: Duration = Duration::hours(24);

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exams", get(dashboard))
        .route("/exams/:exam_id/sessions", post(start_session))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/answers/:question_id", put(record_answer))
        .route("/sessions/:session_id/navigate", post(navigate))
        .route("/sessions/:session_id/submit", post(submit))
}

async fn dashboard(
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentExamResponse>>, ApiError> {
    let exams = state.store().list_exams_for_student(&student.id).await?;
    let mut submissions: HashMap<String, Submission> = HashMap::new();
    for submission in state.store().list_submissions_by_student(&student.id).await? {
        submissions.entry(submission.exam_id.clone()).or_insert(submission);
    }

    let cutoff = primitive_now_utc() - SUBMITTED_VISIBILITY;
    let visible = exams
        .into_iter()
        .filter_map(|exam| {
            let submission = submissions.remove(&exam.id);
            if submission.as_ref().is_some_and(|s| s.submitted_at < cutoff) {
                return None;
            }
            Some(StudentExamResponse {
                question_count: exam.questions_for(&student.id).len(),
                id: exam.id,
                title: exam.title,
                description: exam.description,
                duration_minutes: exam.duration_minutes,
                scheduled_date: format_date(exam.scheduled_date),
                status: exam.status,
                submitted: submission.is_some(),
                submission_id: submission.as_ref().map(|s| s.id.clone()),
                submitted_at: submission.as_ref().map(|s| format_primitive(s.submitted_at)),
            })
        })
        .collect();

    Ok(Json(visible))
}

async fn start_session(
    CurrentStudent(student): CurrentStudent,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let participant = Participant { student_id: student.id, student_name: student.name };
    let session = state.sessions().start(state.store().clone(), &exam_id, participant).await?;

    let runner = session.lock().await;
    Ok((StatusCode::CREATED, Json(session_response(&runner))))
}

async fn get_session(
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = owned_session(&state, &session_id, &student.id).await?;
    let runner = session.lock().await;
    Ok(Json(session_response(&runner)))
}

async fn record_answer(
    CurrentStudent(student): CurrentStudent,
    Path((session_id, question_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(payload): Json<AnswerUpdate>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = owned_session(&state, &session_id, &student.id).await?;
    let mut runner = session.lock().await;
    if !runner.record_answer(&question_id, payload.answer)? {
        tracing::debug!(session_id = %session_id, "Answer ignored; session not accepting input");
    }
    Ok(Json(session_response(&runner)))
}

async fn navigate(
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = owned_session(&state, &session_id, &student.id).await?;
    let mut runner = session.lock().await;
    let index = usize::try_from(payload.index.max(0)).unwrap_or(usize::MAX);
    runner.go_to_question(index);
    Ok(Json(session_response(&runner)))
}

async fn submit(
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = owned_session(&state, &session_id, &student.id).await?;
    let mut runner = session.lock().await;
    runner.request_submit(state.store().as_ref()).await?;
    Ok(Json(session_response(&runner)))
}

/// Another student's session id is reported as missing.
async fn owned_session(
    state: &AppState,
    session_id: &str,
    student_id: &str,
) -> Result<SharedSession, ApiError> {
    let not_found = || SessionError::SessionNotFound(session_id.to_string());
    let session = state.sessions().get(session_id).await.ok_or_else(not_found)?;
    if session.lock().await.student_id() != student_id {
        return Err(not_found().into());
    }
    Ok(session)
}

fn session_response(runner: &SessionRunner) -> SessionResponse {
    SessionResponse {
        session_id: runner.id().to_string(),
        exam_id: runner.exam_id().to_string(),
        exam_title: runner.exam_title().to_string(),
        phase: runner.phase(),
        questions: runner
            .questions()
            .iter()
            .map(|question| SessionQuestion {
                id: question.id.clone(),
                kind: question.kind,
                prompt: question.prompt.clone(),
                options: question.options.as_ref().map(|options| options.0.clone()),
            })
            .collect(),
        answers: runner.answers().clone(),
        cursor: runner.cursor(),
        remaining_seconds: runner.remaining_seconds(),
        started_at: format_primitive(runner.started_at()),
        result: runner.submission().map(|submission| SessionResult {
            submission_id: submission.id.clone(),
            submitted_at: format_primitive(submission.submitted_at),
            score: submission.score,
            total_auto_graded: submission.total_auto_graded,
            total_questions: submission.total_questions,
        }),
    }
}
