use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use sqlx::types::Json as SqlxJson;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::submissions::submission_summary;
use crate::core::state::AppState;
use crate::core::time::{format_date, format_primitive, primitive_now_utc};
use crate::db::models::{Exam, Question, SCHEMA_VERSION};
use crate::db::types::ExamStatus;
use crate::schemas::exam::{
    ExamDeletionResponse, ExamListQuery, ExamPayload, ExamResponse, ExamStatusUpdate,
    ExamSummaryResponse, QuestionResponse,
};
use crate::schemas::submission::SubmissionSummaryResponse;
use crate::services::assignment::AssignmentReport;
use crate::services::{exam_deletion, exam_lifecycle};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:exam_id", get(get_exam).put(update_exam).delete(delete_exam))
        .route("/:exam_id/status", post(change_status))
        .route("/:exam_id/submissions", get(list_exam_submissions))
}

async fn create_exam(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ExamPayload>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();
    let (exam, questions) = build_document(
        payload,
        Exam {
            id: exam_id,
            title: String::new(),
            description: String::new(),
            duration_minutes: 0,
            scheduled_date: now.date(),
            status: ExamStatus::Draft,
            assigned_student_ids: SqlxJson(Vec::new()),
            question_assignments: SqlxJson(Default::default()),
            created_by: admin.id.clone(),
            created_at: now,
            updated_at: now,
            schema_version: SCHEMA_VERSION,
        },
    );

    let roster = state.store().find_students(&exam.assigned_student_ids.0).await?;
    let report = exam_lifecycle::validate_for_save(&exam, &questions, &roster)?;
    state.store().insert_exam(&exam, &questions).await?;

    tracing::info!(
        exam_id = %exam.id,
        admin_id = %admin.id,
        questions = questions.len(),
        students = exam.assigned_student_ids.0.len(),
        "Exam created"
    );

    Ok((StatusCode::CREATED, Json(exam_response(exam, questions, report))))
}

async fn list_exams(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(params): Query<ExamListQuery>,
) -> Result<Json<Vec<ExamSummaryResponse>>, ApiError> {
    let exams = state.store().list_exams(params.status).await?;
    Ok(Json(exams.into_iter().map(exam_summary).collect()))
}

async fn get_exam(
    CurrentAdmin(_admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let questions = state.store().list_questions(&exam.id).await?;
    let roster = state.store().find_students(&exam.assigned_student_ids.0).await?;
    let report = exam_lifecycle::assignment_report(&exam, &questions, &roster);
    Ok(Json(exam_response(exam, questions, report)))
}

/// Replaces the exam document and its whole question bank.
async fn update_exam(
    CurrentAdmin(admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamPayload>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let existing = fetch_exam(&state, &exam_id).await?;
    if matches!(existing.status, ExamStatus::Ongoing | ExamStatus::Completed) {
        return Err(ApiError::Conflict(format!(
            "Exam cannot be edited while {}",
            existing.status.as_str()
        )));
    }

    let (mut exam, questions) = build_document(payload, existing);
    exam.updated_at = primitive_now_utc();

    let roster = state.store().find_students(&exam.assigned_student_ids.0).await?;
    let report = exam_lifecycle::validate_for_save(&exam, &questions, &roster)?;
    if !state.store().update_exam(&exam, &questions).await? {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    tracing::info!(exam_id = %exam.id, admin_id = %admin.id, "Exam updated");
    Ok(Json(exam_response(exam, questions, report)))
}

async fn change_status(
    CurrentAdmin(admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamStatusUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    let mut exam = fetch_exam(&state, &exam_id).await?;
    let questions = state.store().list_questions(&exam.id).await?;
    let roster = state.store().find_students(&exam.assigned_student_ids.0).await?;

    exam_lifecycle::check_transition(&exam, &questions, &roster, payload.status)?;

    let now = primitive_now_utc();
    if !state.store().update_exam_status(&exam.id, payload.status, now).await? {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    tracing::info!(
        exam_id = %exam.id,
        admin_id = %admin.id,
        from = exam.status.as_str(),
        to = payload.status.as_str(),
        "Exam status changed"
    );

    exam.status = payload.status;
    exam.updated_at = now;
    let report = exam_lifecycle::assignment_report(&exam, &questions, &roster);
    Ok(Json(exam_response(exam, questions, report)))
}

/// Runs the cascade inline; answers 202 and finishes in the background if steps remain.
async fn delete_exam(
    CurrentAdmin(admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ExamDeletionResponse>), ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let settings = state.settings().deletion().clone();

    let report =
        exam_deletion::delete_exam_cascade(state.store().as_ref(), &exam.id, &settings).await;
    let response = ExamDeletionResponse {
        exam_id: exam.id.clone(),
        completed: report.completed.iter().map(|step| step.as_str()).collect(),
        pending: report.pending.iter().map(|step| step.as_str()).collect(),
    };

    if report.is_complete() {
        tracing::info!(exam_id = %exam.id, admin_id = %admin.id, "Exam deleted");
        return Ok((StatusCode::OK, Json(response)));
    }

    tracing::warn!(
        exam_id = %exam.id,
        admin_id = %admin.id,
        pending = ?report.pending,
        "Exam deletion incomplete; resuming in background"
    );
    exam_deletion::resume_in_background(state.store().clone(), exam.id, report.pending, settings);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_exam_submissions(
    CurrentAdmin(_admin): CurrentAdmin,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionSummaryResponse>>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let submissions = state.store().list_submissions_by_exam(&exam.id).await?;
    Ok(Json(submissions.into_iter().map(submission_summary).collect()))
}

async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    state
        .store()
        .find_exam(exam_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

/// Applies `payload` onto `base`, keeping identity, ownership and status.
fn build_document(payload: ExamPayload, base: Exam) -> (Exam, Vec<Question>) {
    let exam = Exam {
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        duration_minutes: payload.duration_minutes,
        scheduled_date: payload.scheduled_date,
        assigned_student_ids: SqlxJson(payload.assigned_student_ids),
        question_assignments: SqlxJson(payload.question_assignments),
        ..base
    };

    let questions = payload
        .questions
        .into_iter()
        .enumerate()
        .map(|(position, input)| Question {
            id: input
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            exam_id: exam.id.clone(),
            kind: input.kind,
            prompt: input.prompt,
            canonical_answer: input.canonical_answer,
            options: input.options.filter(|options| !options.is_empty()).map(SqlxJson),
            position: position as i32,
            schema_version: SCHEMA_VERSION,
        })
        .collect();

    (exam, questions)
}

fn exam_summary(exam: Exam) -> ExamSummaryResponse {
    ExamSummaryResponse {
        student_count: exam.assigned_student_ids.0.len(),
        id: exam.id,
        title: exam.title,
        scheduled_date: format_date(exam.scheduled_date),
        duration_minutes: exam.duration_minutes,
        status: exam.status,
    }
}

fn exam_response(exam: Exam, questions: Vec<Question>, report: AssignmentReport) -> ExamResponse {
    ExamResponse {
        id: exam.id,
        title: exam.title,
        description: exam.description,
        duration_minutes: exam.duration_minutes,
        scheduled_date: format_date(exam.scheduled_date),
        status: exam.status,
        assigned_student_ids: exam.assigned_student_ids.0,
        question_assignments: exam.question_assignments.0,
        questions: questions
            .into_iter()
            .map(|question| QuestionResponse {
                id: question.id,
                kind: question.kind,
                prompt: question.prompt,
                canonical_answer: question.canonical_answer,
                options: question.options.map(|options| options.0),
                position: question.position,
            })
            .collect(),
        assignment_issues: report.issues,
        created_by: exam.created_by,
        created_at: format_primitive(exam.created_at),
        updated_at: format_primitive(exam.updated_at),
    }
}
