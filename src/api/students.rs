use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::submissions::submission_summary;
use crate::core::state::AppState;
use crate::core::time::{format_date, format_primitive, primitive_now_utc};
use crate::db::models::{Student, SCHEMA_VERSION};
use crate::schemas::student::{
    StudentCreate, StudentDetailResponse, StudentListQuery, StudentResponse, StudentUpdate,
};
use crate::schemas::submission::SubmissionSummaryResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route("/:student_id", get(get_student).put(update_student))
        .route("/:student_id/submissions", get(list_student_submissions))
}

async fn list_students(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(params): Query<StudentListQuery>,
) -> Result<Json<Vec<StudentResponse>>, ApiError> {
    let students = state.store().list_students(params.status).await?;
    Ok(Json(students.into_iter().map(student_response).collect()))
}

async fn create_student(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<StudentCreate>,
) -> Result<(StatusCode, Json<StudentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let student = Student {
        id: payload.id.trim().to_string(),
        name: payload.name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        student_number: payload.student_number.trim().to_string(),
        status: payload.status,
        joined_at: now,
        updated_at: now,
        schema_version: SCHEMA_VERSION,
    };
    state.store().insert_student(&student).await?;

    tracing::info!(
        student_id = %student.id,
        admin_id = %admin.id,
        status = student.status.as_str(),
        "Student enrolled"
    );
    Ok((StatusCode::CREATED, Json(student_response(student))))
}

/// Roster entry with the student's submission history, newest first.
async fn get_student(
    CurrentAdmin(_admin): CurrentAdmin,
    Path(student_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<StudentDetailResponse>, ApiError> {
    let student = fetch_student(&state, &student_id).await?;
    let submissions = state.store().list_submissions_by_student(&student.id).await?;
    Ok(Json(StudentDetailResponse {
        student: student_response(student),
        submissions: submissions.into_iter().map(submission_summary).collect(),
    }))
}

async fn update_student(
    CurrentAdmin(admin): CurrentAdmin,
    Path(student_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<StudentUpdate>,
) -> Result<Json<StudentResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let existing = fetch_student(&state, &student_id).await?;
    let student = Student {
        name: payload.name.trim().to_string(),
        student_number: payload.student_number.trim().to_string(),
        status: payload.status,
        updated_at: primitive_now_utc(),
        ..existing
    };
    if !state.store().update_student(&student).await? {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }

    tracing::info!(
        student_id = %student.id,
        admin_id = %admin.id,
        status = student.status.as_str(),
        "Student updated"
    );
    Ok(Json(student_response(student)))
}

/// Submissions are kept for ids that have since left the roster.
async fn list_student_submissions(
    CurrentAdmin(_admin): CurrentAdmin,
    Path(student_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionSummaryResponse>>, ApiError> {
    let submissions = state.store().list_submissions_by_student(&student_id).await?;
    Ok(Json(submissions.into_iter().map(submission_summary).collect()))
}

async fn fetch_student(state: &AppState, student_id: &str) -> Result<Student, ApiError> {
    state
        .store()
        .find_student(student_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))
}

fn student_response(student: Student) -> StudentResponse {
    StudentResponse {
        id: student.id,
        name: student.name,
        email: student.email,
        student_number: student.student_number,
        status: student.status,
        joined: format_date(student.joined_at.date()),
        updated_at: format_primitive(student.updated_at),
    }
}

#[cfg(test)]
mod tests;
