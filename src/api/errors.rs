use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::exam_lifecycle::ExamRuleError;
use crate::services::session::SessionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    /// Where the client should send the user; set for terminal session errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failing_students: Vec<String>,
}

impl ErrorResponse {
    fn new(status: StatusCode, detail: String) -> Self {
        Self {
            status: status.as_u16(),
            detail,
            action: None,
            retryable: false,
            failing_students: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    Validation { detail: String, failing_students: Vec<String> },
    NotFound(String),
    Conflict(String),
    /// The session cannot continue; the client goes back to the dashboard.
    SessionClosed { status: StatusCode, detail: String },
    TooManyRequests(&'static str),
    ServiceUnavailable { detail: String, retryable: bool },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => {
                tracing::warn!(error = %message, "Store unavailable");
                ApiError::ServiceUnavailable { detail: "Store unavailable".to_string(), retryable: true }
            }
            StoreError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::internal(other, "Store operation failed"),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let detail = err.to_string();
        match err {
            SessionError::NotFound(_) => {
                ApiError::SessionClosed { status: StatusCode::NOT_FOUND, detail }
            }
            SessionError::AlreadySubmitted => {
                ApiError::SessionClosed { status: StatusCode::CONFLICT, detail }
            }
            SessionError::NoQuestionsAssigned => {
                ApiError::SessionClosed { status: StatusCode::UNPROCESSABLE_ENTITY, detail }
            }
            SessionError::SubmissionWriteFailure(_) => {
                ApiError::ServiceUnavailable { detail, retryable: true }
            }
            SessionError::UnknownQuestion(_) => ApiError::BadRequest(detail),
            SessionError::SessionNotFound(_) => ApiError::NotFound(detail),
            SessionError::CapacityExceeded => {
                ApiError::TooManyRequests("Too many exam sessions are running")
            }
            SessionError::Store(err) => err.into(),
        }
    }
}

impl From<ExamRuleError> for ApiError {
    fn from(err: ExamRuleError) -> Self {
        let detail = err.to_string();
        match err {
            ExamRuleError::Validation { failing_students, .. } => {
                ApiError::Validation { detail, failing_students }
            }
            ExamRuleError::Transition { .. } => ApiError::Conflict(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response =
                    (status, Json(ErrorResponse::new(status, message.to_string()))).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, ErrorResponse::new(StatusCode::FORBIDDEN, message.into()))
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(StatusCode::BAD_REQUEST, message))
            }
            ApiError::Validation { detail, failing_students } => {
                let status = StatusCode::BAD_REQUEST;
                (status, ErrorResponse { failing_students, ..ErrorResponse::new(status, detail) })
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(StatusCode::NOT_FOUND, message))
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, ErrorResponse::new(StatusCode::CONFLICT, message))
            }
            ApiError::SessionClosed { status, detail } => {
                (status, ErrorResponse { action: Some("dashboard"), ..ErrorResponse::new(status, detail) })
            }
            ApiError::TooManyRequests(message) => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                (status, ErrorResponse { retryable: true, ..ErrorResponse::new(status, message.into()) })
            }
            ApiError::ServiceUnavailable { detail, retryable } => {
                tracing::error!(error = %detail, "Service unavailable");
                let status = StatusCode::SERVICE_UNAVAILABLE;
                (status, ErrorResponse { retryable, ..ErrorResponse::new(status, detail) })
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, ErrorResponse::new(status, message))
            }
        };

        (status, Json(body)).into_response()
    }
}
