use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::StudentStatus;
use crate::schemas::submission::SubmissionSummaryResponse;

fn default_status() -> StudentStatus {
    StudentStatus::Active
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StudentCreate {
    /// Subject the identity provider puts in this student's tokens.
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub(crate) id: String,
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    #[serde(alias = "studentId")]
    #[validate(length(min = 1, max = 64, message = "student_number must be 1-64 characters"))]
    pub(crate) student_number: String,
    #[serde(default = "default_status")]
    pub(crate) status: StudentStatus,
}

/// Email and join date cannot be changed after enrolment.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StudentUpdate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    #[serde(alias = "studentId")]
    #[validate(length(min = 1, max = 64, message = "student_number must be 1-64 characters"))]
    pub(crate) student_number: String,
    pub(crate) status: StudentStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StudentListQuery {
    #[serde(default)]
    pub(crate) status: Option<StudentStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) student_number: String,
    pub(crate) status: StudentStatus,
    pub(crate) joined: String,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentDetailResponse {
    #[serde(flatten)]
    pub(crate) student: StudentResponse,
    pub(crate) submissions: Vec<SubmissionSummaryResponse>,
}
