use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Ongoing,
    Completed,
}

impl ExamStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ExamStatus::Draft => "draft",
            ExamStatus::Published => "published",
            ExamStatus::Ongoing => "ongoing",
            ExamStatus::Completed => "completed",
        }
    }

    /// Students may open sessions only against exams that are visible to them.
    pub(crate) fn is_open_to_students(self) -> bool {
        matches!(self, ExamStatus::Published | ExamStatus::Ongoing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    #[serde(alias = "mcq")]
    MultipleChoice,
    Descriptive,
}

impl QuestionKind {
    pub(crate) fn is_auto_graded(self) -> bool {
        matches!(self, QuestionKind::MultipleChoice)
    }
}

/// Roster standing. Inactive students stay on file but cannot be assigned new exams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "studentstatus", rename_all = "lowercase")]
pub(crate) enum StudentStatus {
    #[serde(alias = "Active")]
    Active,
    #[serde(alias = "Inactive")]
    Inactive,
}

impl StudentStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        }
    }
}

/// Role asserted by the identity provider inside the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Student,
}
