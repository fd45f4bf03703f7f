//! Exam sessions: the per-attempt state machine and the in-process registry
//! that hosts running attempts and their countdowns.

mod countdown;
mod registry;
mod runner;

use serde::Serialize;
use thiserror::Error;

use crate::repositories::StoreError;

pub(crate) use registry::{SessionRegistry, SharedSession};
pub(crate) use runner::{Participant, SessionRunner, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionPhase {
    Loading,
    Ready,
    Submitting,
    Terminal,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitTrigger {
    Manual,
    Timeout,
}

impl SubmitTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("exam {0} is not available")]
    NotFound(String),
    #[error("this exam has already been submitted")]
    AlreadySubmitted,
    #[error("no questions are assigned to you for this exam")]
    NoQuestionsAssigned,
    #[error("submission could not be saved: {0}")]
    SubmissionWriteFailure(String),
    #[error("question {0} is not part of this session")]
    UnknownQuestion(String),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("too many exam sessions are running; try again shortly")]
    CapacityExceeded,
    #[error(transparent)]
    Store(#[from] StoreError),
}
