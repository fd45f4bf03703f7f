//! Cascade deletion of an exam: submissions, then questions, then the exam.
//!
//! The store offers no multi-collection transaction, so each step is retried on
//! its own. The first step that keeps failing stops the run; it and every later
//! step are reported as pending and can be resumed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::config::DeletionSettings;
use crate::core::metrics;
use crate::repositories::{ExamStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DeletionStep {
    DeleteSubmissions,
    DeleteQuestions,
    DeleteExam,
}

impl DeletionStep {
    pub(crate) const ALL: [DeletionStep; 3] =
        [DeletionStep::DeleteSubmissions, DeletionStep::DeleteQuestions, DeletionStep::DeleteExam];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DeletionStep::DeleteSubmissions => "delete_submissions",
            DeletionStep::DeleteQuestions => "delete_questions",
            DeletionStep::DeleteExam => "delete_exam",
        }
    }

    async fn run(self, store: &dyn ExamStore, exam_id: &str) -> Result<u64, StoreError> {
        match self {
            DeletionStep::DeleteSubmissions => store.delete_submissions(exam_id).await,
            DeletionStep::DeleteQuestions => store.delete_questions(exam_id).await,
            DeletionStep::DeleteExam => store.delete_exam(exam_id).await.map(u64::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct DeletionReport {
    pub(crate) completed: Vec<DeletionStep>,
    pub(crate) pending: Vec<DeletionStep>,
}

impl DeletionReport {
    pub(crate) fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

pub(crate) async fn delete_exam_cascade(
    store: &dyn ExamStore,
    exam_id: &str,
    settings: &DeletionSettings,
) -> DeletionReport {
    run_steps(store, exam_id, &DeletionStep::ALL, settings).await
}

pub(crate) async fn run_steps(
    store: &dyn ExamStore,
    exam_id: &str,
    steps: &[DeletionStep],
    settings: &DeletionSettings,
) -> DeletionReport {
    let mut report = DeletionReport::default();

    for (index, step) in steps.iter().copied().enumerate() {
        match run_with_retry(store, exam_id, step, settings).await {
            Ok(removed) => {
                tracing::debug!(exam_id, step = step.as_str(), removed, "Deletion step finished");
                report.completed.push(step);
            }
            Err(err) => {
                tracing::error!(
                    exam_id,
                    step = step.as_str(),
                    error = %err,
                    "Deletion step failed; remaining steps are pending"
                );
                report.pending.extend_from_slice(&steps[index..]);
                break;
            }
        }
    }

    report
}

async fn run_with_retry(
    store: &dyn ExamStore,
    exam_id: &str,
    step: DeletionStep,
    settings: &DeletionSettings,
) -> Result<u64, StoreError> {
    let attempts = settings.retry_attempts.max(1);
    let mut attempt = 1;

    loop {
        match step.run(store, exam_id).await {
            Ok(removed) => return Ok(removed),
            Err(err) => {
                metrics::deletion_step_failed(step.as_str());
                if attempt >= attempts {
                    return Err(err);
                }
                tracing::warn!(
                    exam_id,
                    step = step.as_str(),
                    attempt,
                    error = %err,
                    "Deletion step failed; retrying"
                );
                let backoff = settings.retry_backoff_millis.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
        }
    }
}

/// Finishes `pending` steps off the request path.
pub(crate) fn resume_in_background(
    store: Arc<dyn ExamStore>,
    exam_id: String,
    pending: Vec<DeletionStep>,
    settings: DeletionSettings,
) -> tokio::task::JoinHandle<DeletionReport> {
    tokio::spawn(async move {
        let report = run_steps(store.as_ref(), &exam_id, &pending, &settings).await;
        if report.is_complete() {
            tracing::info!(exam_id = %exam_id, "Background exam cleanup finished");
        } else {
            tracing::error!(
                exam_id = %exam_id,
                pending = ?report.pending,
                "Background exam cleanup gave up"
            );
        }
        report
    })
}
