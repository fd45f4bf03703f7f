use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use time::PrimitiveDateTime;

use crate::core::config::QuestionSnapshotPolicy;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Question, Submission};
use crate::repositories::{ExamStore, NewSubmission, StoreError};
use crate::services::grading;

use super::{SessionError, SessionPhase, SubmitTrigger};

/// Who is taking the exam. Taken from the verified identity, never from the request body.
#[derive(Debug, Clone)]
pub(crate) struct Participant {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Still counting; seconds left.
    Counting(u64),
    /// Nothing left to count: submitted, failed to load, or already timed out.
    Stopped,
}

/// One student's attempt at one exam.
///
/// `Loading → Ready → Submitting → Terminal`, or `Loading → Error`. Exam data is
/// read once in [`SessionRunner::load`] and never again.
#[derive(Debug)]
pub(crate) struct SessionRunner {
    id: String,
    exam_id: String,
    exam_title: String,
    participant: Participant,
    policy: QuestionSnapshotPolicy,
    phase: SessionPhase,
    seed: u64,
    questions: Vec<Question>,
    answers: BTreeMap<String, String>,
    cursor: usize,
    remaining_seconds: u64,
    timeout_fired: bool,
    started_at: PrimitiveDateTime,
    submission: Option<Submission>,
}

/// Exam length in seconds. A non-positive stored duration is a malformed document.
fn countdown_seconds(exam: &Exam) -> Result<u64, StoreError> {
    u64::try_from(exam.duration_minutes)
        .ok()
        .filter(|minutes| *minutes > 0)
        .map(|minutes| minutes * 60)
        .ok_or_else(|| StoreError::Malformed {
            kind: "exam",
            id: exam.id.clone(),
            reason: format!("duration_minutes {} is not positive", exam.duration_minutes),
        })
}

impl SessionRunner {
    pub(crate) fn new(
        id: String,
        exam_id: String,
        participant: Participant,
        policy: QuestionSnapshotPolicy,
    ) -> Self {
        Self {
            id,
            exam_id,
            exam_title: String::new(),
            participant,
            policy,
            phase: SessionPhase::Loading,
            seed: 0,
            questions: Vec::new(),
            answers: BTreeMap::new(),
            cursor: 0,
            remaining_seconds: 0,
            timeout_fired: false,
            started_at: primitive_now_utc(),
            submission: None,
        }
    }

    /// Fetches the exam and the student's question subset, then enters `Ready`.
    ///
    /// Any failure leaves the runner in `Error`; it never reaches `Ready` afterwards.
    pub(crate) async fn load(&mut self, store: &dyn ExamStore, seed: u64) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Loading {
            return Ok(());
        }

        match self.prepare(store).await {
            Ok((title, questions, seconds)) => {
                self.exam_title = title;
                self.questions = questions;
                self.seed = seed;
                self.questions.shuffle(&mut StdRng::seed_from_u64(seed));
                self.remaining_seconds = seconds;
                self.started_at = primitive_now_utc();
                self.phase = SessionPhase::Ready;
                tracing::info!(
                    session_id = %self.id,
                    exam_id = %self.exam_id,
                    student_id = %self.participant.student_id,
                    questions = self.questions.len(),
                    seed,
                    remaining_seconds = self.remaining_seconds,
                    "Exam session ready"
                );
                Ok(())
            }
            Err(err) => {
                self.phase = SessionPhase::Error;
                tracing::info!(
                    session_id = %self.id,
                    exam_id = %self.exam_id,
                    student_id = %self.participant.student_id,
                    error = %err,
                    "Exam session failed to load"
                );
                Err(err)
            }
        }
    }

    async fn prepare(
        &self,
        store: &dyn ExamStore,
    ) -> Result<(String, Vec<Question>, u64), SessionError> {
        let student_id = self.participant.student_id.as_str();

        let exam = store
            .find_exam(&self.exam_id)
            .await?
            .filter(|exam| exam.status.is_open_to_students() && exam.is_assigned_to(student_id))
            .ok_or_else(|| SessionError::NotFound(self.exam_id.clone()))?;

        if store.submission_exists(&exam.id, student_id).await? {
            return Err(SessionError::AlreadySubmitted);
        }

        let assigned = exam.questions_for(student_id);
        if assigned.is_empty() {
            return Err(SessionError::NoQuestionsAssigned);
        }

        let bank = store.list_questions(&exam.id).await?;
        if bank.is_empty() {
            return Err(SessionError::NotFound(exam.id.clone()));
        }

        let mut by_id: HashMap<&str, &Question> =
            bank.iter().map(|question| (question.id.as_str(), question)).collect();
        let questions: Vec<Question> =
            assigned.iter().filter_map(|id| by_id.remove(id.as_str())).cloned().collect();
        if questions.is_empty() {
            return Err(SessionError::NoQuestionsAssigned);
        }

        let seconds = countdown_seconds(&exam)?;
        Ok((exam.title, questions, seconds))
    }

    /// Overwrites the answer for `question_id`.
    ///
    /// Returns `Ok(false)` when the session no longer takes input: outside `Ready`,
    /// or once time ran out. The answer map is frozen from that instant.
    pub(crate) fn record_answer(
        &mut self,
        question_id: &str,
        text: String,
    ) -> Result<bool, SessionError> {
        if self.phase != SessionPhase::Ready || self.timeout_fired {
            return Ok(false);
        }
        if !self.questions.iter().any(|question| question.id == question_id) {
            return Err(SessionError::UnknownQuestion(question_id.to_string()));
        }
        self.answers.insert(question_id.to_string(), text);
        Ok(true)
    }

    /// Moves the cursor, clamped to the question range.
    pub(crate) fn go_to_question(&mut self, index: usize) -> usize {
        if self.phase == SessionPhase::Ready && !self.questions.is_empty() {
            self.cursor = index.min(self.questions.len() - 1);
        }
        self.cursor
    }

    /// Advances the countdown by one second; at zero forces a single submission attempt.
    pub(crate) async fn tick(&mut self, store: &dyn ExamStore) -> Result<Tick, SessionError> {
        if self.phase != SessionPhase::Ready || self.timeout_fired {
            return Ok(Tick::Stopped);
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return Ok(Tick::Counting(self.remaining_seconds));
        }

        self.timeout_fired = true;
        tracing::info!(session_id = %self.id, exam_id = %self.exam_id, "Exam time is up");
        self.submit(store, SubmitTrigger::Timeout).await?;
        Ok(Tick::Stopped)
    }

    /// Explicit submission. Ignored unless the session is `Ready`.
    pub(crate) async fn request_submit(&mut self, store: &dyn ExamStore) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Ready {
            return Ok(());
        }
        self.submit(store, SubmitTrigger::Manual).await
    }

    async fn submit(
        &mut self,
        store: &dyn ExamStore,
        trigger: SubmitTrigger,
    ) -> Result<(), SessionError> {
        self.phase = SessionPhase::Submitting;

        let summary = grading::grade(&self.questions, &self.answers);
        let snapshot = match self.policy {
            QuestionSnapshotPolicy::Snapshot => Some(self.questions.clone()),
            QuestionSnapshotPolicy::Live => None,
        };
        let new_submission = NewSubmission {
            exam_id: self.exam_id.clone(),
            student_id: self.participant.student_id.clone(),
            student_name: self.participant.student_name.clone(),
            answers: self.answers.clone(),
            score: summary.score,
            total_auto_graded: summary.total_auto_graded,
            total_questions: summary.total_questions,
            question_snapshot: snapshot,
        };

        match store.create_submission(new_submission).await {
            Ok(submission) => {
                tracing::info!(
                    session_id = %self.id,
                    exam_id = %self.exam_id,
                    submission_id = %submission.id,
                    trigger = trigger.as_str(),
                    score = submission.score,
                    total_auto_graded = submission.total_auto_graded,
                    "Submission recorded"
                );
                metrics::submission_recorded(trigger.as_str());
                self.submission = Some(submission);
                self.phase = SessionPhase::Terminal;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %self.id,
                    exam_id = %self.exam_id,
                    trigger = trigger.as_str(),
                    error = %err,
                    "Submission write failed; answers kept for retry"
                );
                metrics::submission_write_failed();
                self.phase = SessionPhase::Ready;
                Err(SessionError::SubmissionWriteFailure(err.to_string()))
            }
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub(crate) fn exam_title(&self) -> &str {
        &self.exam_title
    }

    pub(crate) fn student_id(&self) -> &str {
        &self.participant.student_id
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub(crate) fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub(crate) fn started_at(&self) -> PrimitiveDateTime {
        self.started_at
    }

    pub(crate) fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// True while the session still accepts input.
    pub(crate) fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Loading | SessionPhase::Ready | SessionPhase::Submitting)
    }
}
