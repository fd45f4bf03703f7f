use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use uuid::Uuid;

use crate::core::config::SessionSettings;
use crate::core::metrics;
use crate::repositories::ExamStore;

use super::{countdown, Participant, SessionError, SessionRunner};

/// A running attempt. The mutex makes the student the only writer.
pub(crate) type SharedSession = Arc<Mutex<SessionRunner>>;

struct Entry {
    exam_id: String,
    student_id: String,
    session: SharedSession,
}

struct RegistryInner {
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, Entry>>,
    shutdown: watch::Sender<bool>,
}

/// Hosts sessions in this process, keyed by session id.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub(crate) fn new(settings: SessionSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                sessions: RwLock::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    /// Opens a session for `participant`, or hands back the one already running.
    pub(crate) async fn start(
        &self,
        store: Arc<dyn ExamStore>,
        exam_id: &str,
        participant: Participant,
    ) -> Result<SharedSession, SessionError> {
        if let Some(existing) = self.find_active(exam_id, &participant.student_id).await {
            return Ok(existing);
        }
        self.ensure_capacity().await?;

        let session_id = Uuid::new_v4().to_string();
        let student_id = participant.student_id.clone();
        let mut runner = SessionRunner::new(
            session_id.clone(),
            exam_id.to_string(),
            participant,
            self.inner.settings.snapshot_policy,
        );
        runner.load(store.as_ref(), rand::random::<u64>()).await?;
        let seed = runner.seed();
        let session = Arc::new(Mutex::new(runner));

        {
            let mut sessions = self.inner.sessions.write().await;
            for entry in sessions.values() {
                if entry.exam_id == exam_id
                    && entry.student_id == student_id
                    && entry.session.lock().await.is_active()
                {
                    return Ok(entry.session.clone());
                }
            }
            // Other starts may have filled the registry while this one was loading.
            if !has_room(&mut sessions, self.inner.settings.max_active_sessions) {
                tracing::warn!(
                    limit = self.inner.settings.max_active_sessions,
                    "Session capacity reached"
                );
                return Err(SessionError::CapacityExceeded);
            }
            sessions.insert(
                session_id.clone(),
                Entry {
                    exam_id: exam_id.to_string(),
                    student_id: student_id.clone(),
                    session: session.clone(),
                },
            );
        }

        metrics::session_started();
        tracing::info!(
            session_id = %session_id,
            exam_id = %exam_id,
            student_id = %student_id,
            seed,
            "Exam session registered"
        );
        tokio::spawn(countdown::run(
            session.clone(),
            store,
            Duration::from_millis(self.inner.settings.tick_millis),
            self.inner.shutdown.subscribe(),
        ));

        Ok(session)
    }

    pub(crate) async fn get(&self, session_id: &str) -> Option<SharedSession> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(session_id).map(|entry| entry.session.clone())
    }

    async fn find_active(&self, exam_id: &str, student_id: &str) -> Option<SharedSession> {
        let sessions = self.inner.sessions.read().await;
        for entry in sessions.values() {
            if entry.exam_id == exam_id
                && entry.student_id == student_id
                && entry.session.lock().await.is_active()
            {
                return Some(entry.session.clone());
            }
        }
        None
    }

    async fn ensure_capacity(&self) -> Result<(), SessionError> {
        let limit = self.inner.settings.max_active_sessions;
        let mut sessions = self.inner.sessions.write().await;
        if has_room(&mut sessions, limit) {
            Ok(())
        } else {
            tracing::warn!(limit, "Session capacity reached");
            Err(SessionError::CapacityExceeded)
        }
    }

    pub(crate) async fn active_count(&self) -> usize {
        let sessions = self.inner.sessions.read().await;
        let mut active = 0;
        for entry in sessions.values() {
            if entry.session.lock().await.is_active() {
                active += 1;
            }
        }
        active
    }

    /// Stops every countdown and forgets all sessions. Returns how many were still running.
    pub(crate) async fn shutdown(&self) -> usize {
        let _ = self.inner.shutdown.send(true);
        let abandoned = self.active_count().await;
        self.inner.sessions.write().await.clear();
        abandoned
    }
}

/// Drops finished sessions when the registry is full, then checks the limit again.
fn has_room(sessions: &mut HashMap<String, Entry>, limit: usize) -> bool {
    if sessions.len() < limit {
        return true;
    }

    let finished: Vec<String> = sessions
        .iter()
        .filter(|(_, entry)| entry.session.try_lock().is_ok_and(|runner| !runner.is_active()))
        .map(|(id, _)| id.clone())
        .collect();
    for id in &finished {
        sessions.remove(id);
    }
    tracing::debug!(evicted = finished.len(), remaining = sessions.len(), "Pruned sessions");

    sessions.len() < limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QuestionSnapshotPolicy;
    use crate::db::models::fixtures::{assign, exam, mcq};
    use crate::db::types::ExamStatus;
    use crate::repositories::MemoryExamStore;
    use crate::services::session::SessionPhase;

    fn settings(max_active_sessions: usize) -> SessionSettings {
        SessionSettings {
            tick_millis: 1000,
            max_active_sessions,
            snapshot_policy: QuestionSnapshotPolicy::Live,
        }
    }

    fn participant(student_id: &str) -> Participant {
        Participant { student_id: student_id.to_string(), student_name: student_id.to_uppercase() }
    }

    async fn store() -> Arc<MemoryExamStore> {
        let store = MemoryExamStore::new();
        let mut stored = exam("exam-1", ExamStatus::Ongoing, &["s1", "s2"]);
        stored.duration_minutes = 1;
        assign(&mut stored, "s1", &["q1"]);
        assign(&mut stored, "s2", &["q1"]);
        store.insert_exam(&stored, &[mcq("q1", &["A", "B"], "A")]).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_the_running_session_for_the_same_student() {
        let store = store().await;
        let registry = SessionRegistry::new(settings(10));

        let first = registry.start(store.clone(), "exam-1", participant("s1")).await.unwrap();
        let second = registry.start(store.clone(), "exam-1", participant("s1")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_submits_when_time_runs_out() {
        let store = store().await;
        let registry = SessionRegistry::new(settings(10));
        let session = registry.start(store.clone(), "exam-1", participant("s1")).await.unwrap();
        session.lock().await.record_answer("q1", "A".to_string()).unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        let runner = session.lock().await;
        assert_eq!(runner.phase(), SessionPhase::Terminal);
        assert_eq!(runner.submission().map(|s| s.score), Some(1));
        assert_eq!(store.list_submissions_by_exam("exam-1").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_counts_only_running_sessions() {
        let store = store().await;
        let registry = SessionRegistry::new(settings(1));

        let first = registry.start(store.clone(), "exam-1", participant("s1")).await.unwrap();
        let err = registry.start(store.clone(), "exam-1", participant("s2")).await.unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded));

        first.lock().await.request_submit(store.as_ref()).await.unwrap();
        assert!(registry.start(store.clone(), "exam-1", participant("s2")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_respect_the_limit() {
        let store = store().await;
        store.faults().slow_exam_reads(Duration::from_millis(50));
        let registry = SessionRegistry::new(settings(1));

        let (first, second) = tokio::join!(
            registry.start(store.clone(), "exam-1", participant("s1")),
            registry.start(store.clone(), "exam-1", participant("s2")),
        );

        let rejected = [&first, &second]
            .iter()
            .filter(|result| matches!(result, Err(SessionError::CapacityExceeded)))
            .count();
        assert_eq!(rejected, 1);
        assert!(first.is_ok() || second.is_ok());
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn load_errors_are_not_registered() {
        let store = store().await;
        let registry = SessionRegistry::new(settings(10));

        let err = registry.start(store.clone(), "missing", participant("s1")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_countdowns() {
        let store = store().await;
        let registry = SessionRegistry::new(settings(10));
        let session = registry.start(store.clone(), "exam-1", participant("s1")).await.unwrap();

        assert_eq!(registry.shutdown().await, 1);
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(session.lock().await.phase(), SessionPhase::Ready);
        assert!(store.list_submissions_by_exam("exam-1").await.unwrap().is_empty());
        assert!(registry.get(session.lock().await.id()).await.is_none());
    }
}
