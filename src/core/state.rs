use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::ExamStore;
use crate::services::session::SessionRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn ExamStore>,
    sessions: SessionRegistry,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: Arc<dyn ExamStore>) -> Self {
        let sessions = SessionRegistry::new(settings.session().clone());
        Self { inner: Arc::new(InnerState { settings, store, sessions }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn ExamStore> {
        &self.inner.store
    }

    pub(crate) fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }
}
