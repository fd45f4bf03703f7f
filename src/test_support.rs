use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, security, state::AppState};
use crate::db::types::UserRole;
use crate::repositories::MemoryExamStore;

const TEST_JWT_SECRET: &str = "test-identity-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    /// Same store as `state.store()`, with fault injection reachable.
    pub(crate) store: Arc<MemoryExamStore>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("PORTAL_ENV", "test");
    std::env::set_var("PORTAL_STRICT_CONFIG", "0");
    std::env::set_var("PORTAL_STORE", "memory");
    std::env::set_var("IDENTITY_JWT_SECRET", TEST_JWT_SECRET);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("DELETE_RETRY_BACKOFF_MILLIS", "1");
    for name in [
        "IDENTITY_JWT_ALGORITHM",
        "IDENTITY_JWT_ISSUER",
        "QUESTION_SNAPSHOT_POLICY",
        "SESSION_TICK_MILLIS",
        "MAX_ACTIVE_SESSIONS",
        "DELETE_RETRY_ATTEMPTS",
        "BACKEND_CORS_ORIGINS",
        "API_V1_STR",
        "PROJECT_NAME",
        "DATABASE_URL",
    ] {
        std::env::remove_var(name);
    }
}

pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_with(|| {}).await
}

/// Like [`setup_test_context`], with `configure` run after the default test env is set.
pub(crate) async fn setup_test_context_with(configure: impl FnOnce()) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    configure();

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryExamStore::new());
    let state = AppState::new(settings, store.clone());
    let app = api::router::router(state.clone());

    TestContext { state, app, store, _guard: guard }
}

pub(crate) fn admin_token(settings: &Settings) -> String {
    security::issue_test_token("admin-1", "Admin", UserRole::Admin, settings, time::Duration::hours(1))
}

pub(crate) fn student_token(student_id: &str, name: &str, settings: &Settings) -> String {
    security::issue_test_token(student_id, name, UserRole::Student, settings, time::Duration::hours(1))
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
