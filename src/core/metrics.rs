use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn session_started() {
    metrics::counter!("exam_sessions_started_total").increment(1);
}

pub(crate) fn submission_recorded(trigger: &'static str) {
    metrics::counter!("exam_submissions_total", "trigger" => trigger).increment(1);
}

pub(crate) fn submission_write_failed() {
    metrics::counter!("submission_write_failures_total").increment(1);
}

pub(crate) fn deletion_step_failed(step: &'static str) {
    metrics::counter!("exam_deletion_steps_failed_total", "step" => step).increment(1);
}
