use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::repositories::ExamStore;

use super::{SharedSession, Tick};

/// Drives one session's clock until it stops or the registry shuts down.
pub(super) async fn run(
    session: SharedSession,
    store: Arc<dyn ExamStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut runner = session.lock().await;
                match runner.tick(store.as_ref()).await {
                    Ok(Tick::Counting(_)) => {}
                    Ok(Tick::Stopped) => break,
                    Err(err) => {
                        tracing::warn!(
                            session_id = %runner.id(),
                            error = %err,
                            "Forced submission failed; waiting for a manual retry"
                        );
                        break;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
