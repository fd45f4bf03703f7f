use tokio::signal;

use crate::services::session::SessionRegistry;

/// Resolves on Ctrl+C or SIGTERM, then stops every countdown hosted by `sessions`.
///
/// In-flight sessions are not persisted; their answers are lost with the process.
pub(crate) async fn shutdown_signal(sessions: SessionRegistry) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let abandoned = sessions.shutdown().await;
    tracing::info!(abandoned_sessions = abandoned, "shutdown signal received");
}
