//! Process bootstrap for the topology-sync binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing from the TOPOLOGY_LOG environment variable.
///
/// Defaults to "info" when the variable is unset or invalid.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve once the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler the process can only be stopped externally.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
