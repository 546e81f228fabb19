//! Grimoire pipeline runner.
//!
//! Collects raw items into the document store, enriches them, and runs the
//! configured studies on a fixed interval.

use anyhow::Result;
use tokio::signal;
use tracing::info;

use grimoire_pipeline::{load_config, pipeline_core::BackendRegistry, run_until};
use telemetry::init_tracing_from_env;

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Grimoire pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        store = %config.store.anonymized_url(),
        queue = config.queue.is_some(),
        sortinghat = config.sortinghat.is_some(),
        policy = ?config.failure_policy,
        "Loaded configuration"
    );

    // Connectors are registered by applications embedding the library
    run_until(config, BackendRegistry::new(), shutdown_signal()).await
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
