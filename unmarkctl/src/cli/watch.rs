use std::process::ExitCode;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use unmark_config::UnmarkConfig;
use unmark_core::WatchRuntime;

use crate::context::{build_coordinator, require_input_root};

pub async fn run(config: &UnmarkConfig) -> Result<ExitCode> {
    let input_root = require_input_root(config)?;
    let coordinator = build_coordinator(config)?;
    info!(
        ledger_entries = coordinator.processed_count().await,
        "loaded processed files"
    );

    let runtime = WatchRuntime::new(
        &input_root,
        coordinator.clone(),
        config.stabilization,
        config.sweep,
    )?;
    coordinator.notify_watch_started(runtime.root()).await;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    runtime.run(shutdown).await?;
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping watcher"),
        _ = terminate => info!("Received SIGTERM, stopping watcher"),
    }
}
