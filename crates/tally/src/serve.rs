// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally serve` command implementation.

use std::sync::Arc;

use tally_config::TallyConfig;
use tally_core::{StorageAdapter, TallyError};
use tally_gateway::{GatewayState, ServerConfig, start_server};
use tally_storage::SqliteStorage;
use tally_sync::{EventPipeline, RetryScheduler};
use tracing::{info, warn};

use crate::shutdown;

/// Opens storage, starts the retry scheduler, and serves the gateway until
/// SIGINT/SIGTERM. The scheduler is stopped and storage checkpointed on the
/// way out, including when the listener fails.
pub async fn run_serve(config: TallyConfig) -> Result<(), TallyError> {
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "starting tally serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let pipeline = Arc::new(EventPipeline::from_config(
        storage.clone(),
        storage.clone(),
        &config,
    ));
    // Fails fast on a missing or malformed signing secret.
    let state = GatewayState::from_config(pipeline.clone(), &config)?;
    if config.gateway.admin_token.is_none() {
        warn!("gateway.admin_token is unset; operator routes will reject every request");
    }

    let cancel = shutdown::install_signal_handler();

    let mut scheduler = RetryScheduler::new(pipeline, &config.retry);
    scheduler.start();

    let server_config = ServerConfig::from(&config.gateway);
    let served = start_server(&server_config, state, cancel.clone()).await;

    cancel.cancel();
    scheduler.stop().await;
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }

    served?;
    info!("tally serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
