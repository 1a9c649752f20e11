// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally status` command implementation.
//!
//! Reads the event log directly from the configured database, so it works
//! whether or not `tally serve` is running.

use std::fmt::Write as _;
use std::path::Path;

use tally_config::TallyConfig;
use tally_core::{EventLogStore, StorageAdapter, TallyError};
use tally_gateway::recovery::WebhookHealthResponse;
use tally_storage::SqliteStorage;

/// Run the `tally status` command. `json` prints the same body as
/// `GET /webhooks/health`.
pub async fn run_status(config: &TallyConfig, json: bool) -> Result<(), TallyError> {
    let path = &config.storage.database_path;
    if !Path::new(path).exists() {
        println!("tally: no database at {path} (start with: tally serve)");
        return Ok(());
    }

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let report = collect(&storage, config).await;
    storage.close().await?;
    let report = report?;

    if json {
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| TallyError::Internal(format!("failed to encode status: {e}")))?;
        println!("{body}");
    } else {
        print!("{}", render(&report, path));
    }
    Ok(())
}

async fn collect(
    events: &dyn EventLogStore,
    config: &TallyConfig,
) -> Result<WebhookHealthResponse, TallyError> {
    let summary = events.health_summary(config.health.recent_limit).await?;
    Ok(WebhookHealthResponse {
        healthy: summary.stats.failure < config.health.failure_threshold,
        stats: summary.stats,
        recent_failures: summary.recent_failures,
    })
}

fn render(report: &WebhookHealthResponse, db_path: &str) -> String {
    let mut out = String::new();
    let stats = &report.stats;
    let health = if report.healthy {
        "[OK] healthy"
    } else {
        "[FAIL] unhealthy"
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "  tally status");
    let _ = writeln!(out, "  {}", "-".repeat(35));
    let _ = writeln!(out, "    Database:  {db_path}");
    let _ = writeln!(out, "    Health:    {health}");
    let _ = writeln!(out, "    Events:    {}", stats.total());
    let _ = writeln!(out, "      success   {}", stats.success);
    let _ = writeln!(out, "      failure   {}", stats.failure);
    let _ = writeln!(out, "      retrying  {}", stats.retrying);
    let _ = writeln!(out, "      pending   {}", stats.pending);

    if !report.recent_failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Recent failures");
        for event in &report.recent_failures {
            let _ = write!(
                out,
                "    {}  {}  {}  attempt {}/{}",
                event.event_id, event.event_type, event.status, event.attempt, event.max_retries
            );
            if let Some(error) = &event.error {
                let _ = write!(out, "  {error}");
            }
            let _ = writeln!(out);
        }
    }
    let _ = writeln!(out);
    out
}
