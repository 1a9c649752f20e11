// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic re-drive of events that are due for retry.
//!
//! The scheduler owns its task and cancellation token. Tests call
//! [`RetryScheduler::scan_at`] directly instead of waiting on the timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_config::model::RetryConfig;
use tally_core::TallyError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::{EventPipeline, Outcome};

/// Tally of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Retrying { .. } => self.rescheduled += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

struct Scanner {
    pipeline: Arc<EventPipeline>,
    batch_size: usize,
    stale_after: Option<Duration>,
}

impl Scanner {
    async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanReport, TallyError> {
        let events = self.pipeline.events();
        let mut batch = events.find_due_for_retry(self.batch_size, now).await?;

        let remaining = self.batch_size.saturating_sub(batch.len());
        if remaining > 0
            && let Some(after) = self.stale_after
        {
            let cutoff = now
                - chrono::Duration::from_std(after).unwrap_or(chrono::Duration::zero());
            batch.extend(events.find_stale_pending(remaining, cutoff).await?);
        }

        let mut report = ScanReport {
            scanned: batch.len(),
            ..ScanReport::default()
        };
        // Sequential: storage has a single writer connection.
        for event in &batch {
            debug!(
                event_id = %event.event_id,
                status = %event.status,
                attempt = event.attempt,
                "re-driving event"
            );
            let outcome = self.pipeline.redrive(event).await;
            report.record(&outcome);
        }
        Ok(report)
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background loop that re-runs due events every `interval`.
pub struct RetryScheduler {
    scanner: Arc<Scanner>,
    interval: Duration,
    running: Option<Running>,
}

impl RetryScheduler {
    /// A `stale_pending_secs` of 0 disables recovery of abandoned `pending` rows.
    pub fn new(pipeline: Arc<EventPipeline>, config: &RetryConfig) -> Self {
        let stale_after = (config.stale_pending_secs > 0).then(|| config.stale_pending_after());
        Self {
            scanner: Arc::new(Scanner {
                pipeline,
                batch_size: config.batch_size.max(1),
                stale_after,
            }),
            interval: config.interval(),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the periodic task. Calling it while running is a no-op.
    pub fn start(&mut self) {
        if self.running.is_some() {
            warn!("retry scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let scanner = Arc::clone(&self.scanner);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the first immediate tick.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match scanner.scan_at(Utc::now()).await {
                            Ok(report) if report.scanned > 0 => {
                                info!(
                                    scanned = report.scanned,
                                    succeeded = report.succeeded,
                                    rescheduled = report.rescheduled,
                                    failed = report.failed,
                                    "retry scan complete"
                                );
                            }
                            Ok(_) => debug!("retry scan found nothing due"),
                            Err(e) => warn!(error = %e, "retry scan failed (will try next tick)"),
                        }
                    }
                    _ = task_cancel.cancelled() => {
                        info!("retry scheduler shutting down");
                        break;
                    }
                }
            }
        });

        info!(
            interval_secs = period.as_secs(),
            batch_size = self.scanner.batch_size,
            "retry scheduler started"
        );
        self.running = Some(Running { cancel, handle });
    }

    /// Cancels the task and waits for the in-flight scan to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "retry scheduler task ended abnormally");
        }
    }

    /// One scan against the current time.
    pub async fn run_once(&self) -> Result<ScanReport, TallyError> {
        self.scanner.scan_at(Utc::now()).await
    }

    /// One scan as if the clock read `now`.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanReport, TallyError> {
        self.scanner.scan_at(now).await
    }
}
