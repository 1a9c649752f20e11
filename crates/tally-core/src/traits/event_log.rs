// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable log of every inbound provider event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TallyError;
use crate::types::{
    EventFilter, EventPage, HealthSummary, NewWebhookEvent, PageRequest, StatusUpdate,
    WebhookEvent,
};

/// Append/update store for webhook events, keyed by provider event id.
///
/// Implementations must make `log_event` an atomic upsert on `event_id`.
/// Store-level errors are returned to the caller, never retried here.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Inserts the event, or refreshes only the payload of an existing row.
    ///
    /// Lifecycle fields (`status`, `attempt`) keep their first-written values.
    async fn log_event(&self, event: &NewWebhookEvent) -> Result<WebhookEvent, TallyError>;

    /// Applies a lifecycle transition. Returns `None` if the event is unknown.
    async fn update_status(
        &self,
        event_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<WebhookEvent>, TallyError>;

    /// Up to `limit` rows in `retrying`/`failure` with `next_retry_at <= now`
    /// and `attempt < max_retries`. No ordering guarantee.
    async fn find_due_for_retry(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<WebhookEvent>, TallyError>;

    /// Up to `limit` rows still `pending` whose last update is before `older_than`.
    async fn find_stale_pending(
        &self,
        limit: usize,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<WebhookEvent>, TallyError>;

    /// Fetches a single event including its payload.
    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, TallyError>;

    /// Filtered, paginated listing without payloads, newest first.
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> Result<EventPage, TallyError>;

    /// Counts per status and the `recent_limit` latest failing/retrying rows.
    async fn health_summary(&self, recent_limit: usize) -> Result<HealthSummary, TallyError>;
}
