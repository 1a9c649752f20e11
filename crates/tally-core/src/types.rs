// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store traits, the pipeline, and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Event type tag for a newly registered identity-provider user.
pub const USER_CREATED: &str = "user.created";
/// Event type tag for a profile change on an existing user.
pub const USER_UPDATED: &str = "user.updated";
/// Event type tag for a user removed at the identity provider.
pub const USER_DELETED: &str = "user.deleted";

/// Default ceiling on processing attempts per event.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Health status reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Store is fully operational.
    Healthy,
    /// Store is operational but experiencing issues.
    Degraded(String),
    /// Store is not operational.
    Unhealthy(String),
}

/// Processing status of a logged webhook event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Logged, first processing attempt not yet recorded.
    Pending,
    /// Failed recoverably; waiting for `next_retry_at`.
    Retrying,
    /// Processed.
    Success,
    /// Terminal failure; only an operator can re-drive it.
    Failure,
}

/// One row of the durable event log, keyed by the provider's event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub subject_id: String,
    pub status: EventStatus,
    /// Starts at 1; incremented each time a retry is scheduled.
    pub attempt: u32,
    pub max_retries: u32,
    /// The full event body as received, kept for replay.
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Drops the payload for list and health responses.
    pub fn summary(&self) -> WebhookEventSummary {
        WebhookEventSummary {
            event_id: self.event_id.clone(),
            event_type: self.event_type.clone(),
            subject_id: self.subject_id.clone(),
            status: self.status,
            attempt: self.attempt,
            max_retries: self.max_retries,
            error: self.error.clone(),
            processed_at: self.processed_at,
            next_retry_at: self.next_retry_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A [`WebhookEvent`] without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventSummary {
    pub event_id: String,
    pub event_type: String,
    pub subject_id: String,
    pub status: EventStatus,
    pub attempt: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`EventLogStore::log_event`](crate::EventLogStore::log_event).
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub initial_status: EventStatus,
    pub max_retries: u32,
}

impl NewWebhookEvent {
    /// A pending event with the default retry ceiling.
    pub fn pending(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        subject_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            subject_id: subject_id.into(),
            payload,
            initial_status: EventStatus::Pending,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// A lifecycle transition applied by `update_status`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// Stamps `processed_at` and clears error and scheduling fields.
    Success,
    /// Increments `attempt` and schedules the next run.
    Retrying {
        error: String,
        next_retry_at: DateTime<Utc>,
    },
    /// Terminal. Leaves `attempt` as-is.
    Failure { error: String },
}

impl StatusUpdate {
    pub fn status(&self) -> EventStatus {
        match self {
            StatusUpdate::Success => EventStatus::Success,
            StatusUpdate::Retrying { .. } => EventStatus::Retrying,
            StatusUpdate::Failure { .. } => EventStatus::Failure,
        }
    }
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: u64,
    pub failure: u64,
    pub retrying: u64,
    pub pending: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.success + self.failure + self.retrying + self.pending
    }

    /// Adds `count` to the bucket for `status`.
    pub fn record(&mut self, status: EventStatus, count: u64) {
        match status {
            EventStatus::Success => self.success += count,
            EventStatus::Failure => self.failure += count,
            EventStatus::Retrying => self.retrying += count,
            EventStatus::Pending => self.pending += count,
        }
    }
}

/// Aggregate view of the event log for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub stats: StatusCounts,
    /// Most recently updated `failure`/`retrying` rows, newest first.
    pub recent_failures: Vec<WebhookEventSummary>,
}

/// Filters for listing the event log. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub event_type: Option<String>,
    pub subject_id: Option<String>,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamps `page` to at least 1 and `limit` into `1..=MAX_LIMIT`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of summaries plus the unpaged total.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<WebhookEventSummary>,
    pub total: u64,
}

/// Placeholder first name for users the provider sent without one.
pub const PLACEHOLDER_FIRST_NAME: &str = "User";

/// Local user record mirrored from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    pub subject_id: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub phone_number: Option<String>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider-authoritative profile fields used to create or refresh a [`LocalUser`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub subject_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub phone_number: Option<String>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Builds a fresh, not-yet-onboarded user, filling in placeholder names.
    pub fn into_new_user(self, now: DateTime<Utc>) -> LocalUser {
        LocalUser {
            subject_id: self.subject_id,
            email: self.email,
            first_name: self
                .first_name
                .unwrap_or_else(|| PLACEHOLDER_FIRST_NAME.to_string()),
            last_name: self.last_name.unwrap_or_default(),
            username: self.username,
            image_url: self.image_url,
            phone_number: self.phone_number,
            last_sign_in_at: self.last_sign_in_at,
            onboarding_completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}
