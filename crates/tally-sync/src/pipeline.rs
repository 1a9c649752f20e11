// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared process-and-record path for ingress, scheduled retries, and
//! operator retries.
//!
//! Whoever runs an event, the outcome is written back through the same
//! transition rules:
//!
//! - processor success: `success`
//! - permanent error (malformed payload): `failure`, no retry
//! - transient error with budget left: `retrying` with a backoff delay
//! - transient error at the ceiling (`attempt + 1 >= max_retries`): `failure`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_config::model::TallyConfig;
use tally_core::types::{
    LocalUser, NewWebhookEvent, StatusUpdate, UserProfile, WebhookEvent, DEFAULT_MAX_RETRIES,
};
use tally_core::{EventLogStore, EventStatus, TallyError, UserStore};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::event::{ProviderEvent, RawEvent};
use crate::processors::{self, Reconciled};

/// Result of one processing attempt, as recorded in the event log.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Retrying {
        error: String,
        next_retry_at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

impl Outcome {
    pub fn status(&self) -> EventStatus {
        match self {
            Outcome::Success => EventStatus::Success,
            Outcome::Retrying { .. } => EventStatus::Retrying,
            Outcome::Failed { .. } => EventStatus::Failure,
        }
    }
}

/// What the ingress path did with one delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub event_type: String,
    pub subject_id: String,
    pub outcome: Outcome,
    /// The row was already `success`; the processor was not run again.
    pub duplicate: bool,
}

pub struct EventPipeline {
    events: Arc<dyn EventLogStore>,
    users: Arc<dyn UserStore>,
    backoff: BackoffPolicy,
    max_retries: u32,
    processing_timeout: Duration,
}

impl EventPipeline {
    pub fn new(events: Arc<dyn EventLogStore>, users: Arc<dyn UserStore>) -> Self {
        Self {
            events,
            users,
            backoff: BackoffPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            processing_timeout: Duration::from_secs(10),
        }
    }

    /// Applies the `[retry]` and `[webhook]` settings.
    pub fn from_config(
        events: Arc<dyn EventLogStore>,
        users: Arc<dyn UserStore>,
        config: &TallyConfig,
    ) -> Self {
        Self::new(events, users)
            .with_backoff(BackoffPolicy::from_config(&config.retry))
            .with_max_retries(config.retry.max_retries)
            .with_processing_timeout(config.webhook.processing_timeout())
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn events(&self) -> &Arc<dyn EventLogStore> {
        &self.events
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Logs a verified delivery as `pending` and runs its first attempt inline.
    ///
    /// Only a failure to log is returned as an error. Once the row exists,
    /// processing errors become status transitions.
    pub async fn ingest(&self, event_id: &str, raw: RawEvent) -> Result<Ingested, TallyError> {
        let decoded = raw.decode();
        let (event_type, subject_id) = match &decoded {
            Ok(event) => (event.event_type().to_string(), event.subject_id().to_string()),
            Err(_) => (raw.event_type.clone(), raw.subject_id().to_string()),
        };

        let payload = serde_json::to_value(&raw)
            .map_err(|e| TallyError::InvalidPayload(format!("unserializable event: {e}")))?;
        let stored = self
            .events
            .log_event(&NewWebhookEvent {
                event_id: event_id.to_string(),
                event_type: event_type.clone(),
                subject_id: subject_id.clone(),
                payload,
                initial_status: EventStatus::Pending,
                max_retries: self.max_retries,
            })
            .await?;

        if stored.status == EventStatus::Success {
            debug!(event_id, event_type = %event_type, "redelivery of processed event");
            return Ok(Ingested {
                event_type,
                subject_id,
                outcome: Outcome::Success,
                duplicate: true,
            });
        }

        let outcome = self.run(&stored, decoded).await;
        Ok(Ingested {
            event_type,
            subject_id,
            outcome,
            duplicate: false,
        })
    }

    /// Re-runs a logged event from its stored payload.
    pub async fn redrive(&self, event: &WebhookEvent) -> Outcome {
        let decoded = RawEvent::from_value(&event.payload).and_then(|raw| raw.decode());
        self.run(event, decoded).await
    }

    /// Operator-triggered single retry.
    ///
    /// Unknown ids are `NotFound`; rows already in `success` are `InvalidState`.
    pub async fn retry_event(&self, event_id: &str) -> Result<(WebhookEvent, Outcome), TallyError> {
        let event = self
            .events
            .get_event(event_id)
            .await?
            .ok_or_else(|| TallyError::NotFound(format!("event {event_id}")))?;
        if event.status == EventStatus::Success {
            return Err(TallyError::InvalidState(format!(
                "event {event_id} was already processed successfully"
            )));
        }
        info!(event_id, attempt = event.attempt, status = %event.status, "manual retry");
        let outcome = self.redrive(&event).await;
        let refreshed = self.events.get_event(event_id).await?.unwrap_or(event);
        Ok((refreshed, outcome))
    }

    /// Synthesizes a local user for a subject whose creation event never arrived.
    pub async fn create_fallback_user(
        &self,
        profile: UserProfile,
    ) -> Result<(LocalUser, bool), TallyError> {
        processors::create_fallback_user(self.users.as_ref(), profile).await
    }

    async fn run(
        &self,
        event: &WebhookEvent,
        decoded: Result<ProviderEvent, TallyError>,
    ) -> Outcome {
        let result = match decoded {
            Ok(typed) => self.dispatch_with_timeout(&typed).await,
            Err(e) => Err(e),
        };
        self.settle(event, result).await
    }

    async fn dispatch_with_timeout(&self, event: &ProviderEvent) -> Result<Reconciled, TallyError> {
        let duration = self.processing_timeout;
        tokio::time::timeout(duration, self.dispatch(event))
            .await
            .unwrap_or(Err(TallyError::Timeout { duration }))
    }

    async fn dispatch(&self, event: &ProviderEvent) -> Result<Reconciled, TallyError> {
        let users = self.users.as_ref();
        match event {
            ProviderEvent::UserCreated(user) => processors::process_user_creation(users, user).await,
            ProviderEvent::UserUpdated(user) => processors::process_user_update(users, user).await,
            ProviderEvent::UserDeleted(deleted) => {
                processors::process_user_deletion(users, deleted).await
            }
            ProviderEvent::Unknown { event_type, .. } => {
                debug!(event_type = %event_type, "no processor for event type");
                Ok(Reconciled::Skipped)
            }
        }
    }

    /// Records the processor result. A failed status write is logged and
    /// left for the next scan to repair.
    async fn settle(&self, event: &WebhookEvent, result: Result<Reconciled, TallyError>) -> Outcome {
        let (update, outcome) = match result {
            Ok(reconciled) => {
                debug!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    subject_id = %event.subject_id,
                    ?reconciled,
                    "event processed"
                );
                (StatusUpdate::Success, Outcome::Success)
            }
            Err(e) if e.is_permanent() => {
                let error = e.to_string();
                warn!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    error = %error,
                    "permanent processing failure"
                );
                (
                    StatusUpdate::Failure {
                        error: error.clone(),
                    },
                    Outcome::Failed { error },
                )
            }
            Err(e) if event.attempt.saturating_add(1) >= event.max_retries => {
                let error = e.to_string();
                warn!(
                    event_id = %event.event_id,
                    attempt = event.attempt,
                    max_retries = event.max_retries,
                    error = %error,
                    "retry budget exhausted"
                );
                (
                    StatusUpdate::Failure {
                        error: error.clone(),
                    },
                    Outcome::Failed { error },
                )
            }
            Err(e) => {
                let error = e.to_string();
                let next_retry_at = self.backoff.next_retry_at(event.attempt, Utc::now());
                info!(
                    event_id = %event.event_id,
                    attempt = event.attempt,
                    next_retry_at = %next_retry_at,
                    error = %error,
                    "processing failed, retry scheduled"
                );
                (
                    StatusUpdate::Retrying {
                        error: error.clone(),
                        next_retry_at,
                    },
                    Outcome::Retrying {
                        error,
                        next_retry_at,
                    },
                )
            }
        };

        if let Err(e) = self.events.update_status(&event.event_id, update).await {
            warn!(
                event_id = %event.event_id,
                status = %outcome.status(),
                error = %e,
                "failed to record processing outcome"
            );
        }
        outcome
    }
}
