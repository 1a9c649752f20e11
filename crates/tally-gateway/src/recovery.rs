// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator recovery routes: event log listing, health aggregation,
//! single-event retry, and fallback user creation.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tally_core::types::{
    EventFilter, LocalUser, PageRequest, StatusCounts, UserProfile, WebhookEventSummary,
};
use tally_core::{EventStatus, TallyError};
use tally_sync::pipeline::Outcome;

use crate::handlers::ApiError;
use crate::server::GatewayState;

/// Response body for GET /webhooks/health.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookHealthResponse {
    /// False once terminal failures reach the configured threshold.
    pub healthy: bool,
    pub stats: StatusCounts,
    pub recent_failures: Vec<WebhookEventSummary>,
}

/// GET /webhooks/health
pub async fn get_webhook_health(
    State(state): State<GatewayState>,
) -> Result<Json<WebhookHealthResponse>, ApiError> {
    let summary = state
        .pipeline
        .events()
        .health_summary(state.health.recent_limit)
        .await?;
    Ok(Json(WebhookHealthResponse {
        healthy: summary.stats.failure < state.health.failure_threshold,
        stats: summary.stats,
        recent_failures: summary.recent_failures,
    }))
}

/// Query string for GET /webhooks/logs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub status: Option<String>,
    pub event_type: Option<String>,
    pub subject_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl LogsQuery {
    fn filter(&self) -> Result<EventFilter, TallyError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<EventStatus>().map_err(|_| {
                TallyError::InvalidPayload(format!(
                    "unknown status `{raw}` (expected pending, retrying, success, or failure)"
                ))
            })?),
            None => None,
        };
        Ok(EventFilter {
            status,
            event_type: self.event_type.clone().filter(|s| !s.is_empty()),
            subject_id: self.subject_id.clone().filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// Response body for GET /webhooks/logs. Payloads are omitted.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<WebhookEventSummary>,
    pub pagination: Pagination,
}

/// GET /webhooks/logs?status=&eventType=&subjectId=&page=&limit=
pub async fn get_logs(
    State(state): State<GatewayState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let filter = query.filter()?;
    let page = PageRequest::new(query.page, query.limit);
    let result = state.pipeline.events().list_events(&filter, page).await?;

    Ok(Json(LogsResponse {
        logs: result.events,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: result.total,
            pages: result.total.div_ceil(u64::from(page.limit)),
        },
    }))
}

/// Response body for POST /webhooks/retry/{event_id}.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    /// Status the event was left in.
    pub status: EventStatus,
    pub event: WebhookEventSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /webhooks/retry/{event_id}
///
/// 404 for an unknown id, 400 if the event already succeeded.
pub async fn post_retry(
    State(state): State<GatewayState>,
    Path(event_id): Path<String>,
) -> Result<Json<RetryResponse>, ApiError> {
    let (event, outcome) = state.pipeline.retry_event(&event_id).await?;
    let (next_retry, error) = match &outcome {
        Outcome::Success => (None, None),
        Outcome::Retrying {
            error,
            next_retry_at,
        } => (Some(next_retry_at.to_rfc3339()), Some(error.clone())),
        Outcome::Failed { error } => (None, Some(error.clone())),
    };
    Ok(Json(RetryResponse {
        status: outcome.status(),
        event: event.summary(),
        next_retry,
        error,
    }))
}

/// Body for POST /webhooks/create-fallback.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    #[serde(default, alias = "subject_id")]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl FallbackRequest {
    fn into_profile(self) -> Result<UserProfile, TallyError> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let subject_id = non_blank(self.subject_id)
            .ok_or_else(|| TallyError::InvalidPayload("subjectId is required".into()))?;
        let email = non_blank(self.email)
            .ok_or_else(|| TallyError::InvalidPayload("email is required".into()))?;
        Ok(UserProfile {
            subject_id,
            email: Some(email),
            first_name: non_blank(self.first_name),
            last_name: non_blank(self.last_name),
            username: non_blank(self.username),
            image_url: non_blank(self.image_url),
            phone_number: non_blank(self.phone_number),
            last_sign_in_at: None,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FallbackResponse {
    /// `created` or `exists`.
    pub status: String,
    pub user: LocalUser,
}

/// POST /webhooks/create-fallback
///
/// 201 when a user was created, 200 when one already matched.
pub async fn post_create_fallback(
    State(state): State<GatewayState>,
    Json(body): Json<FallbackRequest>,
) -> Result<(StatusCode, Json<FallbackResponse>), ApiError> {
    let profile = body.into_profile()?;
    let (user, created) = state.pipeline.create_fallback_user(profile).await?;
    tracing::info!(subject_id = %user.subject_id, created, "fallback user request");

    let (code, status) = if created {
        (StatusCode::CREATED, "created")
    } else {
        (StatusCode::OK, "exists")
    };
    Ok((
        code,
        Json(FallbackResponse {
            status: status.to_string(),
            user,
        }),
    ))
}
