// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider ingress and the public liveness endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tally_core::TallyError;
use tally_sync::RawEvent;
use tally_sync::pipeline::Outcome;
use tracing::{info, warn};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`TallyError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TallyError);

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TallyError::NotFound(_) => StatusCode::NOT_FOUND,
            TallyError::MissingHeaders
            | TallyError::VerificationFailed(_)
            | TallyError::InvalidPayload(_)
            | TallyError::MissingEmail { .. }
            | TallyError::InvalidState(_) => StatusCode::BAD_REQUEST,
            TallyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TallyError::Config(_) | TallyError::Storage { .. } | TallyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Response body for POST /webhooks.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    /// `success`, or `acknowledged` when processing did not complete.
    pub status: String,
    /// Event type tag.
    pub event: String,
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<String>,
}

/// POST /webhooks
///
/// Unverifiable requests get 400 and are never logged. Once logged, the
/// provider always gets 200; failed processing is retried locally.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let delivery = state.verifier.verify(&headers, &body).map_err(|e| {
        warn!(error = %e, "rejected unverifiable webhook");
        e
    })?;
    let raw = RawEvent::from_slice(&body)?;

    let ingested = state.pipeline.ingest(&delivery.event_id, raw).await?;

    let (status, next_retry) = match &ingested.outcome {
        Outcome::Success => ("success", None),
        Outcome::Retrying { next_retry_at, .. } => ("acknowledged", Some(next_retry_at.to_rfc3339())),
        Outcome::Failed { .. } => ("acknowledged", None),
    };
    info!(
        event_id = %delivery.event_id,
        event_type = %ingested.event_type,
        subject_id = %ingested.subject_id,
        outcome = %ingested.outcome.status(),
        duplicate = ingested.duplicate,
        "webhook handled"
    );

    Ok(Json(WebhookResponse {
        status: status.to_string(),
        event: ingested.event_type,
        subject_id: ingested.subject_id,
        next_retry,
    }))
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.health.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}
