// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tally_config::model::{GatewayConfig, TallyConfig};
use tally_core::TallyError;
use tally_sync::EventPipeline;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers::{self, ErrorResponse};
use crate::recovery;
use crate::verify::SignatureVerifier;

/// Settings for the public and operator health views.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    pub service_name: String,
    /// Terminal failure count at which `/webhooks/health` reports unhealthy.
    pub failure_threshold: u64,
    pub recent_limit: usize,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<EventPipeline>,
    pub verifier: Arc<SignatureVerifier>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

impl GatewayState {
    /// Builds the state from configuration. A signing secret is required.
    pub fn from_config(
        pipeline: Arc<EventPipeline>,
        config: &TallyConfig,
    ) -> Result<Self, TallyError> {
        let secret = config.webhook.signing_secret.as_deref().ok_or_else(|| {
            TallyError::Config(
                "webhook.signing_secret is required (set TALLY_WEBHOOK_SIGNING_SECRET)".into(),
            )
        })?;
        let verifier = SignatureVerifier::new(secret, config.webhook.timestamp_tolerance())?;

        Ok(Self {
            pipeline,
            verifier: Arc::new(verifier),
            auth: AuthConfig {
                bearer_token: config.gateway.admin_token.clone(),
            },
            health: HealthState {
                start_time: Instant::now(),
                service_name: config.service.name.clone(),
                failure_threshold: config.health.failure_threshold,
                recent_limit: config.health.recent_limit,
            },
        })
    }
}

/// Listener settings (mirrors `GatewayConfig` minus the auth token).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Assembles the full router.
///
/// Public:
/// - GET /health
/// - GET /webhooks/health
/// - POST /webhooks (signature-verified)
///
/// Operator (bearer token):
/// - GET /webhooks/logs
/// - POST /webhooks/retry/{event_id}
/// - POST /webhooks/create-fallback
pub fn build_router(state: GatewayState, request_timeout: Duration) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/webhooks", post(handlers::post_webhook))
        .route("/webhooks/health", get(recovery::get_webhook_health))
        .with_state(state.clone());

    let operator_routes = Router::new()
        .route("/webhooks/logs", get(recovery::get_logs))
        .route("/webhooks/retry/{event_id}", post(recovery::post_retry))
        .route("/webhooks/create-fallback", post(recovery::post_create_fallback))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .layer(axum_middleware::from_fn_with_state(
            request_timeout,
            timeout_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bounds total handling time. A timed-out ingress leaves its row `pending`
/// for the stale-pending scan.
async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, limit_secs = limit.as_secs(), "request timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "request timed out".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Binds and serves until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), TallyError> {
    let app = build_router(state, config.request_timeout);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TallyError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| TallyError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
