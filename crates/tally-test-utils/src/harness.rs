// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full webhook stack on a temp SQLite database:
//! storage, a [`FlakyUserStore`] in front of the user table, the event
//! pipeline, and the axum router. Requests are driven in-process with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tally_config::model::{StorageConfig, TallyConfig};
use tally_core::{StorageAdapter, TallyError};
use tally_gateway::{GatewayState, build_router};
use tally_storage::SqliteStorage;
use tally_sync::{EventPipeline, RetryScheduler};
use tower::ServiceExt;

use crate::flaky_store::FlakyUserStore;
use crate::signing::signed_webhook_request;

/// Signing secret every harness is configured with.
pub const TEST_SIGNING_SECRET: &str = "whsec_dGFsbHktdGVzdC1zaWduaW5nLXNlY3JldA==";
/// Bearer token for operator routes.
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    max_retries: Option<u32>,
    admin_token: Option<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            max_retries: None,
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Leaves `gateway.admin_token` unset so operator routes fail closed.
    pub fn without_admin_token(mut self) -> Self {
        self.admin_token = None;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, TallyError> {
        let temp_dir = tempfile::TempDir::new().map_err(TallyError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = TallyConfig {
            storage: StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            },
            ..TallyConfig::default()
        };
        config.webhook.signing_secret = Some(TEST_SIGNING_SECRET.to_string());
        config.gateway.admin_token = self.admin_token;
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let users = Arc::new(FlakyUserStore::new(storage.clone()));
        let pipeline = Arc::new(EventPipeline::from_config(
            storage.clone(),
            users.clone(),
            &config,
        ));
        let state = GatewayState::from_config(pipeline.clone(), &config)?;
        let router = build_router(state, Duration::from_secs(config.gateway.request_timeout_secs));

        Ok(TestHarness {
            storage,
            users,
            pipeline,
            config,
            router,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment backed by a temp database.
pub struct TestHarness {
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    /// User store the processors write through. Call `fail_next` to simulate an outage.
    pub users: Arc<FlakyUserStore>,
    pub pipeline: Arc<EventPipeline>,
    pub config: TallyConfig,
    router: Router,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default settings.
    pub async fn start() -> Result<Self, TallyError> {
        Self::builder().build().await
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// A scheduler over the harness pipeline, not yet started.
    pub fn scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(self.pipeline.clone(), &self.config.retry)
    }

    /// Sends a request through the router and decodes the JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Signs `body` with the harness secret and posts it to `/webhooks`.
    pub async fn post_webhook(&self, event_id: &str, body: &Value) -> (StatusCode, Value) {
        let bytes = body.to_string().into_bytes();
        self.send(signed_webhook_request(TEST_SIGNING_SECRET, event_id, &bytes))
            .await
    }

    /// GET with the operator bearer token.
    pub async fn operator_get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
            .body(Body::empty())
            .unwrap_or_else(|e| panic!("failed to build request: {e}"));
        self.send(request).await
    }

    /// POST with the operator bearer token and an optional JSON body.
    pub async fn operator_post(&self, uri: &str, body: Option<&Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"));
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap_or_else(|e| panic!("failed to build request: {e}"));
        self.send(request).await
    }
}

/// A fresh provider-style event id.
pub fn new_event_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// A `user.created` body with a single primary email.
pub fn user_created_body(subject_id: &str, email: &str) -> Value {
    json!({
        "type": "user.created",
        "object": "event",
        "data": {
            "id": subject_id,
            "email_addresses": [{"id": "idn_primary", "email_address": email}],
            "primary_email_address_id": "idn_primary",
            "first_name": null,
            "last_name": null,
            "image_url": "https://img.example.com/default.png",
            "phone_numbers": [],
            "last_sign_in_at": null
        }
    })
}

/// A `user.updated` body carrying names and a username.
pub fn user_updated_body(subject_id: &str, first_name: &str, last_name: &str) -> Value {
    json!({
        "type": "user.updated",
        "object": "event",
        "data": {
            "id": subject_id,
            "email_addresses": [],
            "first_name": first_name,
            "last_name": last_name,
            "username": first_name.to_lowercase(),
            "phone_numbers": []
        }
    })
}

pub fn user_deleted_body(subject_id: &str) -> Value {
    json!({
        "type": "user.deleted",
        "object": "event",
        "data": {"id": subject_id, "deleted": true, "object": "user"}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_with_temp_database() {
        let harness = TestHarness::start().await.unwrap();
        let (status, body) = harness
            .send(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(new_event_id(), new_event_id());
    }
}
