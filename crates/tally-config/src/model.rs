// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally webhook service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP listener and operator auth.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound signature verification and processing.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Background retry scheduler and backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Health aggregation thresholds.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service name used in logs and the public health endpoint.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("tally.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "tally.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for operator routes. `None` rejects every operator request.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Upper bound on a single request's handling time.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            admin_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3400
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Inbound webhook verification configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Pre-shared signing secret. A `whsec_` prefix marks a base64 secret.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Maximum clock skew accepted on the timestamp header.
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,

    /// Upper bound on one processor invocation. Exceeding it counts as a transient failure.
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("timestamp_tolerance_secs", &self.timestamp_tolerance_secs)
            .field("processing_timeout_secs", &self.processing_timeout_secs)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            timestamp_tolerance_secs: default_timestamp_tolerance_secs(),
            processing_timeout_secs: default_processing_timeout_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

fn default_timestamp_tolerance_secs() -> u64 {
    300
}

fn default_processing_timeout_secs() -> u64 {
    10
}

/// Retry scheduler and backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Seconds between scheduler scans.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum events re-driven per scan.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempt ceiling stamped on newly logged events.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the exponential component of the delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to every delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Pending rows untouched for this long are treated as abandoned and re-driven.
    #[serde(default = "default_stale_pending_secs")]
    pub stale_pending_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            stale_pending_secs: default_stale_pending_secs(),
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_secs)
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

fn default_stale_pending_secs() -> u64 {
    600
}

/// Health aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Terminal failure count at which the subsystem reports unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,

    /// Number of recent failing/retrying events included in the summary.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_failure_threshold() -> u64 {
    10
}

fn default_recent_limit() -> usize {
    10
}
