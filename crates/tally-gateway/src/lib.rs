// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Tally webhook service.
//!
//! `POST /webhooks` verifies, logs, and processes provider deliveries.
//! The operator routes under `/webhooks` expose the event log, health
//! aggregation, manual retries, and fallback user creation.

pub mod auth;
pub mod handlers;
pub mod recovery;
pub mod server;
pub mod verify;

pub use server::{GatewayState, HealthState, ServerConfig, build_router, start_server};
pub use verify::{SignatureVerifier, VerifiedDelivery};
