// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally webhook service.
//!
//! This crate provides the error type, the domain types for the event log
//! and local users, and the store traits that the pipeline is written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TallyError;
pub use types::{
    EventFilter, EventPage, EventStatus, HealthStatus, HealthSummary, LocalUser,
    NewWebhookEvent, PageRequest, StatusCounts, StatusUpdate, UserProfile, WebhookEvent,
    WebhookEventSummary,
};

pub use traits::{EventLogStore, StorageAdapter, UserStore};
