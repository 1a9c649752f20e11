// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation of identity-provider user events against the local user table.
//!
//! Raw provider bodies are decoded once into [`ProviderEvent`]. The
//! [`EventPipeline`] runs the matching processor and records the outcome in
//! the event log; the HTTP ingress, the [`RetryScheduler`], and the operator
//! retry route all go through it.

pub mod backoff;
pub mod event;
pub mod pipeline;
pub mod processors;
pub mod scheduler;

pub use backoff::BackoffPolicy;
pub use event::{DeletedUserPayload, ProviderEvent, RawEvent, UserPayload};
pub use pipeline::{EventPipeline, Outcome};
pub use scheduler::{RetryScheduler, ScanReport};
