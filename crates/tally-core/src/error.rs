// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally webhook service.

use thiserror::Error;

/// The primary error type used across all Tally store traits and pipeline operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing secret, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// One or more of the signature headers was absent.
    #[error("missing webhook signature headers")]
    MissingHeaders,

    /// Signature mismatch, malformed signature, or timestamp outside tolerance.
    #[error("webhook verification failed: {0}")]
    VerificationFailed(String),

    /// The event body could not be decoded into the shape its type requires.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// A `user.created` event carried no usable email address.
    #[error("no email address on user {subject_id}")]
    MissingEmail { subject_id: String },

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation is not allowed for the record's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Returns `true` for failures that no amount of retrying can fix.
    ///
    /// Malformed payloads stay malformed; store outages and timeouts do not.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TallyError::MissingEmail { .. } | TallyError::InvalidPayload(_)
        )
    }

    /// Wraps any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TallyError::Storage {
            source: Box::new(err),
        }
    }
}
