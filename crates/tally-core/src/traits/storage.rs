// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::HealthStatus;

/// Lifecycle of a storage backend.
///
/// Storage adapters manage the database connection that backs both the
/// event log and the local user table.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this backend.
    fn name(&self) -> &str;

    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), TallyError>;

    /// Performs a cheap round-trip and reports the backend's status.
    async fn health_check(&self) -> Result<HealthStatus, TallyError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), TallyError>;
}
