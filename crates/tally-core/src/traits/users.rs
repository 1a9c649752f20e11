// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write path for local user records mirrored from the identity provider.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{LocalUser, UserProfile};

/// Persistence for [`LocalUser`] rows.
///
/// Rows are unique by `subject_id` and by `email`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user matching either key.
    async fn find_by_subject_or_email(
        &self,
        subject_id: &str,
        email: Option<&str>,
    ) -> Result<Option<LocalUser>, TallyError>;

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<LocalUser>, TallyError>;

    /// Inserts a new row. Fails on a uniqueness conflict.
    async fn insert_user(&self, user: &LocalUser) -> Result<(), TallyError>;

    /// Overwrites the mutable fields of the row for `profile.subject_id`,
    /// creating it if absent. `email` is only overwritten when present.
    async fn upsert_user(&self, profile: &UserProfile) -> Result<LocalUser, TallyError>;

    /// Deletes by subject id. Returns whether a row was removed.
    async fn delete_by_subject(&self, subject_id: &str) -> Result<bool, TallyError>;

    async fn count_users(&self) -> Result<u64, TallyError>;
}
