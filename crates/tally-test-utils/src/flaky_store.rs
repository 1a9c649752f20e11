// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User store wrapper that simulates an outage.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tally_core::types::{LocalUser, UserProfile};
use tally_core::{TallyError, UserStore};

/// Delegates to an inner store, but fails the next `n` calls with a storage error.
pub struct FlakyUserStore {
    inner: Arc<dyn UserStore>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyUserStore {
    pub fn new(inner: Arc<dyn UserStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Total calls seen, failed or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(TallyError::storage(std::io::Error::other(
                "simulated user store outage",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserStore for FlakyUserStore {
    async fn find_by_subject_or_email(
        &self,
        subject_id: &str,
        email: Option<&str>,
    ) -> Result<Option<LocalUser>, TallyError> {
        self.check()?;
        self.inner.find_by_subject_or_email(subject_id, email).await
    }

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<LocalUser>, TallyError> {
        self.check()?;
        self.inner.find_by_subject(subject_id).await
    }

    async fn insert_user(&self, user: &LocalUser) -> Result<(), TallyError> {
        self.check()?;
        self.inner.insert_user(user).await
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<LocalUser, TallyError> {
        self.check()?;
        self.inner.upsert_user(profile).await
    }

    async fn delete_by_subject(&self, subject_id: &str) -> Result<bool, TallyError> {
        self.check()?;
        self.inner.delete_by_subject(subject_id).await
    }

    /// Never fails, so assertions can count rows during an outage.
    async fn count_users(&self) -> Result<u64, TallyError> {
        self.inner.count_users().await
    }
}
