// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use tally_config::model::StorageConfig;
use tally_core::types::{
    EventFilter, EventPage, HealthSummary, LocalUser, NewWebhookEvent, PageRequest,
    StatusUpdate, UserProfile, WebhookEvent,
};
use tally_core::{EventLogStore, HealthStatus, StorageAdapter, TallyError, UserStore};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage for the event log and local users.
///
/// The database is opened lazily by [`StorageAdapter::initialize`]; every
/// other call fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, TallyError> {
        self.db.get().ok_or_else(|| TallyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), TallyError> {
        if let Some(parent) = std::path::Path::new(&self.config.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(TallyError::storage)?;
        }
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TallyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("storage not initialized".into()));
        };
        let probe = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err);
        Ok(match probe {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn close(&self) -> Result<(), TallyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl EventLogStore for SqliteStorage {
    async fn log_event(&self, event: &NewWebhookEvent) -> Result<WebhookEvent, TallyError> {
        queries::webhook_events::log_event(self.db()?, event, Utc::now()).await
    }

    async fn update_status(
        &self,
        event_id: &str,
        update: StatusUpdate,
    ) -> Result<Option<WebhookEvent>, TallyError> {
        queries::webhook_events::update_status(self.db()?, event_id, update, Utc::now()).await
    }

    async fn find_due_for_retry(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<WebhookEvent>, TallyError> {
        queries::webhook_events::find_due_for_retry(self.db()?, limit, now).await
    }

    async fn find_stale_pending(
        &self,
        limit: usize,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<WebhookEvent>, TallyError> {
        queries::webhook_events::find_stale_pending(self.db()?, limit, older_than).await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, TallyError> {
        queries::webhook_events::get_event(self.db()?, event_id).await
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> Result<EventPage, TallyError> {
        queries::webhook_events::list_events(self.db()?, filter, page).await
    }

    async fn health_summary(&self, recent_limit: usize) -> Result<HealthSummary, TallyError> {
        queries::webhook_events::health_summary(self.db()?, recent_limit).await
    }
}

#[async_trait]
impl UserStore for SqliteStorage {
    async fn find_by_subject_or_email(
        &self,
        subject_id: &str,
        email: Option<&str>,
    ) -> Result<Option<LocalUser>, TallyError> {
        queries::users::find_by_subject_or_email(self.db()?, subject_id, email).await
    }

    async fn find_by_subject(&self, subject_id: &str) -> Result<Option<LocalUser>, TallyError> {
        queries::users::find_by_subject(self.db()?, subject_id).await
    }

    async fn insert_user(&self, user: &LocalUser) -> Result<(), TallyError> {
        queries::users::insert_user(self.db()?, user).await
    }

    async fn upsert_user(&self, profile: &UserProfile) -> Result<LocalUser, TallyError> {
        queries::users::upsert_user(self.db()?, profile, Utc::now()).await
    }

    async fn delete_by_subject(&self, subject_id: &str) -> Result<bool, TallyError> {
        queries::users::delete_by_subject(self.db()?, subject_id).await
    }

    async fn count_users(&self) -> Result<u64, TallyError> {
        queries::users::count_users(self.db()?).await
    }
}
