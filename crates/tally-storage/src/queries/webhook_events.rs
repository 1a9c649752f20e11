// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event log queries: idempotent logging, lifecycle transitions, retry scans,
//! and operator listings.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tally_core::types::{
    EventFilter, EventPage, HealthSummary, NewWebhookEvent, PageRequest, StatusCounts,
    StatusUpdate, WebhookEvent,
};
use tally_core::{EventStatus, TallyError};

use crate::database::{Database, map_tr_err};
use crate::models::{
    EVENT_COLUMNS, SUMMARY_COLUMNS, event_from_row, format_ts, summary_from_row,
};

fn select_event(
    conn: &rusqlite::Connection,
    event_id: &str,
) -> Result<Option<WebhookEvent>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE event_id = ?1"),
        params![event_id],
        event_from_row,
    )
    .optional()
}

/// Insert the event, or refresh only `payload` and `updated_at` if the id is
/// already known. Returns the stored row.
pub async fn log_event(
    db: &Database,
    event: &NewWebhookEvent,
    now: DateTime<Utc>,
) -> Result<WebhookEvent, TallyError> {
    let payload = serde_json::to_string(&event.payload)
        .map_err(|e| TallyError::InvalidPayload(format!("payload is not serializable: {e}")))?;
    let event_id = event.event_id.clone();
    let event_type = event.event_type.clone();
    let subject_id = event.subject_id.clone();
    let status = event.initial_status.to_string();
    let max_retries = event.max_retries;
    let now = format_ts(now);

    db.connection()
        .call(move |conn| -> Result<WebhookEvent, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO webhook_events
                    (event_id, event_type, subject_id, status, attempt, max_retries,
                     payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, ?7)
                 ON CONFLICT(event_id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![event_id, event_type, subject_id, status, max_retries, payload, now],
            )?;
            let stored = select_event(&tx, &event_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a lifecycle transition. Returns `None` when the id is unknown.
pub async fn update_status(
    db: &Database,
    event_id: &str,
    update: StatusUpdate,
    now: DateTime<Utc>,
) -> Result<Option<WebhookEvent>, TallyError> {
    let event_id = event_id.to_string();
    let now = format_ts(now);

    db.connection()
        .call(move |conn| -> Result<Option<WebhookEvent>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = match update {
                StatusUpdate::Success => tx.execute(
                    "UPDATE webhook_events
                     SET status = 'success', processed_at = ?2, error = NULL,
                         next_retry_at = NULL, updated_at = ?2
                     WHERE event_id = ?1",
                    params![event_id, now],
                )?,
                StatusUpdate::Retrying {
                    error,
                    next_retry_at,
                } => tx.execute(
                    "UPDATE webhook_events
                     SET status = 'retrying', attempt = attempt + 1, error = ?2,
                         next_retry_at = ?3, updated_at = ?4
                     WHERE event_id = ?1",
                    params![event_id, error, format_ts(next_retry_at), now],
                )?,
                StatusUpdate::Failure { error } => tx.execute(
                    "UPDATE webhook_events
                     SET status = 'failure', error = ?2, next_retry_at = NULL,
                         updated_at = ?3
                     WHERE event_id = ?1",
                    params![event_id, error, now],
                )?,
            };
            if changed == 0 {
                return Ok(None);
            }
            let stored = select_event(&tx, &event_id)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Rows whose scheduled retry time has passed and whose attempt budget is not
/// exhausted. Terminal `failure` rows carry no `next_retry_at` and never match.
pub async fn find_due_for_retry(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<WebhookEvent>, TallyError> {
    let limit = limit as i64;
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<Vec<WebhookEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM webhook_events
                 WHERE status IN ('retrying', 'failure')
                   AND next_retry_at IS NOT NULL
                   AND next_retry_at <= ?1
                   AND attempt < max_retries
                 ORDER BY next_retry_at ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now, limit], event_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `pending` rows not touched since `older_than`.
pub async fn find_stale_pending(
    db: &Database,
    limit: usize,
    older_than: DateTime<Utc>,
) -> Result<Vec<WebhookEvent>, TallyError> {
    let limit = limit as i64;
    let cutoff = format_ts(older_than);
    db.connection()
        .call(move |conn| -> Result<Vec<WebhookEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM webhook_events
                 WHERE status = 'pending' AND updated_at < ?1
                 ORDER BY updated_at ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![cutoff, limit], event_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_event(db: &Database, event_id: &str) -> Result<Option<WebhookEvent>, TallyError> {
    let event_id = event_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<WebhookEvent>, rusqlite::Error> {
            select_event(conn, &event_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Filtered page of summaries, newest first, plus the unpaged match count.
pub async fn list_events(
    db: &Database,
    filter: &EventFilter,
    page: PageRequest,
) -> Result<EventPage, TallyError> {
    let status = filter.status.map(|s| s.to_string());
    let event_type = filter.event_type.clone();
    let subject_id = filter.subject_id.clone();
    let limit = i64::from(page.limit);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

    db.connection()
        .call(move |conn| -> Result<EventPage, rusqlite::Error> {
            const WHERE: &str = "WHERE (?1 IS NULL OR status = ?1)
                   AND (?2 IS NULL OR event_type = ?2)
                   AND (?3 IS NULL OR subject_id = ?3)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM webhook_events {WHERE}"),
                params![status, event_type, subject_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM webhook_events {WHERE}
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4 OFFSET ?5"
            ))?;
            let events = stmt
                .query_map(
                    params![status, event_type, subject_id, limit, offset],
                    summary_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(EventPage {
                events,
                total: total.max(0) as u64,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Per-status counts and the latest failing or retrying rows.
pub async fn health_summary(
    db: &Database,
    recent_limit: usize,
) -> Result<HealthSummary, TallyError> {
    let recent_limit = recent_limit as i64;
    db.connection()
        .call(move |conn| -> Result<HealthSummary, rusqlite::Error> {
            let mut stats = StatusCounts::default();
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM webhook_events GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                if let Ok(status) = status.parse::<EventStatus>() {
                    stats.record(status, count.max(0) as u64);
                }
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM webhook_events
                 WHERE status IN ('failure', 'retrying')
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT ?1"
            ))?;
            let recent_failures = stmt
                .query_map(params![recent_limit], summary_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(HealthSummary {
                stats,
                recent_failures,
            })
        })
        .await
        .map_err(map_tr_err)
}
