// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `tally-core`.
//!
//! Timestamps are stored as RFC 3339 UTC text with millisecond precision,
//! so lexical comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub use tally_core::types::{LocalUser, WebhookEvent, WebhookEventSummary};
use tally_core::EventStatus;

/// Column list matching [`event_from_row`].
pub(crate) const EVENT_COLUMNS: &str = "event_id, event_type, subject_id, status, attempt, \
     max_retries, payload, error, processed_at, next_retry_at, created_at, updated_at";

/// Column list matching [`summary_from_row`].
pub(crate) const SUMMARY_COLUMNS: &str = "event_id, event_type, subject_id, status, attempt, \
     max_retries, error, processed_at, next_retry_at, created_at, updated_at";

/// Column list matching [`user_from_row`].
pub(crate) const USER_COLUMNS: &str = "subject_id, email, first_name, last_name, username, \
     image_url, phone_number, last_sign_in_at, onboarding_completed, created_at, updated_at";

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<EventStatus> {
    let raw: String = row.get(idx)?;
    raw.parse::<EventStatus>().map_err(|e| conversion_err(idx, e))
}

/// Maps a row selected with [`EVENT_COLUMNS`].
pub(crate) fn event_from_row(row: &Row<'_>) -> rusqlite::Result<WebhookEvent> {
    let payload: String = row.get(6)?;
    Ok(WebhookEvent {
        event_id: row.get(0)?,
        event_type: row.get(1)?,
        subject_id: row.get(2)?,
        status: status_at(row, 3)?,
        attempt: row.get(4)?,
        max_retries: row.get(5)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_err(6, e))?,
        error: row.get(7)?,
        processed_at: opt_ts_at(row, 8)?,
        next_retry_at: opt_ts_at(row, 9)?,
        created_at: ts_at(row, 10)?,
        updated_at: ts_at(row, 11)?,
    })
}

/// Maps a row selected with [`SUMMARY_COLUMNS`].
pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<WebhookEventSummary> {
    Ok(WebhookEventSummary {
        event_id: row.get(0)?,
        event_type: row.get(1)?,
        subject_id: row.get(2)?,
        status: status_at(row, 3)?,
        attempt: row.get(4)?,
        max_retries: row.get(5)?,
        error: row.get(6)?,
        processed_at: opt_ts_at(row, 7)?,
        next_retry_at: opt_ts_at(row, 8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}

/// Maps a row selected with [`USER_COLUMNS`].
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<LocalUser> {
    Ok(LocalUser {
        subject_id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        image_url: row.get(5)?,
        phone_number: row.get(6)?,
        last_sign_in_at: opt_ts_at(row, 7)?,
        onboarding_completed: row.get(8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}
