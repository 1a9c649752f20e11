// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local user queries used by the event processors and the fallback route.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tally_core::TallyError;
use tally_core::types::{LocalUser, PLACEHOLDER_FIRST_NAME, UserProfile};

use crate::database::{Database, map_tr_err};
use crate::models::{USER_COLUMNS, format_ts, user_from_row};

fn select_user(
    conn: &rusqlite::Connection,
    subject_id: &str,
) -> Result<Option<LocalUser>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM local_users WHERE subject_id = ?1"),
        params![subject_id],
        user_from_row,
    )
    .optional()
}

/// First row matching the subject id or, failing that, the email.
pub async fn find_by_subject_or_email(
    db: &Database,
    subject_id: &str,
    email: Option<&str>,
) -> Result<Option<LocalUser>, TallyError> {
    let subject_id = subject_id.to_string();
    let email = email.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Option<LocalUser>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM local_users
                     WHERE subject_id = ?1 OR (?2 IS NOT NULL AND email = ?2)
                     ORDER BY subject_id = ?1 DESC
                     LIMIT 1"
                ),
                params![subject_id, email],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_subject(
    db: &Database,
    subject_id: &str,
) -> Result<Option<LocalUser>, TallyError> {
    let subject_id = subject_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<LocalUser>, rusqlite::Error> {
            select_user(conn, &subject_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Plain insert. A duplicate subject id or email surfaces as a storage error.
pub async fn insert_user(db: &Database, user: &LocalUser) -> Result<(), TallyError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO local_users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    user.subject_id,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.username,
                    user.image_url,
                    user.phone_number,
                    user.last_sign_in_at.map(format_ts),
                    user.onboarding_completed,
                    format_ts(user.created_at),
                    format_ts(user.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert-or-overwrite keyed by subject id.
///
/// Names fall back to the stored value, then to placeholders. Email is only
/// replaced when the profile carries one. The remaining profile fields are
/// provider-authoritative and overwritten as given.
pub async fn upsert_user(
    db: &Database,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Result<LocalUser, TallyError> {
    let profile = profile.clone();
    let now = format_ts(now);
    db.connection()
        .call(move |conn| -> Result<LocalUser, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO local_users
                    (subject_id, email, first_name, last_name, username, image_url,
                     phone_number, last_sign_in_at, onboarding_completed,
                     created_at, updated_at)
                 VALUES (?1, ?2, COALESCE(?3, ?10), COALESCE(?4, ''), ?5, ?6, ?7, ?8, 0, ?9, ?9)
                 ON CONFLICT(subject_id) DO UPDATE SET
                    email = COALESCE(excluded.email, local_users.email),
                    first_name = COALESCE(?3, local_users.first_name),
                    last_name = COALESCE(?4, local_users.last_name),
                    username = excluded.username,
                    image_url = excluded.image_url,
                    phone_number = excluded.phone_number,
                    last_sign_in_at = excluded.last_sign_in_at,
                    updated_at = excluded.updated_at",
                params![
                    profile.subject_id,
                    profile.email,
                    profile.first_name,
                    profile.last_name,
                    profile.username,
                    profile.image_url,
                    profile.phone_number,
                    profile.last_sign_in_at.map(format_ts),
                    now,
                    PLACEHOLDER_FIRST_NAME,
                ],
            )?;
            let stored =
                select_user(&tx, &profile.subject_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Returns whether a row was removed.
pub async fn delete_by_subject(db: &Database, subject_id: &str) -> Result<bool, TallyError> {
    let subject_id = subject_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = conn.execute(
                "DELETE FROM local_users WHERE subject_id = ?1",
                params![subject_id],
            )?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_users(db: &Database) -> Result<u64, TallyError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM local_users", [], |row| row.get(0))
        })
        .await
        .map(|n| n.max(0) as u64)
        .map_err(map_tr_err)
}
