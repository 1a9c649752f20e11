// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotent reconcilers for the user lifecycle events.
//!
//! Every function here is safe to run any number of times with the same
//! input: a repeat run converges on the same local row, or reports that
//! nothing was left to do. These functions are the only writers of
//! [`LocalUser`] rows.

use chrono::Utc;
use tally_core::types::{LocalUser, UserProfile};
use tally_core::{TallyError, UserStore};
use tracing::debug;

use crate::event::{DeletedUserPayload, UserPayload};

/// What a processor run did to the local user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Created,
    /// A row already matched by subject id or email; nothing written.
    AlreadySynced,
    Upserted,
    Deleted,
    /// The row to delete was already gone.
    AlreadyAbsent,
    /// Event type has no processor.
    Skipped,
}

/// Creates the local user unless one already exists for the subject or email.
///
/// A missing primary email is permanent: retrying cannot produce one.
pub async fn process_user_creation(
    users: &dyn UserStore,
    user: &UserPayload,
) -> Result<Reconciled, TallyError> {
    let profile = user.to_profile();
    let Some(email) = profile.email.as_deref() else {
        return Err(TallyError::MissingEmail {
            subject_id: user.id.clone(),
        });
    };

    if let Some(existing) = users.find_by_subject_or_email(&user.id, Some(email)).await? {
        debug!(
            subject_id = %user.id,
            matched_subject = %existing.subject_id,
            "local user already present"
        );
        return Ok(Reconciled::AlreadySynced);
    }

    users.insert_user(&profile.into_new_user(Utc::now())).await?;
    Ok(Reconciled::Created)
}

/// Overwrites the mutable fields, creating the row if the update arrived first.
pub async fn process_user_update(
    users: &dyn UserStore,
    user: &UserPayload,
) -> Result<Reconciled, TallyError> {
    users.upsert_user(&user.to_profile()).await?;
    Ok(Reconciled::Upserted)
}

pub async fn process_user_deletion(
    users: &dyn UserStore,
    deleted: &DeletedUserPayload,
) -> Result<Reconciled, TallyError> {
    if users.delete_by_subject(&deleted.id).await? {
        Ok(Reconciled::Deleted)
    } else {
        Ok(Reconciled::AlreadyAbsent)
    }
}

/// Operator path for a user whose creation event never arrived.
///
/// Returns the stored row and whether it was created by this call.
pub async fn create_fallback_user(
    users: &dyn UserStore,
    profile: UserProfile,
) -> Result<(LocalUser, bool), TallyError> {
    if profile.subject_id.trim().is_empty() {
        return Err(TallyError::InvalidPayload("subject id is required".into()));
    }
    let Some(email) = profile.email.clone() else {
        return Err(TallyError::MissingEmail {
            subject_id: profile.subject_id,
        });
    };

    if let Some(existing) = users
        .find_by_subject_or_email(&profile.subject_id, Some(&email))
        .await?
    {
        return Ok((existing, false));
    }

    let user = profile.into_new_user(Utc::now());
    users.insert_user(&user).await?;
    // Re-read so timestamps carry the stored precision.
    let stored = users
        .find_by_subject(&user.subject_id)
        .await?
        .unwrap_or(user);
    Ok((stored, true))
}
