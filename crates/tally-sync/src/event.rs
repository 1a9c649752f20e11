// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider event envelope and the typed per-event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::TallyError;
use tally_core::types::{USER_CREATED, USER_DELETED, USER_UPDATED, UserProfile};

/// The envelope every provider delivery shares: a type tag and an opaque object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl RawEvent {
    /// Parses a request body. Anything that is not a JSON object with a
    /// string `type` is rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self, TallyError> {
        serde_json::from_slice(body)
            .map_err(|e| TallyError::InvalidPayload(format!("malformed event body: {e}")))
    }

    /// Recovers the envelope from a stored event-log payload.
    pub fn from_value(payload: &Value) -> Result<Self, TallyError> {
        Self::deserialize(payload)
            .map_err(|e| TallyError::InvalidPayload(format!("malformed stored payload: {e}")))
    }

    /// `data.id`, or an empty string when the provider sent none.
    pub fn subject_id(&self) -> &str {
        self.data.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    /// Decodes `data` into the shape its type requires.
    pub fn decode(&self) -> Result<ProviderEvent, TallyError> {
        Ok(match self.event_type.as_str() {
            USER_CREATED => ProviderEvent::UserCreated(
                UserPayload::deserialize(&self.data).map_err(typed(USER_CREATED))?,
            ),
            USER_UPDATED => ProviderEvent::UserUpdated(
                UserPayload::deserialize(&self.data).map_err(typed(USER_UPDATED))?,
            ),
            USER_DELETED => ProviderEvent::UserDeleted(
                DeletedUserPayload::deserialize(&self.data).map_err(typed(USER_DELETED))?,
            ),
            other => ProviderEvent::Unknown {
                event_type: other.to_string(),
                subject_id: self.subject_id().to_string(),
            },
        })
    }
}

/// A decoded provider event. Each variant carries only what its processor needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    UserCreated(UserPayload),
    UserUpdated(UserPayload),
    UserDeleted(DeletedUserPayload),
    /// Accepted and acknowledged, never processed.
    Unknown {
        event_type: String,
        subject_id: String,
    },
}

impl ProviderEvent {
    pub fn event_type(&self) -> &str {
        match self {
            ProviderEvent::UserCreated(_) => USER_CREATED,
            ProviderEvent::UserUpdated(_) => USER_UPDATED,
            ProviderEvent::UserDeleted(_) => USER_DELETED,
            ProviderEvent::Unknown { event_type, .. } => event_type,
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            ProviderEvent::UserCreated(user) | ProviderEvent::UserUpdated(user) => &user.id,
            ProviderEvent::UserDeleted(deleted) => &deleted.id,
            ProviderEvent::Unknown { subject_id, .. } => subject_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub id: String,
    pub email_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: String,
    pub phone_number: String,
}

/// User object carried by `user.created` and `user.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
    #[serde(default)]
    pub primary_phone_number_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_sign_in_at: Option<i64>,
}

impl UserPayload {
    /// The address whose id matches `primary_email_address_id`, else the first one.
    /// Blank addresses count as absent.
    pub fn primary_email(&self) -> Option<&str> {
        let primary = self
            .primary_email_address_id
            .as_deref()
            .and_then(|id| self.email_addresses.iter().find(|e| e.id == id))
            .or_else(|| self.email_addresses.first())?;
        non_blank(&primary.email_address)
    }

    /// Same resolution as [`primary_email`](Self::primary_email), for phone numbers.
    pub fn primary_phone(&self) -> Option<&str> {
        let primary = self
            .primary_phone_number_id
            .as_deref()
            .and_then(|id| self.phone_numbers.iter().find(|p| p.id == id))
            .or_else(|| self.phone_numbers.first())?;
        non_blank(&primary.phone_number)
    }

    pub fn last_sign_in(&self) -> Option<DateTime<Utc>> {
        self.last_sign_in_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Maps the provider-authoritative fields onto a [`UserProfile`].
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            subject_id: self.id.clone(),
            email: self.primary_email().map(str::to_string),
            first_name: self.first_name.as_deref().and_then(non_blank).map(str::to_string),
            last_name: self.last_name.as_deref().and_then(non_blank).map(str::to_string),
            username: self.username.as_deref().and_then(non_blank).map(str::to_string),
            image_url: self.image_url.as_deref().and_then(non_blank).map(str::to_string),
            phone_number: self.primary_phone().map(str::to_string),
            last_sign_in_at: self.last_sign_in(),
        }
    }
}

/// Payload of `user.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedUserPayload {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

fn typed(what: &'static str) -> impl Fn(serde_json::Error) -> TallyError {
    move |e| TallyError::InvalidPayload(format!("{what} payload: {e}"))
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn created_body() -> Value {
        json!({
            "type": "user.created",
            "object": "event",
            "data": {
                "id": "user_2abc",
                "email_addresses": [
                    {"id": "idn_1", "email_address": "old@example.com"},
                    {"id": "idn_2", "email_address": "ada@example.com"}
                ],
                "primary_email_address_id": "idn_2",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "username": null,
                "image_url": "https://img.example.com/ada.png",
                "phone_numbers": [{"id": "phn_1", "phone_number": "+15550100"}],
                "last_sign_in_at": 1_767_225_600_000_i64
            }
        })
    }

    #[test]
    fn decodes_user_created_with_primary_email() {
        let raw = RawEvent::from_value(&created_body()).unwrap();
        let ProviderEvent::UserCreated(user) = raw.decode().unwrap() else {
            panic!("expected user.created");
        };
        assert_eq!(user.primary_email(), Some("ada@example.com"));
        assert_eq!(user.primary_phone(), Some("+15550100"));
        let profile = user.to_profile();
        assert_eq!(profile.subject_id, "user_2abc");
        assert_eq!(profile.first_name.as_deref(), Some("Ada"));
        assert!(profile.username.is_none());
        assert_eq!(
            profile.last_sign_in_at.unwrap().to_rfc3339(),
            "2026-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn primary_email_falls_back_to_first_entry() {
        let user: UserPayload = serde_json::from_value(json!({
            "id": "u1",
            "email_addresses": [{"id": "idn_1", "email_address": "first@example.com"}],
            "primary_email_address_id": "idn_missing"
        }))
        .unwrap();
        assert_eq!(user.primary_email(), Some("first@example.com"));
    }

    #[test]
    fn blank_or_missing_email_is_none() {
        let user: UserPayload = serde_json::from_value(json!({
            "id": "u1",
            "email_addresses": [{"id": "idn_1", "email_address": "  "}]
        }))
        .unwrap();
        assert_eq!(user.primary_email(), None);

        let bare: UserPayload = serde_json::from_value(json!({"id": "u2"})).unwrap();
        assert_eq!(bare.primary_email(), None);
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let raw = RawEvent::from_slice(
            br#"{"type":"session.created","data":{"id":"sess_1","user_id":"u1"}}"#,
        )
        .unwrap();
        let event = raw.decode().unwrap();
        assert_eq!(event.event_type(), "session.created");
        assert_eq!(event.subject_id(), "sess_1");
        assert!(matches!(event, ProviderEvent::Unknown { .. }));
    }

    #[test]
    fn known_type_with_wrong_shape_is_invalid_payload() {
        let raw = RawEvent::from_slice(br#"{"type":"user.deleted","data":{"deleted":true}}"#)
            .unwrap();
        let err = raw.decode().unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("user.deleted"));
    }

    #[test]
    fn body_without_type_is_rejected() {
        let err = RawEvent::from_slice(br#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, TallyError::InvalidPayload(_)));
        assert!(RawEvent::from_slice(b"not json").is_err());
    }
}
