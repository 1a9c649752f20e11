// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Standard Webhooks signature verification.
//!
//! The provider signs `"{id}.{timestamp}.{body}"` with HMAC-SHA256 and sends
//! one or more space-separated `v1,<base64>` signatures. Secrets prefixed
//! with `whsec_` are base64; anything else is used as raw bytes.

use std::time::Duration;

use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tally_core::TallyError;

type HmacSha256 = Hmac<Sha256>;

/// Header prefixes accepted for the id/timestamp/signature triple, in lookup order.
const HEADER_PREFIXES: [&str; 3] = ["svix", "webhook", "event"];

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Identity of a delivery that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDelivery {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Verifies inbound deliveries against the pre-shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key", &"[redacted]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &str, tolerance: Duration) -> Result<Self, TallyError> {
        let key = match secret.strip_prefix(SECRET_PREFIX) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| TallyError::Config(format!("signing secret is not valid base64: {e}")))?,
            None => secret.as_bytes().to_vec(),
        };
        if key.is_empty() {
            return Err(TallyError::Config("signing secret is empty".into()));
        }
        Ok(Self { key, tolerance })
    }

    /// Verifies against the current time.
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<VerifiedDelivery, TallyError> {
        self.verify_at(headers, body, Utc::now())
    }

    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerifiedDelivery, TallyError> {
        let (Some(event_id), Some(timestamp), Some(signatures)) = (
            header(headers, "id"),
            header(headers, "timestamp"),
            header(headers, "signature"),
        ) else {
            return Err(TallyError::MissingHeaders);
        };

        let seconds: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| TallyError::VerificationFailed("timestamp is not an integer".into()))?;
        let sent_at = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| TallyError::VerificationFailed("timestamp out of range".into()))?;
        let skew = (now - sent_at).num_seconds().unsigned_abs();
        if skew > self.tolerance.as_secs() {
            return Err(TallyError::VerificationFailed(format!(
                "timestamp outside tolerance ({skew}s skew)"
            )));
        }

        let matched = signatures.split_whitespace().any(|candidate| {
            candidate
                .split_once(',')
                .filter(|(version, _)| *version == SIGNATURE_VERSION)
                .and_then(|(_, encoded)| STANDARD.decode(encoded).ok())
                .is_some_and(|sig| self.mac(event_id, timestamp, body).verify_slice(&sig).is_ok())
        });
        if !matched {
            return Err(TallyError::VerificationFailed("no matching signature".into()));
        }

        Ok(VerifiedDelivery {
            event_id: event_id.to_string(),
            timestamp: sent_at,
        })
    }

    /// The `v1,<base64>` signature for a delivery.
    pub fn sign(&self, event_id: &str, timestamp: &str, body: &[u8]) -> String {
        let digest = self.mac(event_id, timestamp, body).finalize().into_bytes();
        format!("{SIGNATURE_VERSION},{}", STANDARD.encode(digest))
    }

    fn mac(&self, event_id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(event_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

/// First non-empty `{prefix}-{name}` header across the accepted prefixes.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    HEADER_PREFIXES.iter().find_map(|prefix| {
        headers
            .get(format!("{prefix}-{name}"))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    fn signed_headers(verifier: &SignatureVerifier, id: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let ts = ts.to_string();
        let mut headers = HeaderMap::new();
        headers.insert("svix-id", HeaderValue::from_str(id).unwrap());
        headers.insert("svix-timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert(
            "svix-signature",
            HeaderValue::from_str(&verifier.sign(id, &ts, body)).unwrap(),
        );
        headers
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SECRET, Duration::from_secs(300)).unwrap()
    }

    #[test]
    fn valid_signature_verifies() {
        let v = verifier();
        let now = Utc::now();
        let body = br#"{"type":"user.created","data":{"id":"u1"}}"#;
        let headers = signed_headers(&v, "msg_1", now.timestamp(), body);

        let delivery = v.verify_at(&headers, body, now).unwrap();
        assert_eq!(delivery.event_id, "msg_1");
        assert_eq!(delivery.timestamp.timestamp(), now.timestamp());
    }

    #[test]
    fn tampered_body_fails() {
        let v = verifier();
        let now = Utc::now();
        let headers = signed_headers(&v, "msg_1", now.timestamp(), b"{\"a\":1}");
        let err = v.verify_at(&headers, b"{\"a\":2}", now).unwrap_err();
        assert!(matches!(err, TallyError::VerificationFailed(_)));
    }

    #[test]
    fn expired_timestamp_fails() {
        let v = verifier();
        let now = Utc::now();
        let body = b"{}";
        let headers = signed_headers(&v, "msg_1", now.timestamp() - 301, body);
        let err = v.verify_at(&headers, body, now).unwrap_err();
        assert!(err.to_string().contains("tolerance"));

        let future = signed_headers(&v, "msg_1", now.timestamp() + 301, body);
        assert!(v.verify_at(&future, body, now).is_err());
    }

    #[test]
    fn any_listed_signature_may_match() {
        let v = verifier();
        let now = Utc::now();
        let body = b"{}";
        let mut headers = signed_headers(&v, "msg_1", now.timestamp(), body);
        let good = headers["svix-signature"].to_str().unwrap().to_string();
        headers.insert(
            "svix-signature",
            HeaderValue::from_str(&format!("v1,AAAA v2,zzz {good}")).unwrap(),
        );
        assert!(v.verify_at(&headers, body, now).is_ok());
    }

    #[test]
    fn missing_header_is_reported_before_verification() {
        let v = verifier();
        let now = Utc::now();
        let mut headers = signed_headers(&v, "msg_1", now.timestamp(), b"{}");
        headers.remove("svix-signature");
        let err = v.verify_at(&headers, b"{}", now).unwrap_err();
        assert!(matches!(err, TallyError::MissingHeaders));
    }

    #[test]
    fn alternate_header_prefixes_are_accepted() {
        let v = verifier();
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let mut headers = HeaderMap::new();
        headers.insert("event-id", HeaderValue::from_static("msg_9"));
        headers.insert("event-timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert(
            "event-signature",
            HeaderValue::from_str(&v.sign("msg_9", &ts, b"{}")).unwrap(),
        );
        assert_eq!(v.verify_at(&headers, b"{}", now).unwrap().event_id, "msg_9");
    }

    #[test]
    fn raw_secret_and_bad_base64() {
        assert!(SignatureVerifier::new("plain-shared-secret", Duration::from_secs(1)).is_ok());
        assert!(SignatureVerifier::new("whsec_***", Duration::from_secs(1)).is_err());
        assert!(SignatureVerifier::new("", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", verifier());
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("MfKQ"));
    }
}
