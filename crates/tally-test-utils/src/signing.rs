// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request signing helpers for driving `POST /webhooks` in tests.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request};
use chrono::Utc;
use tally_gateway::SignatureVerifier;

/// Signature headers (`svix-id`, `svix-timestamp`, `svix-signature`) for `body`,
/// timestamped now.
pub fn sign_request(secret: &str, event_id: &str, body: &[u8]) -> HeaderMap {
    let verifier = SignatureVerifier::new(secret, Duration::from_secs(300))
        .unwrap_or_else(|e| panic!("test signing secret is invalid: {e}"));
    let timestamp = Utc::now().timestamp().to_string();
    let signature = verifier.sign(event_id, &timestamp, body);

    let mut headers = HeaderMap::new();
    let pairs: [(&'static str, &str); 3] = [
        ("svix-id", event_id),
        ("svix-timestamp", timestamp.as_str()),
        ("svix-signature", signature.as_str()),
    ];
    for (name, value) in pairs {
        headers.insert(
            name,
            HeaderValue::from_str(value)
                .unwrap_or_else(|e| panic!("invalid header value for {name}: {e}")),
        );
    }
    headers
}

/// A complete signed `POST /webhooks` request.
pub fn signed_webhook_request(secret: &str, event_id: &str, body: &[u8]) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .body(Body::from(body.to_vec()))
        .unwrap_or_else(|e| panic!("failed to build request: {e}"));
    request
        .headers_mut()
        .extend(sign_request(secret, event_id, body));
    request
}
