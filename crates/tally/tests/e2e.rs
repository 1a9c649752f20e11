// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the webhook pipeline.
//!
//! Each test builds an isolated TestHarness (temp SQLite, flaky user store,
//! full router) and drives it with in-process requests. Tests are
//! independent and order-insensitive.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;
use tally_core::types::{EventFilter, PageRequest};
use tally_core::{EventLogStore, EventStatus, UserStore};
use tally_test_utils::{
    TestHarness, new_event_id, sign_request, user_created_body, user_deleted_body,
    user_updated_body,
};

// ---- Ingress: happy path and duplicates ----

#[tokio::test]
async fn created_event_creates_local_user() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();

    let (status, body) = harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["event"], "user.created");
    assert_eq!(body["subjectId"], "u1");
    assert!(body.get("nextRetry").is_none());

    let user = harness.storage.find_by_subject("u1").await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("a@example.com"));
    assert_eq!(user.first_name, "User");
    assert!(!user.onboarding_completed);

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Success);
    assert_eq!(event.attempt, 1);
    assert!(event.processed_at.is_some());
    assert_eq!(event.payload["type"], "user.created");
}

#[tokio::test]
async fn redelivered_event_is_not_reprocessed() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    let body = user_created_body("u1", "a@example.com");

    harness.post_webhook(&event_id, &body).await;
    let calls_after_first = harness.users.calls();

    let (status, response) = harness.post_webhook(&event_id, &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
    assert_eq!(harness.users.calls(), calls_after_first);

    assert_eq!(harness.storage.count_users().await.unwrap(), 1);
    let page = harness
        .storage
        .list_events(&EventFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn second_creation_event_for_same_user_is_a_noop() {
    let harness = TestHarness::start().await.unwrap();
    let body = user_created_body("u1", "a@example.com");

    harness.post_webhook(&new_event_id(), &body).await;
    let (status, response) = harness.post_webhook(&new_event_id(), &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
    assert_eq!(harness.storage.count_users().await.unwrap(), 1);
}

// ---- Ingress: rejection before logging ----

#[tokio::test]
async fn missing_signature_headers_are_rejected_without_logging() {
    let harness = TestHarness::start().await.unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .body(Body::from(user_created_body("u1", "a@example.com").to_string()))
        .unwrap();

    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let page = harness
        .storage
        .list_events(&EventFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(harness.users.calls(), 0);
}

#[tokio::test]
async fn forged_signature_is_rejected_without_logging() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    let payload = user_created_body("u1", "a@example.com").to_string();

    let mut request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .body(Body::from(payload.clone()))
        .unwrap();
    request.headers_mut().extend(sign_request(
        "whsec_b3RoZXItc2VjcmV0LWVudGlyZWx5",
        &event_id,
        payload.as_bytes(),
    ));

    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.storage.get_event(&event_id).await.unwrap().is_none());
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    let signed = user_created_body("u1", "a@example.com").to_string();
    let tampered = user_created_body("u1", "mallory@example.com").to_string();

    let mut request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .body(Body::from(tampered))
        .unwrap();
    request.headers_mut().extend(sign_request(
        tally_test_utils::TEST_SIGNING_SECRET,
        &event_id,
        signed.as_bytes(),
    ));

    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(harness.storage.count_users().await.unwrap(), 0);
}

// ---- Retry state machine ----

#[tokio::test]
async fn transient_failure_schedules_retry_and_scheduler_recovers() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    harness.users.fail_next(1);

    let before = Utc::now();
    let (status, body) = harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "acknowledged");
    assert!(body["nextRetry"].is_string());

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Retrying);
    assert_eq!(event.attempt, 2);
    assert!(event.error.as_deref().unwrap().contains("simulated"));
    let next = event.next_retry_at.unwrap();
    assert!(next >= before + Duration::milliseconds(1_000));
    assert!(next <= Utc::now() + Duration::milliseconds(2_000));

    let scheduler = harness.scheduler();
    let early = scheduler.scan_at(next - Duration::milliseconds(1)).await.unwrap();
    assert_eq!(early.scanned, 0);

    let report = scheduler.scan_at(next).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.succeeded, 1);

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Success);
    assert!(event.error.is_none());
    assert!(event.next_retry_at.is_none());
    assert!(harness.storage.find_by_subject("u1").await.unwrap().is_some());
}

#[tokio::test]
async fn persistent_failure_is_terminal_when_next_attempt_would_reach_ceiling() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    harness.users.fail_next(usize::MAX);

    harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;

    let scheduler = harness.scheduler();
    for _ in 0..10 {
        let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
        let Some(next) = event.next_retry_at else {
            break;
        };
        scheduler.scan_at(next).await.unwrap();
    }

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failure);
    assert_eq!(event.attempt, event.max_retries - 1);
    assert!(event.next_retry_at.is_none());

    let far_future = Utc::now() + Duration::days(365);
    let due = harness
        .storage
        .find_due_for_retry(10, far_future)
        .await
        .unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn missing_email_fails_without_retry() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    let body = json!({
        "type": "user.created",
        "data": {"id": "u_noemail", "email_addresses": []}
    });

    let (status, response) = harness.post_webhook(&event_id, &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "acknowledged");
    assert!(response.get("nextRetry").is_none());

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failure);
    assert_eq!(event.attempt, 1);
    assert!(event.error.as_deref().unwrap().contains("no email address"));
    assert_eq!(harness.storage.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_event_type_is_marked_success() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    let body = json!({"type": "session.created", "data": {"id": "sess_1"}});

    let (status, response) = harness.post_webhook(&event_id, &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
    assert_eq!(response["event"], "session.created");

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Success);
    assert_eq!(harness.users.calls(), 0);
}

// ---- Processors through the HTTP surface ----

#[tokio::test]
async fn update_before_create_converges() {
    let harness = TestHarness::start().await.unwrap();

    let (status, response) = harness
        .post_webhook(&new_event_id(), &user_updated_body("u2", "Grace", "Hopper"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");

    let user = harness.storage.find_by_subject("u2").await.unwrap().unwrap();
    assert_eq!(user.first_name, "Grace");
    assert_eq!(user.last_name, "Hopper");
    assert_eq!(user.username.as_deref(), Some("grace"));

    harness
        .post_webhook(&new_event_id(), &user_created_body("u2", "grace@example.com"))
        .await;
    let user = harness.storage.find_by_subject("u2").await.unwrap().unwrap();
    assert_eq!(user.first_name, "Grace");
    assert_eq!(harness.storage.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn deletion_is_idempotent() {
    let harness = TestHarness::start().await.unwrap();
    harness
        .post_webhook(&new_event_id(), &user_created_body("u3", "c@example.com"))
        .await;

    let (status, response) = harness
        .post_webhook(&new_event_id(), &user_deleted_body("u3"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
    assert!(harness.storage.find_by_subject("u3").await.unwrap().is_none());

    let (status, response) = harness
        .post_webhook(&new_event_id(), &user_deleted_body("u3"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
}

// ---- Manual recovery API ----

#[tokio::test]
async fn manual_retry_of_successful_event_is_rejected() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;
    let calls = harness.users.calls();

    let (status, body) = harness
        .operator_post(&format!("/webhooks/retry/{event_id}"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already processed"));
    assert_eq!(harness.users.calls(), calls);
}

#[tokio::test]
async fn manual_retry_of_unknown_event_is_not_found() {
    let harness = TestHarness::start().await.unwrap();
    let (status, _) = harness
        .operator_post("/webhooks/retry/msg_missing", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_retry_recovers_retrying_event() {
    let harness = TestHarness::start().await.unwrap();
    let event_id = new_event_id();
    harness.users.fail_next(1);
    harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;

    let (status, body) = harness
        .operator_post(&format!("/webhooks/retry/{event_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["event"]["status"], "success");
    assert_eq!(body["event"]["eventId"], event_id.as_str());
    assert!(harness.storage.find_by_subject("u1").await.unwrap().is_some());
}

#[tokio::test]
async fn logs_are_filtered_and_paginated() {
    let harness = TestHarness::start().await.unwrap();
    for (subject, email) in [("u1", "a@example.com"), ("u2", "b@example.com"), ("u3", "c@example.com")] {
        harness
            .post_webhook(&new_event_id(), &user_created_body(subject, email))
            .await;
    }
    harness
        .post_webhook(&new_event_id(), &user_deleted_body("u1"))
        .await;

    let (status, body) = harness.operator_get("/webhooks/logs?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["total"], 4);
    assert_eq!(body["pagination"]["pages"], 2);
    assert!(body["logs"][0].get("payload").is_none());

    let (_, body) = harness.operator_get("/webhooks/logs?limit=3&page=2").await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["page"], 2);

    let (_, body) = harness
        .operator_get("/webhooks/logs?eventType=user.deleted&status=success")
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["logs"][0]["subjectId"], "u1");

    let (_, body) = harness.operator_get("/webhooks/logs?subjectId=u2").await;
    assert_eq!(body["pagination"]["total"], 1);

    let (status, _) = harness.operator_get("/webhooks/logs?status=exploded").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_health_counts_statuses_and_lists_failures() {
    let harness = TestHarness::start().await.unwrap();
    harness
        .post_webhook(&new_event_id(), &user_created_body("u1", "a@example.com"))
        .await;
    let failed_id = new_event_id();
    harness
        .post_webhook(
            &failed_id,
            &json!({"type": "user.created", "data": {"id": "u9"}}),
        )
        .await;
    harness.users.fail_next(1);
    harness
        .post_webhook(&new_event_id(), &user_created_body("u2", "b@example.com"))
        .await;

    let request = Request::builder()
        .uri("/webhooks/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["stats"]["success"], 1);
    assert_eq!(body["stats"]["failure"], 1);
    assert_eq!(body["stats"]["retrying"], 1);
    assert_eq!(body["stats"]["pending"], 0);
    assert_eq!(body["recentFailures"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_fallback_is_idempotent() {
    let harness = TestHarness::start().await.unwrap();
    let request = json!({
        "subjectId": "u_fb",
        "email": "fb@example.com",
        "firstName": "Fall",
        "lastName": "Back"
    });

    let (status, body) = harness
        .operator_post("/webhooks/create-fallback", Some(&request))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "created");
    assert_eq!(body["user"]["subjectId"], "u_fb");
    assert_eq!(body["user"]["firstName"], "Fall");

    let (status, body) = harness
        .operator_post("/webhooks/create-fallback", Some(&request))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "exists");
    assert_eq!(harness.storage.count_users().await.unwrap(), 1);

    let (status, _) = harness
        .operator_post(
            "/webhooks/create-fallback",
            Some(&json!({"subjectId": "u_none"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---- Operator auth and public liveness ----

#[tokio::test]
async fn operator_routes_require_bearer_token() {
    let harness = TestHarness::start().await.unwrap();

    let anonymous = Request::builder()
        .uri("/webhooks/logs")
        .body(Body::empty())
        .unwrap();
    assert_eq!(harness.send(anonymous).await.0, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .method("POST")
        .uri("/webhooks/retry/msg_1")
        .header("authorization", "Bearer not-the-token")
        .body(Body::empty())
        .unwrap();
    assert_eq!(harness.send(wrong).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn operator_routes_fail_closed_without_configured_token() {
    let harness = TestHarness::builder()
        .without_admin_token()
        .build()
        .await
        .unwrap();
    let (status, _) = harness.operator_get("/webhooks/logs").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Provider deliveries are unaffected.
    let (status, _) = harness
        .post_webhook(&new_event_id(), &user_created_body("u1", "a@example.com"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn public_health_needs_no_auth() {
    let harness = TestHarness::start().await.unwrap();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tally");
}

#[tokio::test]
async fn custom_retry_ceiling_applies_to_new_events() {
    let harness = TestHarness::builder()
        .with_max_retries(2)
        .build()
        .await
        .unwrap();
    let event_id = new_event_id();
    harness.users.fail_next(1);

    harness
        .post_webhook(&event_id, &user_created_body("u1", "a@example.com"))
        .await;

    let event = harness.storage.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.max_retries, 2);
    assert_eq!(event.status, EventStatus::Failure);
}
