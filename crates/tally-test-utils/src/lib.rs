// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - temp database, pipeline, scheduler, and router wired together
//! - [`FlakyUserStore`] - user store that fails a configurable number of calls
//! - [`sign_request`] - valid signature headers for a webhook body

pub mod flaky_store;
pub mod harness;
pub mod signing;

pub use flaky_store::FlakyUserStore;
pub use harness::{
    TEST_ADMIN_TOKEN, TEST_SIGNING_SECRET, TestHarness, new_event_id, user_created_body,
    user_deleted_body, user_updated_body,
};
pub use signing::{sign_request, signed_webhook_request};
