// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store trait definitions.
//!
//! All stores use `#[async_trait]` so they can be shared as trait objects
//! between the ingress handler, the retry scheduler, and the recovery API.

pub mod event_log;
pub mod storage;
pub mod users;

pub use event_log::EventLogStore;
pub use storage::StorageAdapter;
pub use users::UserStore;
