// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs its SQL on
//! the single writer connection.

pub mod users;
pub mod webhook_events;
