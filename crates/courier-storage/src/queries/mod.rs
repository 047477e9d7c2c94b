// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the queue, tenant settings, and recipient activity.
//!
//! Every function takes the current time explicitly; timestamps are stored
//! as unix epoch milliseconds.

pub mod activity;
pub mod tasks;
pub mod tenants;

use chrono::{DateTime, Utc};

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
