// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted provider that records every send
//! - [`StaticTenantSource`] - in-memory tenant list that can be made to fail
//! - [`TestHarness`] - temp SQLite queue store wired to the mocks

pub mod harness;
pub mod mock_provider;
pub mod tenant_source;

pub use harness::{TestHarness, TestHarnessBuilder, fast_worker_config, new_task, tagged_task};
pub use mock_provider::{MockProvider, MockReply, RecordedSend};
pub use tenant_source::{StaticTenantSource, enabled_tenant};
