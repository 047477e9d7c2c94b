// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions at the seams of the dispatch engine.
//!
//! The queue store and the provider client extend the [`PluginAdapter`]
//! base trait and use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod provider;
pub mod queue;
pub mod tenant_source;

pub use adapter::PluginAdapter;
pub use provider::ProviderClient;
pub use queue::QueueStore;
pub use tenant_source::TenantConfigSource;
