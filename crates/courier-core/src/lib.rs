// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier dispatcher.
//!
//! This crate provides the error type, the domain types (message tasks,
//! tenant rate configuration, provider responses) and the adapter traits
//! that the storage, provider, and dispatch crates meet at.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use types::{
    AdapterType, EnqueueOutcome, HealthStatus, MessageTask, NewTask, OutboundRequest, PolicyTag,
    ProviderResponse, RateOverride, RecipientId, StatusCounts, TaskId, TaskStatus, TenantId,
    TenantRateConfig, TenantSettings,
};

pub use traits::{PluginAdapter, ProviderClient, QueueStore, TenantConfigSource};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courier_error_variants_render() {
        let dup = CourierError::DuplicateKey {
            idempotency_key: "k-1".into(),
            existing: TaskId(3),
        };
        assert_eq!(
            dup.to_string(),
            "duplicate idempotency key `k-1` (existing task 3)"
        );

        let transition = CourierError::InvalidTransition {
            id: TaskId(9),
            from: TaskStatus::Sent,
            to: TaskStatus::Queued,
        };
        assert_eq!(transition.to_string(), "task 9 cannot move from sent to queued");

        let storage = CourierError::storage("disk full");
        assert_eq!(storage.to_string(), "storage error: disk full");

        assert_eq!(
            CourierError::NotRunning.to_string(),
            "worker supervisor is not running"
        );
    }

    #[test]
    fn adapter_type_round_trip() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Queue,
            AdapterType::Provider,
            AdapterType::Observability,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        // Compile-time check that the adapter traits are reachable from the root.
        fn _assert_queue_store<T: QueueStore>() {}
        fn _assert_provider<T: ProviderClient>() {}
        fn _assert_source<T: TenantConfigSource>() {}
        fn _assert_plugin<T: PluginAdapter>() {}
    }
}
