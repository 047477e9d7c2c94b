// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier dispatcher.

use thiserror::Error;

use crate::types::{TaskId, TaskStatus};

/// The primary error type used across all Courier adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging provider errors (transport failure, malformed response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A task with the same idempotency key already exists for the tenant.
    #[error("duplicate idempotency key `{idempotency_key}` (existing task {existing})")]
    DuplicateKey {
        idempotency_key: String,
        existing: TaskId,
    },

    /// Caller-supplied input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// No task exists with the given id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A status change was requested that the task state machine does not allow.
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// The worker supervisor is not running.
    #[error("worker supervisor is not running")]
    NotRunning,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wraps a plain message as a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        let message: String = message.into();
        CourierError::Storage {
            source: message.into(),
        }
    }

    /// Wraps a plain message as a provider error with no underlying cause.
    pub fn provider(message: impl Into<String>) -> Self {
        CourierError::Provider {
            message: message.into(),
            source: None,
        }
    }
}
