// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer-facing enqueue API.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use courier_core::{
    CourierError, EnqueueOutcome, NewTask, PolicyTag, QueueStore, RecipientId, TenantId,
};

/// Platform limit on message text, in characters.
pub const MAX_BODY_CHARS: usize = 2000;
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

/// An enqueue call as received from a producer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnqueueRequest {
    pub tenant_id: String,
    pub recipient_id: String,
    pub body: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub priority: i32,
    pub idempotency_key: String,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl EnqueueRequest {
    /// Checks the request and converts it into a task row.
    pub fn validate(&self) -> Result<NewTask, CourierError> {
        let required = [
            ("tenant_id", &self.tenant_id),
            ("recipient_id", &self.recipient_id),
            ("body", &self.body),
            ("idempotency_key", &self.idempotency_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CourierError::Validation(format!("{field} must not be empty")));
            }
        }

        let chars = self.body.chars().count();
        if chars > MAX_BODY_CHARS {
            return Err(CourierError::Validation(format!(
                "body is {chars} characters, limit is {MAX_BODY_CHARS}"
            )));
        }

        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(CourierError::Validation(format!(
                "priority {} outside {}..={}",
                self.priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            )));
        }

        let policy_tag = self
            .tag
            .as_deref()
            .map(|t| {
                PolicyTag::from_str(t)
                    .map_err(|_| CourierError::Validation(format!("unknown policy tag `{t}`")))
            })
            .transpose()?;

        Ok(NewTask {
            tenant_id: TenantId(self.tenant_id.clone()),
            recipient_id: RecipientId(self.recipient_id.clone()),
            body: self.body.clone(),
            policy_tag,
            priority: self.priority,
            idempotency_key: self.idempotency_key.clone(),
            not_before: self.not_before,
        })
    }
}

/// Validates and stores a task.
///
/// A known idempotency key is reported as [`EnqueueOutcome::Duplicate`]
/// carrying the existing task id, not as an error.
pub async fn enqueue(
    store: &dyn QueueStore,
    request: &EnqueueRequest,
) -> Result<EnqueueOutcome, CourierError> {
    let task = request.validate()?;
    match store.enqueue(&task).await {
        Ok(id) => {
            debug!(
                tenant_id = %task.tenant_id,
                task_id = %id,
                priority = task.priority,
                "task enqueued"
            );
            Ok(EnqueueOutcome::Enqueued(id))
        }
        Err(CourierError::DuplicateKey { existing, .. }) => {
            debug!(
                tenant_id = %task.tenant_id,
                task_id = %existing,
                idempotency_key = %task.idempotency_key,
                "duplicate enqueue"
            );
            Ok(EnqueueOutcome::Duplicate(existing))
        }
        Err(e) => Err(e),
    }
}
