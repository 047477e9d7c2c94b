// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider client for deterministic testing.
//!
//! `MockProvider` implements `ProviderClient` with scripted replies, enabling
//! fast tests of the dispatch loop without an HTTP endpoint. Every call is
//! recorded with the tokio clock time it arrived at, so tests running under
//! a paused clock can assert on pacing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use courier_core::{
    AdapterType, CourierError, HealthStatus, OutboundRequest, PluginAdapter, ProviderClient,
    ProviderResponse,
};

/// One scripted provider answer.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Accept and assign a generated message id.
    Deliver,
    /// Answer with a platform error code.
    Reject { code: i64, subcode: Option<i64> },
    /// Fail at the transport level.
    Fail(String),
    /// Never answer (until the caller's timeout or cancellation).
    Hang,
}

/// A send the mock received.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub request: OutboundRequest,
    pub at: Instant,
}

/// A mock provider that answers from a FIFO script.
///
/// When the script is empty every send is delivered.
#[derive(Clone, Default)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    sends: Arc<Mutex<Vec<RecordedSend>>>,
    latency: Option<Duration>,
    next_id: Arc<AtomicU64>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::default()
        }
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a reply to the script.
    pub async fn push_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Every send received so far, in arrival order.
    pub async fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.sends.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn send(&self, request: &OutboundRequest) -> Result<ProviderResponse, CourierError> {
        self.sends.lock().await.push(RecordedSend {
            request: request.clone(),
            at: Instant::now(),
        });
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or(MockReply::Deliver);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            MockReply::Deliver => {
                let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(ProviderResponse::Delivered {
                    message_id: format!("mock-mid-{n}"),
                })
            }
            MockReply::Reject { code, subcode } => Ok(ProviderResponse::Rejected {
                code,
                subcode,
                message: format!("mock rejection {code}"),
            }),
            MockReply::Fail(message) => Err(CourierError::provider(message)),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
        }
    }
}
