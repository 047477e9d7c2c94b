// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider client trait for the third-party messaging platform.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{OutboundRequest, ProviderResponse};

/// Sends a single message to the messaging platform.
///
/// A platform-level rejection (rate limit, policy, anything else the platform
/// answers with an error code) is `Ok(ProviderResponse::Rejected { .. })`.
/// `Err` is reserved for transport failures where no answer was received.
#[async_trait]
pub trait ProviderClient: PluginAdapter {
    async fn send(&self, request: &OutboundRequest) -> Result<ProviderResponse, CourierError>;
}
