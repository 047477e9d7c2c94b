// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graph-style Send API provider for Courier.
//!
//! Implements [`ProviderClient`] over HTTP: one `POST {base}/{version}/me/messages`
//! per task, authenticated with the tenant's page access token. Platform error
//! envelopes are returned as [`ProviderResponse::Rejected`] so the dispatch
//! loop can classify them by code.

pub mod client;
pub mod types;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::ProviderConfig;
use courier_core::{
    AdapterType, CourierError, HealthStatus, OutboundRequest, PluginAdapter, ProviderClient,
    ProviderResponse, TenantId,
};
use secrecy::SecretString;
use tracing::info;

pub use client::GraphClient;

/// Send API provider adapter.
#[derive(Debug, Clone)]
pub struct GraphProvider {
    client: GraphClient,
}

impl GraphProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, CourierError> {
        let tokens: HashMap<TenantId, SecretString> = config
            .page_tokens
            .iter()
            .map(|(tenant, token)| (TenantId(tenant.clone()), SecretString::from(token.clone())))
            .collect();
        info!(
            base_url = %config.base_url,
            api_version = %config.api_version,
            tenants = tokens.len(),
            "graph provider configured"
        );
        let client = GraphClient::new(
            config.base_url.clone(),
            config.api_version.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            tokens,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PluginAdapter for GraphProvider {
    fn name(&self) -> &str {
        "graph"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        if self.client.has_tokens() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(
                "no page tokens configured".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ProviderClient for GraphProvider {
    async fn send(&self, request: &OutboundRequest) -> Result<ProviderResponse, CourierError> {
        self.client.send(request).await
    }
}
