// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Send API.
//!
//! One request per call and no retries here: the dispatch loop owns retry,
//! requeue, and backoff decisions, so every platform answer is surfaced as-is.

use std::collections::HashMap;
use std::time::Duration;

use courier_core::{CourierError, OutboundRequest, ProviderResponse, TenantId};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::types::{ApiErrorResponse, SendRequest, SendResponse};

/// Send API client holding one page access token per tenant.
#[derive(Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    tokens: HashMap<TenantId, SecretString>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

impl GraphClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        connect_timeout: Duration,
        tokens: HashMap<TenantId, SecretString>,
    ) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CourierError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_version: api_version.into(),
            tokens,
        })
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/me/messages",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Sends one message.
    ///
    /// An error envelope from the platform becomes
    /// [`ProviderResponse::Rejected`]; anything that prevented getting a
    /// readable answer is an `Err`.
    pub async fn send(&self, request: &OutboundRequest) -> Result<ProviderResponse, CourierError> {
        let token = self.tokens.get(&request.tenant_id).ok_or_else(|| {
            CourierError::Config(format!(
                "no page token configured for tenant {}",
                request.tenant_id
            ))
        })?;

        let body = SendRequest::from_outbound(request);
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CourierError::Provider {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(
            tenant_id = %request.tenant_id,
            recipient_id = %request.recipient_id,
            status = %status,
            "send API response received"
        );

        if status.is_success() {
            let sent: SendResponse =
                serde_json::from_str(&text).map_err(|e| CourierError::Provider {
                    message: format!("failed to parse send response: {e}"),
                    source: Some(Box::new(e)),
                })?;
            return Ok(ProviderResponse::Delivered {
                message_id: sent.message_id,
            });
        }

        match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(api_err) => Ok(ProviderResponse::Rejected {
                code: api_err.error.code,
                subcode: api_err.error.error_subcode,
                message: api_err.error.message,
            }),
            Err(_) => Err(CourierError::provider(format!(
                "API returned {status}: {text}"
            ))),
        }
    }
}
