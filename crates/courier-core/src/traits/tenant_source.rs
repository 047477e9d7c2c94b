// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source of per-tenant settings consumed by the configuration provider.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::TenantSettings;

/// Supplies the known tenants, their enabled flag, and their rate overrides.
///
/// Implementations may be unreachable at times; the configuration provider
/// keeps serving the last successful load.
#[async_trait]
pub trait TenantConfigSource: Send + Sync + 'static {
    async fn load_tenants(&self) -> Result<Vec<TenantSettings>, CourierError>;
}
