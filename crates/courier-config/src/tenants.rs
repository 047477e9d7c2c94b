// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant settings read from the `[tenants.<id>]` sections of `courier.toml`.

use std::path::PathBuf;

use async_trait::async_trait;
use courier_core::{CourierError, TenantConfigSource, TenantSettings};

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// A [`TenantConfigSource`] backed by the configuration file.
///
/// Built from a path, every load re-reads the file so edits are picked up by
/// the next refresh. Built from an already loaded config, it is static.
#[derive(Debug, Clone)]
pub enum FileTenantSource {
    Path(PathBuf),
    Static(Vec<TenantSettings>),
}

impl FileTenantSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_config(config: &CourierConfig) -> Self {
        Self::Static(settings_from(config))
    }
}

fn settings_from(config: &CourierConfig) -> Vec<TenantSettings> {
    config
        .tenants
        .iter()
        .map(|(id, entry)| entry.to_settings(id))
        .collect()
}

#[async_trait]
impl TenantConfigSource for FileTenantSource {
    async fn load_tenants(&self) -> Result<Vec<TenantSettings>, CourierError> {
        match self {
            Self::Static(settings) => Ok(settings.clone()),
            Self::Path(path) => {
                let path = path.clone();
                let config = tokio::task::spawn_blocking(move || {
                    crate::load_and_validate_path(&path)
                })
                .await
                .map_err(|e| CourierError::Internal(format!("tenant file reader panicked: {e}")))?
                .map_err(|errors| {
                    let joined = errors
                        .iter()
                        .map(ConfigError::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    CourierError::Config(joined)
                })?;
                Ok(settings_from(&config))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::TenantId;

    #[tokio::test]
    async fn static_source_lists_configured_tenants() {
        let config = crate::load_and_validate_str(
            "[tenants.acme]\nbaseline_rate = 5.0\n\n[tenants.globex]\nenabled = false\n",
        )
        .unwrap();
        let source = FileTenantSource::from_config(&config);
        let tenants = source.load_tenants().await.unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].tenant_id, TenantId::from("acme"));
        assert_eq!(tenants[0].overrides.baseline_rate, Some(5.0));
        assert!(!tenants[1].enabled);
    }

    #[tokio::test]
    async fn path_source_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[tenants.acme]\nbaseline_rat = 5.0\n").unwrap();

        let err = FileTenantSource::from_path(&path)
            .load_tenants()
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Config(ref msg) if msg.contains("baseline_rat")));
    }
}
