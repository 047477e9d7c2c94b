// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml` >
//! `/etc/courier/courier.toml` with environment variable overrides via `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/courier/courier.toml";

/// Local configuration file, relative to the working directory.
pub const LOCAL_CONFIG_FILE: &str = "courier.toml";

/// Sections whose keys may be overridden from the environment.
const ENV_SECTIONS: &[&str] = &["daemon", "storage", "dispatch", "worker", "provider"];

/// Path of the per-user configuration file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("courier").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml`
/// 3. `~/.config/courier/courier.toml`
/// 4. `./courier.toml`
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider mapping `COURIER_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys themselves
/// contain underscores: `COURIER_WORKER_IDLE_POLL_MS` is `worker.idle_poll_ms`.
/// Variables that do not start with a known section are ignored.
fn env_provider() -> Env {
    Env::prefixed("COURIER_")
        .filter(|key| {
            ENV_SECTIONS
                .iter()
                .any(|section| key.as_str().starts_with(&format!("{section}_")))
        })
        .map(|key| {
            let key_str = key.as_str();
            let mapped = ENV_SECTIONS
                .iter()
                .find(|section| key_str.starts_with(&format!("{section}_")))
                .map(|section| key_str.replacen(&format!("{section}_"), &format!("{section}."), 1))
                .unwrap_or_else(|| key_str.to_string());
            mapped.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_worker_and_dispatch_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("COURIER_WORKER_IDLE_POLL_MS", "40");
            jail.set_env("COURIER_DISPATCH_BURST_CEILING", "7");
            jail.set_env("COURIER_UNRELATED", "ignored");
            jail.create_file("courier.toml", "[dispatch]\nbaseline_rate = 3.0\n")?;

            let config = load_config_from_path(Path::new("courier.toml"))?;
            assert_eq!(config.worker.idle_poll_ms, 40);
            assert_eq!(config.dispatch.burst_ceiling, 7);
            assert_eq!(config.dispatch.baseline_rate, 3.0);
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(LOCAL_CONFIG_FILE, "[daemon]\nlog_level = \"debug\"\n")?;
            let config = load_config()?;
            assert_eq!(config.daemon.log_level, "debug");
            Ok(())
        });
    }
}
