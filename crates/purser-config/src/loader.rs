// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < `/etc/purser/purser.toml` <
//! `~/.config/purser/purser.toml` < `./purser.toml` < `PURSER_*` env vars.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::PurserConfig;

/// Load configuration from the standard XDG hierarchy with env overrides.
pub fn load_config() -> Result<PurserConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PurserConfig::default()))
        .merge(Toml::file("/etc/purser/purser.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("purser/purser.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("purser.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file or env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<PurserConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PurserConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<PurserConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PurserConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// key names stay unambiguous: `PURSER_TELEGRAM_BOT_TOKEN` must map to
/// `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("PURSER_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("telegram_", "telegram.", 1)
            .replacen("stripe_", "stripe.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
