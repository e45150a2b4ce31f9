// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup instead of silently ignoring typos.

use serde::{Deserialize, Serialize};

use purser_core::PurserError;

/// Top-level Purser configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PurserConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Telegram transport and workspace settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Stripe webhook settings.
    #[serde(default)]
    pub stripe: StripeConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook/health HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl PurserConfig {
    /// Validates that everything `purser serve` needs is present.
    ///
    /// Loading tolerates an incomplete config (e.g. for `purser seed`
    /// against a fresh database); serving does not.
    pub fn validate_for_serve(&self) -> Result<(), PurserError> {
        let mut missing = Vec::new();
        if self.telegram.bot_token.as_deref().unwrap_or("").is_empty() {
            missing.push("telegram.bot_token");
        }
        if self.telegram.workspace_id.is_none() {
            missing.push("telegram.workspace_id");
        }
        if self.stripe.webhook_secret.as_deref().unwrap_or("").is_empty() {
            missing.push("stripe.webhook_secret");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PurserError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of this deployment.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "purser".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram transport and workspace configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required for `serve`.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat id of the shared admin workspace (forum supergroup).
    #[serde(default)]
    pub workspace_id: Option<i64>,

    /// User ids treated as admins when they post inside the workspace.
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,

    /// Debit one credit per inbound user message. When the debit would
    /// drive the balance negative the message is rejected, not clamped.
    #[serde(default = "default_debit_per_message")]
    pub debit_per_message: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            workspace_id: None,
            admin_user_ids: Vec::new(),
            debit_per_message: default_debit_per_message(),
        }
    }
}

fn default_debit_per_message() -> bool {
    true
}

/// Stripe webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    /// Shared webhook signing secret (`whsec_...`). Required for `serve`.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Maximum accepted age of a signed notification, in seconds.
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            signature_tolerance_secs: default_signature_tolerance(),
        }
    }
}

fn default_signature_tolerance() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("purser").join("purser.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "purser.db".to_string())
}

/// Webhook/health HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8743
}
