// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `purser status` command implementation.
//!
//! Connects to the gateway health endpoint to display store
//! reachability and uptime. Falls back gracefully when the bridge is
//! not running.

use std::collections::BTreeMap;
use std::time::Duration;

use purser_config::PurserConfig;
use purser_core::PurserError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
    #[serde(default)]
    components: BTreeMap<String, String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub components: BTreeMap<String, String>,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `purser status` command.
pub async fn run_status(config: &PurserConfig, json: bool) -> Result<(), PurserError> {
    let url = format!(
        "http://{}:{}/health",
        config.gateway.host, config.gateway.port
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| PurserError::Internal(format!("http client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(response) => response.json::<HealthResponse>().await.ok(),
        Err(_) => None,
    };

    let output = match health {
        Some(health) => StatusResponse {
            running: true,
            status: health.status,
            version: Some(health.version),
            uptime_secs: Some(health.uptime_secs),
            components: health.components,
        },
        None => StatusResponse {
            running: false,
            status: "unreachable".to_string(),
            version: None,
            uptime_secs: None,
            components: BTreeMap::new(),
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| PurserError::Internal(format!("serialize status: {e}")))?
        );
        return Ok(());
    }

    if output.running {
        println!("purser: {}", output.status);
        if let Some(version) = &output.version {
            println!("  version: {version}");
        }
        if let Some(uptime) = output.uptime_secs {
            println!("  uptime:  {}", format_uptime(uptime));
        }
        for (component, state) in &output.components {
            println!("  {component}: {state}");
        }
    } else {
        println!("purser: not running (no gateway at {url})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3 * 60), "3m");
        assert_eq!(format_uptime(2 * 3600 + 5 * 60), "2h 5m");
        assert_eq!(format_uptime(3 * 86400 + 3600), "3d 1h 0m");
    }

    #[test]
    fn status_response_serializes() {
        let response = StatusResponse {
            running: false,
            status: "unreachable".into(),
            version: None,
            uptime_secs: None,
            components: BTreeMap::new(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"running\":false"));
    }
}
