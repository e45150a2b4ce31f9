// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, shared state, and the listener lifecycle.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use purser_core::PurserError;
use purser_payments::PaymentProcessor;
use purser_router::RoutingEngine;
use purser_storage::Database;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Payment pipeline (steps 1-4).
    pub processor: Arc<PaymentProcessor>,
    /// Routing engine used by the detached notify step.
    pub router: Arc<RoutingEngine>,
    /// Store handle for the health probe.
    pub db: Database,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Gateway server configuration (mirrors GatewayConfig from purser-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Builds the gateway route table.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/stripe-webhook", post(handlers::post_stripe_webhook))
        .route("/health", get(handlers::get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the gateway HTTP server and serves until the task is dropped.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), PurserError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| PurserError::Channel {
                message: format!("failed to bind gateway to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app(state))
        .await
        .map_err(|e| PurserError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug_prints_address() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8743,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
        assert!(debug.contains("8743"));
    }
}
