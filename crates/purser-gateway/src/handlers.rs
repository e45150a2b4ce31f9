// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! `POST /stripe-webhook` acknowledges as soon as the durable mutation
//! has committed; the user/admin notifications run as a detached task so
//! their failure can never turn into a webhook retry that re-delivers an
//! already-applied event.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use purser_core::PurserError;
use purser_payments::notify_outcome;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Success response body for the webhook endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
}

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: BTreeMap<String, String>,
}

/// Maps a processing error onto the webhook response status.
///
/// Authentication failures are 403 (the sender should not retry);
/// malformed payloads are 400; everything else is a 500 the sender may
/// retry, which is safe because deduplication makes redelivery a no-op.
fn status_for_error(err: &PurserError) -> StatusCode {
    match err {
        PurserError::SignatureInvalid { .. } => StatusCode::FORBIDDEN,
        PurserError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /stripe-webhook
pub async fn post_stripe_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "empty payload".into(),
            }),
        )
            .into_response();
    }

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        warn!("payment notification without signature header");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing signature".into(),
            }),
        )
            .into_response();
    };

    match state.processor.process(&body, signature).await {
        Ok(outcome) => {
            // Durable state is committed; notify out of band.
            let router = state.router.clone();
            tokio::spawn(async move {
                notify_outcome(&router, &outcome).await;
            });
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    status: "success".into(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            let status = status_for_error(&err);
            if status == StatusCode::FORBIDDEN {
                warn!(error = %err, "payment notification rejected");
            } else {
                error!(error = %err, "payment notification processing failed");
            }
            (
                status,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
///
/// Reports reachability of the durable store so operators can detect a
/// broken core. 503 when unhealthy; degraded states still return 200.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let mut components = BTreeMap::new();
    let mut status = "healthy";

    match state.db.health_check().await {
        Ok(()) => {
            components.insert("database".to_string(), "healthy".to_string());
        }
        Err(err) => {
            error!(error = %err, "database health check failed");
            components.insert("database".to_string(), "unhealthy".to_string());
            status = "unhealthy";
        }
    }

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    };
    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    info!(status = %body.status, "health check");
    (code, Json(body)).into_response()
}
