// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serde model of the webhook envelope and the object fields the
//! pipeline reads.
//!
//! Events carry far more than we consume; everything unused is left in
//! `data.object` untyped and ignored.

use std::collections::HashMap;

use purser_core::{PurserError, UserId};
use serde::Deserialize;

/// The webhook envelope common to all event types.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PurserError> {
        serde_json::from_slice(payload)
            .map_err(|e| PurserError::Validation(format!("malformed event payload: {e}")))
    }

    /// Deserializes `data.object` into the type a handler expects.
    pub fn object<T: for<'de> Deserialize<'de>>(&self) -> Result<T, PurserError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| PurserError::Validation(format!("malformed {} object: {e}", self.event_type)))
    }
}

/// `checkout.session.completed` payload fields.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// The end user the purchase belongs to: `metadata.user_id` first,
    /// `client_reference_id` as fallback (both are written at checkout
    /// creation time).
    pub fn user_id(&self) -> Result<UserId, PurserError> {
        let raw = self
            .metadata
            .get("user_id")
            .cloned()
            .or_else(|| self.client_reference_id.clone())
            .ok_or_else(|| {
                PurserError::Validation("checkout session carries no user reference".into())
            })?;
        raw.parse::<i64>().map(UserId).map_err(|_| {
            PurserError::Validation(format!("unparseable user reference: {raw}"))
        })
    }

    /// The catalog price the purchase references.
    pub fn price_id(&self) -> Option<&str> {
        self.metadata.get("price_id").map(String::as_str)
    }

    /// Caller-supplied idempotency key, when the checkout tooling wrote
    /// one into metadata.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.metadata.get("idempotency_key").map(String::as_str)
    }
}

/// `payment_intent.payment_failed` payload fields.
#[derive(Debug, Deserialize)]
pub struct FailedPaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentError {
    #[serde(default)]
    pub message: Option<String>,
}

impl FailedPaymentIntent {
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata
            .get("user_id")
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(UserId)
    }

    pub fn failure_message(&self) -> &str {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .unwrap_or("unknown error")
    }
}

/// `charge.dispute.created` payload fields.
#[derive(Debug, Deserialize)]
pub struct Dispute {
    pub id: String,
    pub charge: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl Dispute {
    /// The identifier our transaction log keyed the grant on. Grants are
    /// recorded under the session's payment intent; the raw charge id is
    /// the fallback.
    pub fn charge_reference(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.charge)
    }
}
