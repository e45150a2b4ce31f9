// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The payment event processor: verify -> deduplicate -> resolve ->
//! apply -> notify.
//!
//! Steps 1-4 run synchronously inside [`PaymentProcessor::process`]; the
//! caller acknowledges the sender once it returns, because the durable
//! mutation has committed by then. Step 5 ([`notify_outcome`]) is
//! best-effort, retried with bounded backoff, and deliberately decoupled:
//! a confirmation failure never rolls back a grant.

use std::time::Duration;

use purser_core::backoff::{retry, BackoffPolicy};
use purser_core::{PurserError, UserId};
use purser_router::RoutingEngine;
use purser_storage::{
    Catalog, ClawbackOutcome, GrantApplication, GrantOutcome, LedgerStore, ProductRecord,
    TransactionLog, TransactionRecord,
};
use tracing::{info, warn};

use crate::event::{CheckoutSession, Dispute, FailedPaymentIntent, WebhookEvent};
use crate::signature;

/// What processing one verified notification did to durable state.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// Credits granted exactly once; confirmation owed to the user.
    Granted {
        transaction: TransactionRecord,
        new_balance: i64,
    },
    /// Recognized redelivery; nothing mutated.
    Duplicate { transaction: TransactionRecord },
    /// The grant could not apply; a `failed` transaction records it for
    /// manual review.
    GrantFailed {
        transaction: TransactionRecord,
        reason: String,
    },
    /// A failed-payment notification was recorded.
    FailureRecorded { transaction: TransactionRecord },
    /// A dispute moved its grant to `refunded` and clawed back what the
    /// balance allowed.
    Disputed {
        transaction: TransactionRecord,
        clawed_back: i64,
        balance_short: bool,
    },
    /// A dispute that matched no completed grant; flagged for manual
    /// reconciliation.
    DisputeUnmatched { reference: String },
    /// Event type we do not handle; acknowledged so the sender stops
    /// redelivering.
    Ignored { event_type: String },
}

/// Converts verified payment notifications into ledger state.
pub struct PaymentProcessor {
    ledger: LedgerStore,
    txlog: TransactionLog,
    catalog: Catalog,
    webhook_secret: String,
    tolerance: Duration,
}

impl PaymentProcessor {
    pub fn new(
        ledger: LedgerStore,
        txlog: TransactionLog,
        catalog: Catalog,
        webhook_secret: String,
        tolerance: Duration,
    ) -> Self {
        Self {
            ledger,
            txlog,
            catalog,
            webhook_secret,
            tolerance,
        }
    }

    /// Runs steps 1-4 on a raw notification.
    ///
    /// Signature verification happens before the body is parsed; an
    /// unverified notification touches no persisted state.
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<PaymentOutcome, PurserError> {
        signature::verify(
            payload,
            signature_header,
            &self.webhook_secret,
            self.tolerance,
            chrono::Utc::now().timestamp(),
        )?;

        let event = WebhookEvent::parse(payload)?;
        info!(event_id = %event.id, event_type = %event.event_type, "payment event verified");
        self.dispatch(&event).await
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<PaymentOutcome, PurserError> {
        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(event).await,
            "payment_intent.payment_failed" => self.handle_payment_failed(event).await,
            "charge.dispute.created" => self.handle_dispute(event).await,
            other => {
                info!(event_type = other, "unhandled payment event type, acknowledging");
                Ok(PaymentOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        event: &WebhookEvent,
    ) -> Result<PaymentOutcome, PurserError> {
        let session: CheckoutSession = event.object()?;
        let user_id = session.user_id()?;
        let key = session
            .idempotency_key()
            .unwrap_or(event.id.as_str())
            .to_string();

        // Deduplicate before resolving: a replayed event must not depend
        // on the catalog still containing its product.
        if let Some(existing) = self.txlog.find_by_idempotency_key(&key).await? {
            return Ok(PaymentOutcome::Duplicate {
                transaction: existing,
            });
        }

        self.ledger.ensure_user(user_id).await?;

        let product = match session.price_id() {
            Some(price_id) => self.catalog.find_by_price_id(price_id).await?,
            None => None,
        };
        let Some(product) = product else {
            let price = session.price_id().unwrap_or("<none>").to_string();
            let reason = PurserError::UnknownProduct {
                price_id: price.clone(),
            }
            .to_string();
            warn!(price_id = %price, user_id = %user_id, "payment references no catalog entry");
            let transaction = self
                .txlog
                .record_failed(
                    user_id,
                    &key,
                    session.amount_total.unwrap_or(0),
                    session.payment_intent.clone(),
                    &reason,
                )
                .await?;
            return Ok(PaymentOutcome::GrantFailed {
                transaction,
                reason,
            });
        };

        let grant = grant_for(&session, user_id, &key, &product);
        match self.txlog.apply_grant(&grant).await? {
            GrantOutcome::Applied {
                transaction,
                new_balance,
            } => Ok(PaymentOutcome::Granted {
                transaction,
                new_balance,
            }),
            GrantOutcome::Duplicate { transaction } => {
                Ok(PaymentOutcome::Duplicate { transaction })
            }
            GrantOutcome::Failed {
                transaction,
                reason,
            } => Ok(PaymentOutcome::GrantFailed {
                transaction,
                reason,
            }),
        }
    }

    async fn handle_payment_failed(
        &self,
        event: &WebhookEvent,
    ) -> Result<PaymentOutcome, PurserError> {
        let intent: FailedPaymentIntent = event.object()?;
        let Some(user_id) = intent.user_id() else {
            // No way to attribute the failure; acknowledge so the sender
            // stops redelivering.
            warn!(event_id = %event.id, "failed payment carries no user reference");
            return Ok(PaymentOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        };

        self.ledger.ensure_user(user_id).await?;
        let reason = format!("payment failed: {}", intent.failure_message());
        let transaction = self
            .txlog
            .record_failed(
                user_id,
                &event.id,
                intent.amount.unwrap_or(0),
                Some(intent.id.clone()),
                &reason,
            )
            .await?;
        Ok(PaymentOutcome::FailureRecorded { transaction })
    }

    async fn handle_dispute(&self, event: &WebhookEvent) -> Result<PaymentOutcome, PurserError> {
        let dispute: Dispute = event.object()?;
        let reference = dispute.charge_reference().to_string();

        match self.txlog.apply_clawback(&reference).await {
            Ok(ClawbackOutcome::Applied {
                transaction,
                clawed_back,
                balance_short,
            }) => Ok(PaymentOutcome::Disputed {
                transaction,
                clawed_back,
                balance_short,
            }),
            Ok(ClawbackOutcome::AlreadyRefunded { transaction }) => {
                Ok(PaymentOutcome::Duplicate { transaction })
            }
            Err(PurserError::NotFound { .. }) => {
                warn!(reference = %reference, "dispute matches no recorded charge");
                Ok(PaymentOutcome::DisputeUnmatched { reference })
            }
            Err(PurserError::IllegalTransition { from, .. }) => {
                warn!(
                    reference = %reference,
                    status = %from,
                    "dispute against a non-completed transaction"
                );
                Ok(PaymentOutcome::DisputeUnmatched { reference })
            }
            Err(e) => Err(e),
        }
    }
}

fn grant_for(
    session: &CheckoutSession,
    user_id: UserId,
    key: &str,
    product: &ProductRecord,
) -> GrantApplication {
    use purser_core::ProductKind;
    GrantApplication {
        user_id,
        product_id: Some(product.id),
        charge_id: session.payment_intent.clone(),
        session_id: Some(session.id.clone()),
        idempotency_key: key.to_string(),
        amount_cents: session.amount_total.unwrap_or(product.price_usd_cents),
        credits: match product.product_type {
            ProductKind::Credits => product.amount,
            ProductKind::Time => 0,
        },
        time_seconds: match product.product_type {
            ProductKind::Time => product.amount,
            ProductKind::Credits => 0,
        },
        billing_customer_id: session.customer.clone(),
        description: Some(product.name.clone()),
    }
}

/// Formats integer cents for human-facing notifications.
fn format_price(amount_cents: i64) -> String {
    format!("${}.{:02}", amount_cents / 100, (amount_cents % 100).abs())
}

/// Step 5: best-effort notifications for an already-committed outcome.
///
/// Failures are logged after bounded retries and never propagate; the
/// ledger state this reports on is already durable.
pub async fn notify_outcome(router: &RoutingEngine, outcome: &PaymentOutcome) {
    let policy = BackoffPolicy::default();

    let sends: Vec<(Option<UserId>, String)> = match outcome {
        PaymentOutcome::Granted {
            transaction,
            new_balance,
        } => {
            let mut sends = Vec::new();
            if transaction.credits_granted > 0 {
                sends.push((
                    Some(transaction.user_id),
                    format!(
                        "Payment received! {} credits added. Your balance is now {}.",
                        transaction.credits_granted, new_balance
                    ),
                ));
            } else {
                sends.push((
                    Some(transaction.user_id),
                    "Payment received! Your access has been extended.".to_string(),
                ));
            }
            sends.push((
                None,
                format!(
                    "Purchase: user {} paid {} ({}).",
                    transaction.user_id,
                    format_price(transaction.amount_cents),
                    transaction.description.as_deref().unwrap_or("unknown product"),
                ),
            ));
            sends
        }
        PaymentOutcome::GrantFailed {
            transaction,
            reason,
        } => vec![(
            None,
            format!(
                "Payment needs review: user {}, {} — {}. Transaction {}.",
                transaction.user_id,
                format_price(transaction.amount_cents),
                reason,
                transaction.id
            ),
        )],
        PaymentOutcome::FailureRecorded { transaction } => vec![(
            None,
            format!(
                "Payment failed for user {}: {}.",
                transaction.user_id,
                transaction.description.as_deref().unwrap_or("unknown error")
            ),
        )],
        PaymentOutcome::Disputed {
            transaction,
            clawed_back,
            balance_short,
        } => {
            let shortfall = if *balance_short {
                format!(
                    " Balance could not cover the clawback; {} credits were already spent.",
                    transaction.credits_granted
                )
            } else {
                String::new()
            };
            vec![(
                None,
                format!(
                    "Dispute opened: user {}, {} refunded, {} credits clawed back.{}",
                    transaction.user_id,
                    format_price(transaction.amount_cents),
                    clawed_back,
                    shortfall
                ),
            )]
        }
        PaymentOutcome::DisputeUnmatched { reference } => vec![(
            None,
            format!("Dispute for unknown charge {reference}; manual reconciliation needed."),
        )],
        PaymentOutcome::Duplicate { .. } | PaymentOutcome::Ignored { .. } => Vec::new(),
    };

    let admin_context_user = match outcome {
        PaymentOutcome::Granted { transaction, .. }
        | PaymentOutcome::GrantFailed { transaction, .. }
        | PaymentOutcome::FailureRecorded { transaction }
        | PaymentOutcome::Disputed { transaction, .. } => Some(transaction.user_id),
        _ => None,
    };

    for (target, text) in sends {
        let result = match target {
            Some(user_id) => {
                retry(&policy, "payment confirmation", || {
                    router.notify_user(user_id, &text)
                })
                .await
            }
            None => match admin_context_user {
                Some(user_id) => {
                    retry(&policy, "payment admin alert", || {
                        router.notify_workspace(user_id, &text)
                    })
                    .await
                }
                None => {
                    retry(&policy, "payment admin alert", || {
                        router.notify_workspace(UserId(0), &text)
                    })
                    .await
                }
            },
        };
        if let Err(err) = result {
            warn!(error = %err, "payment notification dropped after retries");
        }
    }
}
