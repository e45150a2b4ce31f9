// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment notification processing for the Purser support bridge.
//!
//! Converts externally-delivered, possibly duplicated Stripe webhook
//! events into exactly-once ledger mutations:
//! verify -> deduplicate -> resolve -> apply -> notify.

pub mod event;
pub mod processor;
pub mod signature;

pub use processor::{notify_outcome, PaymentOutcome, PaymentProcessor};
