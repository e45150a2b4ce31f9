// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Purser support bridge.

use thiserror::Error;

use crate::types::{TransactionStatus, UserId};

/// The primary error type used across all Purser crates.
///
/// Business-rule violations (`InsufficientBalance`, `UnknownProduct`,
/// `IllegalTransition`) are surfaced to the caller for decision and never
/// auto-corrected. `Constraint` is an internal signal: the storage layer
/// catches it to resolve creation races by re-read-and-reuse, so it should
/// not normally escape a store operation.
#[derive(Debug, Error)]
pub enum PurserError {
    /// Malformed input, rejected before anything is persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Payment notification failed signature verification. Fatal for the
    /// request; logged for audit, never retried by us.
    #[error("payment signature rejected: {reason}")]
    SignatureInvalid { reason: String },

    /// A debit would drive the balance below zero. The balance is left
    /// unchanged.
    #[error("insufficient balance for user {user_id}: have {balance}, delta {delta}")]
    InsufficientBalance {
        user_id: UserId,
        balance: i64,
        delta: i64,
    },

    /// A different billing customer id is already stored for this user.
    #[error("user {user_id} is already linked to billing customer {existing}")]
    AlreadyLinked { user_id: UserId, existing: String },

    /// No active catalog entry matches the referenced price id.
    #[error("unknown product for price id {price_id}")]
    UnknownProduct { price_id: String },

    /// Resolution failure (user, thread, or transaction).
    #[error("{what} not found")]
    NotFound { what: String },

    /// The message could not be delivered to any resolved party. Surfaced
    /// explicitly so the caller can report it; never a silent drop.
    #[error("routing failure: {reason}")]
    RoutingFailure { reason: String },

    /// Attempted transaction status transition that is not forward-only.
    #[error("illegal transaction transition: {from} -> {to}")]
    IllegalTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Uniqueness-constraint violation on thread or transaction creation.
    /// Callers in the storage layer convert this into re-read-and-reuse.
    #[error("constraint violation: {source}")]
    Constraint {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Storage backend errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging transport errors (send failure, API error, rate limit).
    /// Transient; best-effort paths retry these with bounded backoff.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PurserError {
    /// Whether a retry with backoff is appropriate. Only external
    /// transport failures and timeouts qualify; business-rule and
    /// authentication failures never do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PurserError::Channel { .. } | PurserError::Timeout { .. }
        )
    }
}
