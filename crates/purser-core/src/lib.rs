// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Purser support bridge.
//!
//! This crate provides the error taxonomy, identifier newtypes, domain
//! enums, and the [`MessagingSurface`] trait that the routing and payment
//! crates are written against. It performs no I/O of its own.

pub mod backoff;
pub mod error;
pub mod surface;
pub mod types;

pub use error::PurserError;
pub use surface::MessagingSurface;
pub use types::{
    ConversationStatus, MessageId, ProductKind, ThreadId, Tier, TransactionStatus, UserId,
    UserProfile, WorkspaceId,
};
