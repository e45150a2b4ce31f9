// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Purser support bridge.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and the four
//! typed stores the bridge is built on: the credit ledger, the
//! transaction log, the product catalog, and the conversation directory.
//!
//! The `Database` handle is the only shared mutable resource in the
//! process. It is constructed once at startup and passed by reference
//! (clone of the connection handle) into each store; conflicting writes
//! are serialized by the single background writer thread plus SQLite
//! transactions and uniqueness constraints, never by application mutexes.

pub mod catalog;
pub mod database;
pub mod directory;
pub mod ledger;
pub mod migrations;
pub mod models;
pub mod txlog;

pub use catalog::{Catalog, NewProduct};
pub use database::Database;
pub use directory::ConversationDirectory;
pub use ledger::LedgerStore;
pub use models::*;
pub use txlog::{
    ClawbackOutcome, GrantApplication, GrantOutcome, TransactionLog,
};
