// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities and their enum parsing helpers.

use serde::{Deserialize, Serialize};

use purser_core::{
    ConversationStatus, ProductKind, ThreadId, Tier, TransactionStatus, UserId, WorkspaceId,
};

/// One row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub telegram_id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub message_credits: i64,
    pub tier: Tier,
    pub is_banned: bool,
    pub stripe_customer_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the `conversations` table: a user's thread binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadBinding {
    pub id: i64,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub thread_id: ThreadId,
    pub pinned_message_id: Option<i64>,
    pub status: ConversationStatus,
    pub last_message_at: String,
    pub created_at: String,
}

/// One row of the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub stripe_price_id: String,
    pub product_type: ProductKind,
    pub name: String,
    pub description: Option<String>,
    pub amount: i64,
    pub price_usd_cents: i64,
    pub sort_order: i64,
    pub is_active: bool,
}

/// One row of the `transactions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: UserId,
    pub product_id: Option<i64>,
    pub stripe_charge_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub credits_granted: i64,
    pub time_granted_seconds: i64,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the `message_refs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRefRecord {
    pub workspace_id: WorkspaceId,
    pub admin_message_id: i64,
    pub user_message_id: i64,
    pub user_id: UserId,
    pub thread_id: ThreadId,
    pub created_at: String,
}

/// Parse a stored enum column, converting a bad value into a rusqlite
/// conversion error at the given column index.
pub(crate) fn parse_column<T>(idx: usize, raw: String) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
