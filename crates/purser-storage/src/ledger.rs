// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credit ledger: user identity and balance mutations.
//!
//! Balance adjustments go through one conditional UPDATE executed on the
//! single writer thread, which makes per-user adjustments linearizable
//! without application-level locking. A debit that would drive the
//! balance negative affects zero rows and surfaces as
//! [`PurserError::InsufficientBalance`] with the balance unchanged.

use purser_core::{PurserError, Tier, UserId, UserProfile};
use rusqlite::params;
use tracing::info;

use crate::database::{map_tr_err, Database};
use crate::models::{parse_column, UserRecord};

const USER_COLUMNS: &str = "telegram_id, username, first_name, last_name, message_credits, \
     tier, is_banned, stripe_customer_id, created_at, updated_at";

pub(crate) fn map_user_row(row: &rusqlite::Row<'_>) -> Result<UserRecord, rusqlite::Error> {
    Ok(UserRecord {
        telegram_id: UserId(row.get(0)?),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        message_credits: row.get(4)?,
        tier: parse_column(5, row.get::<_, String>(5)?)?,
        is_banned: row.get(6)?,
        stripe_customer_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

enum AdjustOutcome {
    NewBalance(i64),
    Insufficient { balance: i64 },
    Missing,
}

enum LinkOutcome {
    Linked,
    AlreadySame,
    AlreadyOther { existing: String },
    Missing,
}

/// Durable record of user identity, balance, tier, and billing linkage.
#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent create-or-update keyed on the external id.
    ///
    /// Only profile columns are written; balance, tier, and the ban flag
    /// are never touched by an upsert.
    pub async fn upsert_user(
        &self,
        user_id: UserId,
        profile: &UserProfile,
    ) -> Result<UserRecord, PurserError> {
        let profile = profile.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (telegram_id, username, first_name, last_name)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (telegram_id) DO UPDATE SET
                         username = excluded.username,
                         first_name = excluded.first_name,
                         last_name = excluded.last_name,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![user_id.0, profile.username, profile.first_name, profile.last_name],
                )?;
                conn.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"),
                    params![user_id.0],
                    map_user_row,
                )
            })
            .await
            .map_err(map_tr_err)
    }

    /// Creates a bare ledger row if the user is unknown, without touching
    /// profile columns. Used by the payment path, where only the external
    /// id is known.
    pub async fn ensure_user(&self, user_id: UserId) -> Result<(), PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO users (telegram_id) VALUES (?1)",
                    params![user_id.0],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Get a user by external id.
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1"),
                    params![user_id.0],
                    map_user_row,
                );
                match result {
                    Ok(user) => Ok(Some(user)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Atomic balance increment/decrement, returning the new balance.
    ///
    /// Fails with `InsufficientBalance` if the delta is negative and would
    /// drive the balance below zero; the balance is left unchanged.
    pub async fn adjust_balance(&self, user_id: UserId, delta: i64) -> Result<i64, PurserError> {
        let outcome = self
            .db
            .connection()
            .call(move |conn| -> Result<AdjustOutcome, rusqlite::Error> {
                let rows = conn.execute(
                    "UPDATE users
                     SET message_credits = message_credits + ?1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE telegram_id = ?2 AND message_credits + ?1 >= 0",
                    params![delta, user_id.0],
                )?;
                if rows == 1 {
                    let balance = conn.query_row(
                        "SELECT message_credits FROM users WHERE telegram_id = ?1",
                        params![user_id.0],
                        |row| row.get(0),
                    )?;
                    return Ok(AdjustOutcome::NewBalance(balance));
                }
                let current = conn.query_row(
                    "SELECT message_credits FROM users WHERE telegram_id = ?1",
                    params![user_id.0],
                    |row| row.get(0),
                );
                match current {
                    Ok(balance) => Ok(AdjustOutcome::Insufficient { balance }),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(AdjustOutcome::Missing),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            AdjustOutcome::NewBalance(balance) => {
                info!(user_id = %user_id, delta, balance, "balance adjusted");
                Ok(balance)
            }
            AdjustOutcome::Insufficient { balance } => Err(PurserError::InsufficientBalance {
                user_id,
                balance,
                delta,
            }),
            AdjustOutcome::Missing => Err(PurserError::NotFound {
                what: format!("user {user_id}"),
            }),
        }
    }

    /// One-time link of the external billing customer id.
    ///
    /// Setting the same id again is a no-op; a different stored id fails
    /// with `AlreadyLinked` and is never silently overwritten.
    pub async fn link_billing_customer(
        &self,
        user_id: UserId,
        customer_id: &str,
    ) -> Result<(), PurserError> {
        let customer = customer_id.to_string();
        let outcome = self
            .db
            .connection()
            .call(move |conn| -> Result<LinkOutcome, rusqlite::Error> {
                let existing = conn.query_row(
                    "SELECT stripe_customer_id FROM users WHERE telegram_id = ?1",
                    params![user_id.0],
                    |row| row.get::<_, Option<String>>(0),
                );
                match existing {
                    Ok(None) => {
                        conn.execute(
                            "UPDATE users
                             SET stripe_customer_id = ?1,
                                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                             WHERE telegram_id = ?2",
                            params![customer, user_id.0],
                        )?;
                        Ok(LinkOutcome::Linked)
                    }
                    Ok(Some(stored)) if stored == customer => Ok(LinkOutcome::AlreadySame),
                    Ok(Some(stored)) => Ok(LinkOutcome::AlreadyOther { existing: stored }),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(LinkOutcome::Missing),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            LinkOutcome::Linked => {
                info!(user_id = %user_id, "billing customer linked");
                Ok(())
            }
            LinkOutcome::AlreadySame => Ok(()),
            LinkOutcome::AlreadyOther { existing } => {
                Err(PurserError::AlreadyLinked { user_id, existing })
            }
            LinkOutcome::Missing => Err(PurserError::NotFound {
                what: format!("user {user_id}"),
            }),
        }
    }

    /// Set or clear the ban flag. Users are never hard-deleted.
    pub async fn set_banned(&self, user_id: UserId, banned: bool) -> Result<(), PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE users
                     SET is_banned = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE telegram_id = ?2",
                    params![banned, user_id.0],
                )
            })
            .await
            .map_err(map_tr_err)
            .and_then(|rows| {
                if rows == 1 {
                    Ok(())
                } else {
                    Err(PurserError::NotFound {
                        what: format!("user {user_id}"),
                    })
                }
            })
    }

    /// Update a user's tier.
    pub async fn set_tier(&self, user_id: UserId, tier: Tier) -> Result<(), PurserError> {
        let tier = tier.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE users
                     SET tier = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE telegram_id = ?2",
                    params![tier, user_id.0],
                )
            })
            .await
            .map_err(map_tr_err)
            .and_then(|rows| {
                if rows == 1 {
                    Ok(())
                } else {
                    Err(PurserError::NotFound {
                        what: format!("user {user_id}"),
                    })
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> LedgerStore {
        let db = Database::open_in_memory().await.unwrap();
        LedgerStore::new(db)
    }

    fn profile(first: &str) -> UserProfile {
        UserProfile {
            username: Some(format!("{}_handle", first.to_lowercase())),
            first_name: first.to_string(),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_profile_only() {
        let ledger = setup().await;
        let user = ledger.upsert_user(UserId(1), &profile("Ada")).await.unwrap();
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.message_credits, 0);
        assert_eq!(user.tier, Tier::Free);
        assert!(!user.is_banned);

        ledger.adjust_balance(UserId(1), 10).await.unwrap();

        // Re-upsert with a new name must keep the balance.
        let updated = ledger
            .upsert_user(UserId(1), &profile("Adeline"))
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Adeline");
        assert_eq!(updated.message_credits, 10);
    }

    #[tokio::test]
    async fn balance_is_sum_of_deltas() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(2), &profile("Bo")).await.unwrap();

        assert_eq!(ledger.adjust_balance(UserId(2), 25).await.unwrap(), 25);
        assert_eq!(ledger.adjust_balance(UserId(2), -5).await.unwrap(), 20);
        assert_eq!(ledger.adjust_balance(UserId(2), 3).await.unwrap(), 23);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_and_balance_unchanged() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(3), &profile("Cy")).await.unwrap();
        ledger.adjust_balance(UserId(3), 3).await.unwrap();

        let err = ledger.adjust_balance(UserId(3), -5).await.unwrap_err();
        match err {
            PurserError::InsufficientBalance { balance, delta, .. } => {
                assert_eq!(balance, 3);
                assert_eq!(delta, -5);
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }

        let user = ledger.get_user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 3);
    }

    #[tokio::test]
    async fn adjust_unknown_user_is_not_found() {
        let ledger = setup().await;
        let err = ledger.adjust_balance(UserId(99), 1).await.unwrap_err();
        assert!(matches!(err, PurserError::NotFound { .. }));
    }

    #[tokio::test]
    async fn debit_to_exactly_zero_is_allowed() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(4), &profile("Di")).await.unwrap();
        ledger.adjust_balance(UserId(4), 2).await.unwrap();
        assert_eq!(ledger.adjust_balance(UserId(4), -2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_adjustments_never_lose_updates() {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = LedgerStore::new(db);
        ledger.upsert_user(UserId(5), &profile("Ed")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.adjust_balance(UserId(5), 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let user = ledger.get_user(UserId(5)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 20);
    }

    #[tokio::test]
    async fn billing_link_is_one_time() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(6), &profile("Fae")).await.unwrap();

        ledger
            .link_billing_customer(UserId(6), "cus_abc")
            .await
            .unwrap();
        // Same id again: no-op.
        ledger
            .link_billing_customer(UserId(6), "cus_abc")
            .await
            .unwrap();
        // Different id: rejected, not overwritten.
        let err = ledger
            .link_billing_customer(UserId(6), "cus_other")
            .await
            .unwrap_err();
        assert!(matches!(err, PurserError::AlreadyLinked { .. }));

        let user = ledger.get_user(UserId(6)).await.unwrap().unwrap();
        assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_abc"));
    }

    #[tokio::test]
    async fn ban_flag_round_trip() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(7), &profile("Gil")).await.unwrap();

        ledger.set_banned(UserId(7), true).await.unwrap();
        assert!(ledger.get_user(UserId(7)).await.unwrap().unwrap().is_banned);
        ledger.set_banned(UserId(7), false).await.unwrap();
        assert!(!ledger.get_user(UserId(7)).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn tier_update() {
        let ledger = setup().await;
        ledger.upsert_user(UserId(8), &profile("Hal")).await.unwrap();
        ledger.set_tier(UserId(8), Tier::Pro).await.unwrap();
        assert_eq!(
            ledger.get_user(UserId(8)).await.unwrap().unwrap().tier,
            Tier::Pro
        );
    }
}
