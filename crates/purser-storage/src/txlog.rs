// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transaction log: the append-mostly audit trail behind every
//! balance mutation, and the atomic apply units of the payment pipeline.
//!
//! A Transaction is the unit of idempotency. The unique idempotency key
//! arbitrates duplicate delivery: the same logical event always lands on
//! the same row. Status transitions are forward-only
//! (pending -> completed | failed, completed -> refunded); the guarded
//! UPDATE in [`TransactionLog::transition`] rejects everything else.

use purser_core::{PurserError, TransactionStatus, UserId};
use rusqlite::params;
use tracing::{info, warn};

use crate::database::{is_unique_violation, map_tr_err, Database};
use crate::models::{parse_column, TransactionRecord};

const TXN_COLUMNS: &str = "id, user_id, product_id, stripe_charge_id, stripe_session_id, \
     idempotency_key, amount_cents, credits_granted, time_granted_seconds, status, \
     description, created_at, updated_at";

fn map_txn_row(row: &rusqlite::Row<'_>) -> Result<TransactionRecord, rusqlite::Error> {
    Ok(TransactionRecord {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        product_id: row.get(2)?,
        stripe_charge_id: row.get(3)?,
        stripe_session_id: row.get(4)?,
        idempotency_key: row.get(5)?,
        amount_cents: row.get(6)?,
        credits_granted: row.get(7)?,
        time_granted_seconds: row.get(8)?,
        status: parse_column(9, row.get::<_, String>(9)?)?,
        description: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn find_by_key_tx(
    conn: &rusqlite::Connection,
    key: &str,
) -> Result<Option<TransactionRecord>, rusqlite::Error> {
    let result = conn.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE idempotency_key = ?1"),
        params![key],
        map_txn_row,
    );
    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Everything the apply step needs to turn a verified, resolved payment
/// event into ledger state.
#[derive(Debug, Clone)]
pub struct GrantApplication {
    pub user_id: UserId,
    pub product_id: Option<i64>,
    pub charge_id: Option<String>,
    pub session_id: Option<String>,
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub credits: i64,
    pub time_seconds: i64,
    /// Billing customer to link on first purchase, if known.
    pub billing_customer_id: Option<String>,
    pub description: Option<String>,
}

/// Result of the atomic apply step.
#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// The grant committed; the transaction is `completed`.
    Applied {
        transaction: TransactionRecord,
        new_balance: i64,
    },
    /// A transaction with this idempotency key already existed; nothing
    /// was mutated. Redelivery lands here.
    Duplicate { transaction: TransactionRecord },
    /// The balance mutation failed; the transaction is recorded as
    /// `failed` and must be surfaced for manual review.
    Failed {
        transaction: TransactionRecord,
        reason: String,
    },
}

/// Result of a dispute clawback.
#[derive(Debug, Clone)]
pub enum ClawbackOutcome {
    /// The transaction moved to `refunded`. `clawed_back` credits were
    /// debited; `balance_short` is set when the user had already spent
    /// the grant and no debit was possible without going negative.
    Applied {
        transaction: TransactionRecord,
        clawed_back: i64,
        balance_short: bool,
    },
    /// The transaction was already refunded; redelivered dispute events
    /// land here.
    AlreadyRefunded { transaction: TransactionRecord },
}

enum ApplyResult {
    Outcome(GrantOutcome),
    /// Insert hit the unique idempotency key mid-transaction; the caller
    /// re-reads outside the rolled-back transaction.
    Raced,
}

enum ClawbackResult {
    Outcome(ClawbackOutcome),
    Missing,
    Illegal(TransactionStatus),
}

/// Durable, append-mostly record of monetary events.
#[derive(Clone)]
pub struct TransactionLog {
    db: Database,
}

impl TransactionLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Atomically applies a verified payment grant.
    ///
    /// One SQLite transaction covers: the dedup check, the transaction
    /// row (pending -> completed), the conditional balance update, and
    /// the first-purchase billing-customer link. A concurrent duplicate
    /// rolls back on the unique idempotency key and is re-read as
    /// [`GrantOutcome::Duplicate`] — the grant is applied exactly once no
    /// matter how often the event is delivered.
    pub async fn apply_grant(&self, grant: &GrantApplication) -> Result<GrantOutcome, PurserError> {
        let key = grant.idempotency_key.clone();
        let grant = grant.clone();
        let txn_id = uuid::Uuid::new_v4().to_string();

        let result = self
            .db
            .connection()
            .call(move |conn| apply_grant_tx(conn, &grant, &txn_id))
            .await
            .map_err(map_tr_err)?;

        match result {
            ApplyResult::Outcome(outcome) => {
                match &outcome {
                    GrantOutcome::Applied {
                        transaction,
                        new_balance,
                    } => info!(
                        transaction_id = %transaction.id,
                        user_id = %transaction.user_id,
                        credits = transaction.credits_granted,
                        new_balance,
                        "payment grant applied"
                    ),
                    GrantOutcome::Duplicate { transaction } => info!(
                        transaction_id = %transaction.id,
                        idempotency_key = %transaction.idempotency_key,
                        "duplicate payment event, no-op"
                    ),
                    GrantOutcome::Failed { transaction, reason } => warn!(
                        transaction_id = %transaction.id,
                        reason = %reason,
                        "payment grant failed, flagged for review"
                    ),
                }
                Ok(outcome)
            }
            ApplyResult::Raced => {
                let existing = self.find_by_idempotency_key(&key).await?.ok_or_else(|| {
                    PurserError::Internal("transaction vanished after idempotency race".into())
                })?;
                info!(
                    transaction_id = %existing.id,
                    idempotency_key = %key,
                    "lost idempotency race, returning winner's transaction"
                );
                Ok(GrantOutcome::Duplicate {
                    transaction: existing,
                })
            }
        }
    }

    /// Records a failed monetary event (e.g. a payment failure
    /// notification) keyed by its idempotency key. Replays return the
    /// existing row.
    pub async fn record_failed(
        &self,
        user_id: UserId,
        idempotency_key: &str,
        amount_cents: i64,
        charge_id: Option<String>,
        reason: &str,
    ) -> Result<TransactionRecord, PurserError> {
        let key = idempotency_key.to_string();
        let reason = reason.to_string();
        let txn_id = uuid::Uuid::new_v4().to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<TransactionRecord, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO transactions
                     (id, user_id, stripe_charge_id, idempotency_key, amount_cents,
                      status, description)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'failed', ?6)
                     ON CONFLICT (idempotency_key) DO NOTHING",
                    params![txn_id, user_id.0, charge_id, key, amount_cents, reason],
                )?;
                find_by_key_tx(conn, &key)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Moves a dispute's transaction from `completed` to `refunded` and
    /// claws back the granted credits where the balance still covers
    /// them. Atomic with the status transition; replays are no-ops.
    pub async fn apply_clawback(&self, charge_id: &str) -> Result<ClawbackOutcome, PurserError> {
        let charge = charge_id.to_string();
        let result = self
            .db
            .connection()
            .call(move |conn| clawback_tx(conn, &charge))
            .await
            .map_err(map_tr_err)?;

        match result {
            ClawbackResult::Outcome(outcome) => {
                if let ClawbackOutcome::Applied {
                    transaction,
                    clawed_back,
                    balance_short,
                } = &outcome
                {
                    warn!(
                        transaction_id = %transaction.id,
                        clawed_back,
                        balance_short,
                        "dispute clawback applied"
                    );
                }
                Ok(outcome)
            }
            ClawbackResult::Missing => Err(PurserError::NotFound {
                what: format!("transaction for charge {charge_id}"),
            }),
            ClawbackResult::Illegal(from) => Err(PurserError::IllegalTransition {
                from,
                to: TransactionStatus::Refunded,
            }),
        }
    }

    /// Forward-only status transition, optionally attaching the charge id
    /// learned at completion time.
    pub async fn transition(
        &self,
        transaction_id: &str,
        to: TransactionStatus,
        charge_id: Option<String>,
    ) -> Result<TransactionRecord, PurserError> {
        let id = transaction_id.to_string();
        let result = self
            .db
            .connection()
            .call(move |conn| -> Result<Result<TransactionRecord, TransactionStatus>, rusqlite::Error> {
                let current: TransactionStatus = {
                    let raw: String = conn.query_row(
                        "SELECT status FROM transactions WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )?;
                    parse_column(0, raw)?
                };
                if !current.can_transition_to(to) {
                    return Ok(Err(current));
                }
                conn.execute(
                    "UPDATE transactions
                     SET status = ?1,
                         stripe_charge_id = COALESCE(?2, stripe_charge_id),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![to.to_string(), charge_id, id],
                )?;
                let record = conn.query_row(
                    &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
                    params![id],
                    map_txn_row,
                )?;
                Ok(Ok(record))
            })
            .await
            .map_err(map_tr_err)?;

        result.map_err(|from| PurserError::IllegalTransition { from, to })
    }

    /// Looks up a transaction by its idempotency key.
    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, PurserError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| find_by_key_tx(conn, &key))
            .await
            .map_err(map_tr_err)
    }

    /// Looks up a transaction by its external charge id.
    pub async fn find_by_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<TransactionRecord>, PurserError> {
        let charge = charge_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE stripe_charge_id = ?1"),
                    params![charge],
                    map_txn_row,
                );
                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Most recent transactions for one user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TXN_COLUMNS} FROM transactions
                     WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![user_id.0, limit], map_txn_row)?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)
    }
}

/// The apply unit, run inside one SQLite transaction on the writer thread.
fn apply_grant_tx(
    conn: &mut rusqlite::Connection,
    grant: &GrantApplication,
    txn_id: &str,
) -> Result<ApplyResult, rusqlite::Error> {
    let tx = conn.transaction()?;

    if let Some(existing) = find_by_key_tx(&tx, &grant.idempotency_key)? {
        tx.commit()?;
        return Ok(ApplyResult::Outcome(GrantOutcome::Duplicate {
            transaction: existing,
        }));
    }

    let inserted = tx.execute(
        "INSERT INTO transactions
         (id, user_id, product_id, stripe_charge_id, stripe_session_id, idempotency_key,
          amount_cents, credits_granted, time_granted_seconds, status, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)",
        params![
            txn_id,
            grant.user_id.0,
            grant.product_id,
            grant.charge_id,
            grant.session_id,
            grant.idempotency_key,
            grant.amount_cents,
            grant.credits,
            grant.time_seconds,
            grant.description,
        ],
    );
    match inserted {
        Ok(_) => {}
        // A concurrent delivery of the same event won the unique key.
        Err(e) if is_unique_violation(&e) => return Ok(ApplyResult::Raced),
        Err(e) => return Err(e),
    }

    let credited = tx.execute(
        "UPDATE users
         SET message_credits = message_credits + ?1,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE telegram_id = ?2 AND message_credits + ?1 >= 0",
        params![grant.credits, grant.user_id.0],
    )?;

    if credited != 1 {
        let reason = "balance mutation failed: user missing from ledger".to_string();
        tx.execute(
            "UPDATE transactions
             SET status = 'failed', description = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![txn_id, reason],
        )?;
        let record = tx.query_row(
            &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
            params![txn_id],
            map_txn_row,
        )?;
        tx.commit()?;
        return Ok(ApplyResult::Outcome(GrantOutcome::Failed {
            transaction: record,
            reason,
        }));
    }

    if let Some(customer) = &grant.billing_customer_id {
        // First-purchase link; an already-linked user keeps the stored id.
        tx.execute(
            "UPDATE users
             SET stripe_customer_id = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE telegram_id = ?2 AND stripe_customer_id IS NULL",
            params![customer, grant.user_id.0],
        )?;
    }

    tx.execute(
        "UPDATE transactions
         SET status = 'completed', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![txn_id],
    )?;

    let new_balance: i64 = tx.query_row(
        "SELECT message_credits FROM users WHERE telegram_id = ?1",
        params![grant.user_id.0],
        |row| row.get(0),
    )?;
    let record = tx.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
        params![txn_id],
        map_txn_row,
    )?;
    tx.commit()?;

    Ok(ApplyResult::Outcome(GrantOutcome::Applied {
        transaction: record,
        new_balance,
    }))
}

/// The clawback unit, run inside one SQLite transaction.
fn clawback_tx(
    conn: &mut rusqlite::Connection,
    charge_id: &str,
) -> Result<ClawbackResult, rusqlite::Error> {
    let tx = conn.transaction()?;

    let found = tx.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE stripe_charge_id = ?1"),
        params![charge_id],
        map_txn_row,
    );
    let record = match found {
        Ok(record) => record,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(ClawbackResult::Missing),
        Err(e) => return Err(e),
    };

    match record.status {
        TransactionStatus::Refunded => {
            tx.commit()?;
            return Ok(ClawbackResult::Outcome(ClawbackOutcome::AlreadyRefunded {
                transaction: record,
            }));
        }
        TransactionStatus::Completed => {}
        other => return Ok(ClawbackResult::Illegal(other)),
    }

    tx.execute(
        "UPDATE transactions
         SET status = 'refunded', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![record.id],
    )?;

    // Debit only what the non-negative invariant allows; a user who
    // already spent the grant keeps a zero floor and the shortfall is
    // surfaced to the admin side instead.
    let debited = tx.execute(
        "UPDATE users
         SET message_credits = message_credits - ?1,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE telegram_id = ?2 AND message_credits - ?1 >= 0",
        params![record.credits_granted, record.user_id.0],
    )?;

    let refreshed = tx.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
        params![record.id],
        map_txn_row,
    )?;
    tx.commit()?;

    Ok(ClawbackResult::Outcome(ClawbackOutcome::Applied {
        clawed_back: if debited == 1 { record.credits_granted } else { 0 },
        balance_short: debited != 1,
        transaction: refreshed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;
    use purser_core::UserProfile;

    async fn setup() -> (TransactionLog, LedgerStore) {
        let db = Database::open_in_memory().await.unwrap();
        let log = TransactionLog::new(db.clone());
        let ledger = LedgerStore::new(db);
        (log, ledger)
    }

    async fn seed_user(ledger: &LedgerStore, id: i64) {
        let profile = UserProfile {
            username: None,
            first_name: format!("user{id}"),
            last_name: None,
        };
        ledger.upsert_user(UserId(id), &profile).await.unwrap();
    }

    fn grant(user: i64, key: &str, credits: i64) -> GrantApplication {
        GrantApplication {
            user_id: UserId(user),
            product_id: None,
            charge_id: Some(format!("ch_{key}")),
            session_id: Some(format!("cs_{key}")),
            idempotency_key: key.to_string(),
            amount_cents: 1000,
            credits,
            time_seconds: 0,
            billing_customer_id: Some("cus_123".into()),
            description: Some("25 Credits Pack".into()),
        }
    }

    #[tokio::test]
    async fn grant_applies_once_and_links_customer() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 1).await;

        let outcome = log.apply_grant(&grant(1, "K1", 25)).await.unwrap();
        let transaction = match outcome {
            GrantOutcome::Applied {
                transaction,
                new_balance,
            } => {
                assert_eq!(new_balance, 25);
                transaction
            }
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(transaction.status, TransactionStatus::Completed);
        assert_eq!(transaction.idempotency_key, "K1");

        let user = ledger.get_user(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 25);
        assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_123"));
    }

    #[tokio::test]
    async fn redelivery_is_a_noop() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 2).await;

        log.apply_grant(&grant(2, "K1", 25)).await.unwrap();
        for _ in 0..3 {
            let outcome = log.apply_grant(&grant(2, "K1", 25)).await.unwrap();
            assert!(matches!(outcome, GrantOutcome::Duplicate { .. }));
        }

        let user = ledger.get_user(UserId(2)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 25, "balance granted exactly once");

        let history = log.list_for_user(UserId(2), 10).await.unwrap();
        assert_eq!(history.len(), 1, "exactly one transaction row");
    }

    #[tokio::test]
    async fn concurrent_delivery_grants_once() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 3).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.apply_grant(&grant(3, "K-race", 10)).await
            }));
        }
        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                GrantOutcome::Applied { .. } => applied += 1,
                GrantOutcome::Duplicate { .. } => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(applied, 1);

        let user = ledger.get_user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 10);
    }

    #[tokio::test]
    async fn failed_balance_mutation_records_failed_row() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 9).await;

        // A grant whose balance mutation cannot apply (here: a negative
        // credit amount against a zero balance) is recorded as failed and
        // surfaced, never silently retried.
        let outcome = log.apply_grant(&grant(9, "K9", -5)).await.unwrap();
        match outcome {
            GrantOutcome::Failed { transaction, .. } => {
                assert_eq!(transaction.status, TransactionStatus::Failed);
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        let user = ledger.get_user(UserId(9)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 0, "balance unchanged");

        let history = log.list_for_user(UserId(9), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn transition_rules_are_forward_only() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 4).await;

        let outcome = log.apply_grant(&grant(4, "K4", 5)).await.unwrap();
        let id = match outcome {
            GrantOutcome::Applied { transaction, .. } => transaction.id,
            other => panic!("unexpected {other:?}"),
        };

        // completed -> refunded is legal.
        let refunded = log
            .transition(&id, TransactionStatus::Refunded, None)
            .await
            .unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);

        // refunded -> completed is rejected.
        let err = log
            .transition(&id, TransactionStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PurserError::IllegalTransition {
                from: TransactionStatus::Refunded,
                to: TransactionStatus::Completed,
            }
        ));

        // completed -> pending is rejected for a fresh grant.
        let outcome = log.apply_grant(&grant(4, "K5", 5)).await.unwrap();
        let id = match outcome {
            GrantOutcome::Applied { transaction, .. } => transaction.id,
            other => panic!("unexpected {other:?}"),
        };
        let err = log
            .transition(&id, TransactionStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PurserError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn record_failed_is_idempotent() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 5).await;

        let first = log
            .record_failed(UserId(5), "evt_fail_1", 999, None, "card declined")
            .await
            .unwrap();
        assert_eq!(first.status, TransactionStatus::Failed);

        let replay = log
            .record_failed(UserId(5), "evt_fail_1", 999, None, "card declined")
            .await
            .unwrap();
        assert_eq!(replay.id, first.id);

        let history = log.list_for_user(UserId(5), 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn clawback_refunds_and_debits() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 6).await;

        log.apply_grant(&grant(6, "K6", 25)).await.unwrap();
        let found = log.find_by_charge_id("ch_K6").await.unwrap().unwrap();
        assert_eq!(found.status, TransactionStatus::Completed);

        let outcome = log.apply_clawback("ch_K6").await.unwrap();
        match outcome {
            ClawbackOutcome::Applied {
                transaction,
                clawed_back,
                balance_short,
            } => {
                assert_eq!(transaction.status, TransactionStatus::Refunded);
                assert_eq!(clawed_back, 25);
                assert!(!balance_short);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        let user = ledger.get_user(UserId(6)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 0);

        // Redelivered dispute: no-op.
        let replay = log.apply_clawback("ch_K6").await.unwrap();
        assert!(matches!(replay, ClawbackOutcome::AlreadyRefunded { .. }));
    }

    #[tokio::test]
    async fn clawback_with_spent_balance_keeps_invariant() {
        let (log, ledger) = setup().await;
        seed_user(&ledger, 7).await;

        log.apply_grant(&grant(7, "K7", 25)).await.unwrap();
        // User spends most of the grant.
        ledger.adjust_balance(UserId(7), -20).await.unwrap();

        let outcome = log.apply_clawback("ch_K7").await.unwrap();
        match outcome {
            ClawbackOutcome::Applied {
                clawed_back,
                balance_short,
                ..
            } => {
                assert_eq!(clawed_back, 0, "partial clawback is not attempted");
                assert!(balance_short);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        let user = ledger.get_user(UserId(7)).await.unwrap().unwrap();
        assert_eq!(user.message_credits, 5, "balance untouched, never negative");
    }

    #[tokio::test]
    async fn clawback_for_unknown_charge_is_not_found() {
        let (log, _ledger) = setup().await;
        let err = log.apply_clawback("ch_missing").await.unwrap_err();
        assert!(matches!(err, PurserError::NotFound { .. }));
    }
}
