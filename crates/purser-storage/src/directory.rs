// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation directory: user ⇄ thread bindings and their lifecycle.
//!
//! The central invariant lives in the schema: a partial unique index
//! allows at most one `open` binding per (user, workspace). Creation and
//! reactivation races hit that index and are resolved locally by
//! re-reading and reusing the winner's row; callers never see the
//! constraint error.

use std::future::Future;

use purser_core::{ConversationStatus, PurserError, ThreadId, UserId, WorkspaceId};
use rusqlite::params;
use tracing::{info, warn};

use crate::database::{is_unique_violation, map_tr_err, Database};
use crate::models::{parse_column, MessageRefRecord, ThreadBinding};

const BINDING_COLUMNS: &str = "id, user_id, workspace_id, thread_id, pinned_message_id, \
     status, last_message_at, created_at";

pub(crate) fn map_binding_row(row: &rusqlite::Row<'_>) -> Result<ThreadBinding, rusqlite::Error> {
    Ok(ThreadBinding {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        workspace_id: WorkspaceId(row.get(2)?),
        thread_id: ThreadId(row.get(3)?),
        pinned_message_id: row.get(4)?,
        status: parse_column(5, row.get::<_, String>(5)?)?,
        last_message_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Outcome of a write that may lose a uniqueness race. `Raced` means the
/// partial unique index fired; the caller re-reads the winner's row.
enum WriteOutcome {
    Done(Option<ThreadBinding>),
    Raced,
}

/// Maintains the user ⇄ thread mapping and thread lifecycle.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: Database,
}

impl ConversationDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the open binding for the pair, creating one if needed.
    ///
    /// `allocate` is invoked only when a new thread must be provisioned on
    /// the messaging surface; its side effect happens outside the store
    /// transaction, so a lost insert race can strand the freshly created
    /// thread (logged, reused never).
    ///
    /// Reopening: a prior closed/archived binding is reactivated in place,
    /// keeping its thread id, so the partial unique index stays the single
    /// arbiter of openness.
    pub async fn get_or_create_thread<F, Fut>(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        allocate: F,
    ) -> Result<ThreadBinding, PurserError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ThreadId, PurserError>>,
    {
        if let Some(binding) = self.find_open(user_id, workspace_id).await? {
            return Ok(binding);
        }

        match self.reactivate_latest(user_id, workspace_id).await? {
            WriteOutcome::Done(Some(binding)) => {
                info!(user_id = %user_id, thread_id = %binding.thread_id, "conversation reopened");
                return Ok(binding);
            }
            WriteOutcome::Done(None) => {}
            WriteOutcome::Raced => {
                // A concurrent open appeared between lookup and reactivation.
                if let Some(binding) = self.find_open(user_id, workspace_id).await? {
                    return Ok(binding);
                }
            }
        }

        let thread_id = allocate().await?;
        match self.insert_binding(user_id, workspace_id, thread_id).await? {
            WriteOutcome::Done(Some(binding)) => {
                info!(user_id = %user_id, thread_id = %thread_id, "conversation thread created");
                Ok(binding)
            }
            WriteOutcome::Raced => {
                warn!(
                    user_id = %user_id,
                    orphaned_thread = %thread_id,
                    "lost thread-creation race, reusing winner's thread"
                );
                self.find_open(user_id, workspace_id)
                    .await?
                    .ok_or_else(|| PurserError::Internal(
                        "open binding vanished after creation race".into(),
                    ))
            }
            WriteOutcome::Done(None) => Err(PurserError::Internal(
                "binding insert reported success without a row".into(),
            )),
        }
    }

    /// Looks up the open binding for a (user, workspace) pair.
    pub async fn find_open(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> Result<Option<ThreadBinding>, PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    &format!(
                        "SELECT {BINDING_COLUMNS} FROM conversations
                         WHERE user_id = ?1 AND workspace_id = ?2 AND status = 'open'"
                    ),
                    params![user_id.0, workspace_id.0],
                    map_binding_row,
                );
                match result {
                    Ok(binding) => Ok(Some(binding)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Resolves the user bound to an open thread.
    pub async fn resolve_user_for_thread(
        &self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    ) -> Result<UserId, PurserError> {
        let found = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                let result = conn.query_row(
                    "SELECT user_id FROM conversations
                     WHERE workspace_id = ?1 AND thread_id = ?2 AND status = 'open'",
                    params![workspace_id.0, thread_id.0],
                    |row| row.get(0),
                );
                match result {
                    Ok(user_id) => Ok(Some(user_id)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        found.map(UserId).ok_or_else(|| PurserError::NotFound {
            what: format!("open conversation for thread {thread_id}"),
        })
    }

    /// Closes an open thread. Closing a thread that is not open is a no-op.
    pub async fn close_thread(
        &self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    ) -> Result<(), PurserError> {
        self.transition_thread(workspace_id, thread_id, ConversationStatus::Closed)
            .await
    }

    /// Archives a thread from open or closed state. Idempotent.
    pub async fn archive_thread(
        &self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    ) -> Result<(), PurserError> {
        self.transition_thread(workspace_id, thread_id, ConversationStatus::Archived)
            .await
    }

    async fn transition_thread(
        &self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        to: ConversationStatus,
    ) -> Result<(), PurserError> {
        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let sql = match to {
                    ConversationStatus::Closed => {
                        "UPDATE conversations SET status = 'closed'
                         WHERE workspace_id = ?1 AND thread_id = ?2 AND status = 'open'"
                    }
                    ConversationStatus::Archived => {
                        "UPDATE conversations SET status = 'archived'
                         WHERE workspace_id = ?1 AND thread_id = ?2
                           AND status IN ('open', 'closed')"
                    }
                    ConversationStatus::Open => unreachable!("reopening goes through get_or_create_thread"),
                };
                conn.execute(sql, params![workspace_id.0, thread_id.0])
            })
            .await
            .map_err(map_tr_err)?;
        if rows > 0 {
            info!(thread_id = %thread_id, status = %to, "conversation status changed");
        }
        Ok(())
    }

    /// Updates the last-activity timestamp of the open binding.
    pub async fn touch(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> Result<(), PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE conversations
                     SET last_message_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE user_id = ?1 AND workspace_id = ?2 AND status = 'open'",
                    params![user_id.0, workspace_id.0],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Records the pinned-summary message for the open binding.
    pub async fn set_pinned_message(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        message_id: i64,
    ) -> Result<(), PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE conversations SET pinned_message_id = ?1
                     WHERE user_id = ?2 AND workspace_id = ?3 AND status = 'open'",
                    params![message_id, user_id.0, workspace_id.0],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Records the mapping from a forwarded admin-side copy to its origin.
    pub async fn record_message_ref(&self, record: &MessageRefRecord) -> Result<(), PurserError> {
        let record = record.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO message_refs
                     (workspace_id, admin_message_id, user_message_id, user_id, thread_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (workspace_id, admin_message_id) DO NOTHING",
                    params![
                        record.workspace_id.0,
                        record.admin_message_id,
                        record.user_message_id,
                        record.user_id.0,
                        record.thread_id.0,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Resolves a forwarded admin-side message id back to its origin.
    pub async fn resolve_message_ref(
        &self,
        workspace_id: WorkspaceId,
        admin_message_id: i64,
    ) -> Result<Option<MessageRefRecord>, PurserError> {
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT workspace_id, admin_message_id, user_message_id, user_id,
                            thread_id, created_at
                     FROM message_refs
                     WHERE workspace_id = ?1 AND admin_message_id = ?2",
                    params![workspace_id.0, admin_message_id],
                    |row| {
                        Ok(MessageRefRecord {
                            workspace_id: WorkspaceId(row.get(0)?),
                            admin_message_id: row.get(1)?,
                            user_message_id: row.get(2)?,
                            user_id: UserId(row.get(3)?),
                            thread_id: ThreadId(row.get(4)?),
                            created_at: row.get(5)?,
                        })
                    },
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

    /// Flips the most recent closed/archived binding back to open,
    /// keeping its thread id.
    async fn reactivate_latest(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> Result<WriteOutcome, PurserError> {
        self.db
            .connection()
            .call(move |conn| -> Result<WriteOutcome, rusqlite::Error> {
                let prior: Result<i64, _> = conn.query_row(
                    "SELECT id FROM conversations
                     WHERE user_id = ?1 AND workspace_id = ?2 AND status != 'open'
                     ORDER BY created_at DESC LIMIT 1",
                    params![user_id.0, workspace_id.0],
                    |row| row.get(0),
                );
                let id = match prior {
                    Ok(id) => id,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Ok(WriteOutcome::Done(None));
                    }
                    Err(e) => return Err(e),
                };

                let reopened = conn.execute(
                    "UPDATE conversations
                     SET status = 'open',
                         last_message_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![id],
                );
                match reopened {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(WriteOutcome::Raced),
                    Err(e) => return Err(e),
                }

                let binding = conn.query_row(
                    &format!("SELECT {BINDING_COLUMNS} FROM conversations WHERE id = ?1"),
                    params![id],
                    map_binding_row,
                )?;
                Ok(WriteOutcome::Done(Some(binding)))
            })
            .await
            .map_err(map_tr_err)
    }

    async fn insert_binding(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    ) -> Result<WriteOutcome, PurserError> {
        self.db
            .connection()
            .call(move |conn| -> Result<WriteOutcome, rusqlite::Error> {
                let inserted = conn.execute(
                    "INSERT INTO conversations (user_id, workspace_id, thread_id)
                     VALUES (?1, ?2, ?3)",
                    params![user_id.0, workspace_id.0, thread_id.0],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(WriteOutcome::Raced),
                    Err(e) => return Err(e),
                }
                let binding = conn.query_row(
                    &format!("SELECT {BINDING_COLUMNS} FROM conversations WHERE id = ?1"),
                    params![conn.last_insert_rowid()],
                    map_binding_row,
                )?;
                Ok(WriteOutcome::Done(Some(binding)))
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;
    use purser_core::UserProfile;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Arc;

    async fn setup() -> (ConversationDirectory, LedgerStore, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let directory = ConversationDirectory::new(db.clone());
        let ledger = LedgerStore::new(db.clone());
        (directory, ledger, db)
    }

    async fn seed_user(ledger: &LedgerStore, id: i64) {
        let profile = UserProfile {
            username: None,
            first_name: format!("user{id}"),
            last_name: None,
        };
        ledger.upsert_user(UserId(id), &profile).await.unwrap();
    }

    const WS: WorkspaceId = WorkspaceId(-100);

    #[tokio::test]
    async fn first_contact_allocates_thread_once() {
        let (directory, ledger, _db) = setup().await;
        seed_user(&ledger, 1).await;
        let calls = AtomicU32::new(0);

        let binding = directory
            .get_or_create_thread(UserId(1), WS, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ThreadId(500)) }
            })
            .await
            .unwrap();
        assert_eq!(binding.thread_id, ThreadId(500));
        assert_eq!(binding.status, ConversationStatus::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second lookup reuses the binding without allocating.
        let again = directory
            .get_or_create_thread(UserId(1), WS, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ThreadId(999)) }
            })
            .await
            .unwrap();
        assert_eq!(again.thread_id, ThreadId(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_one_open_binding() {
        let (directory, ledger, db) = setup().await;
        seed_user(&ledger, 2).await;

        let next_thread = Arc::new(AtomicI64::new(700));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let directory = directory.clone();
            let next_thread = next_thread.clone();
            handles.push(tokio::spawn(async move {
                directory
                    .get_or_create_thread(UserId(2), WS, move || {
                        let id = next_thread.fetch_add(1, Ordering::SeqCst);
                        async move { Ok(ThreadId(id)) }
                    })
                    .await
            }));
        }

        let first = handles.pop().unwrap().await.unwrap().unwrap();
        let second = handles.pop().unwrap().await.unwrap().unwrap();
        assert_eq!(first.thread_id, second.thread_id);

        let open_count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM conversations WHERE status = 'open'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(open_count, 1);
    }

    #[tokio::test]
    async fn resolve_user_for_open_thread() {
        let (directory, ledger, _db) = setup().await;
        seed_user(&ledger, 3).await;

        directory
            .get_or_create_thread(UserId(3), WS, || async { Ok(ThreadId(42)) })
            .await
            .unwrap();

        let user = directory.resolve_user_for_thread(WS, ThreadId(42)).await.unwrap();
        assert_eq!(user, UserId(3));

        let missing = directory.resolve_user_for_thread(WS, ThreadId(43)).await;
        assert!(matches!(missing, Err(PurserError::NotFound { .. })));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_hides_thread() {
        let (directory, ledger, _db) = setup().await;
        seed_user(&ledger, 4).await;

        directory
            .get_or_create_thread(UserId(4), WS, || async { Ok(ThreadId(42)) })
            .await
            .unwrap();

        directory.close_thread(WS, ThreadId(42)).await.unwrap();
        // Closing again is a no-op, not an error.
        directory.close_thread(WS, ThreadId(42)).await.unwrap();

        assert!(matches!(
            directory.resolve_user_for_thread(WS, ThreadId(42)).await,
            Err(PurserError::NotFound { .. })
        ));

        directory.archive_thread(WS, ThreadId(42)).await.unwrap();
        directory.archive_thread(WS, ThreadId(42)).await.unwrap();
    }

    #[tokio::test]
    async fn reopening_reuses_the_prior_thread() {
        let (directory, ledger, db) = setup().await;
        seed_user(&ledger, 5).await;
        let calls = AtomicU32::new(0);

        let binding = directory
            .get_or_create_thread(UserId(5), WS, || async { Ok(ThreadId(60)) })
            .await
            .unwrap();
        directory.close_thread(WS, binding.thread_id).await.unwrap();

        let reopened = directory
            .get_or_create_thread(UserId(5), WS, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ThreadId(61)) }
            })
            .await
            .unwrap();
        assert_eq!(reopened.thread_id, ThreadId(60), "prior thread is reactivated");
        assert_eq!(reopened.status, ConversationStatus::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no new thread allocated");

        // Still exactly one row for the pair.
        let total: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn touch_and_pin_update_the_open_row() {
        let (directory, ledger, _db) = setup().await;
        seed_user(&ledger, 6).await;

        directory
            .get_or_create_thread(UserId(6), WS, || async { Ok(ThreadId(77)) })
            .await
            .unwrap();
        directory.touch(UserId(6), WS).await.unwrap();
        directory.set_pinned_message(UserId(6), WS, 1234).await.unwrap();

        let binding = directory.find_open(UserId(6), WS).await.unwrap().unwrap();
        assert_eq!(binding.pinned_message_id, Some(1234));
    }

    #[tokio::test]
    async fn message_refs_round_trip() {
        let (directory, ledger, _db) = setup().await;
        seed_user(&ledger, 7).await;

        let record = MessageRefRecord {
            workspace_id: WS,
            admin_message_id: 900,
            user_message_id: 10,
            user_id: UserId(7),
            thread_id: ThreadId(80),
            created_at: String::new(),
        };
        directory.record_message_ref(&record).await.unwrap();
        // Re-recording the same copy is a no-op.
        directory.record_message_ref(&record).await.unwrap();

        let found = directory.resolve_message_ref(WS, 900).await.unwrap().unwrap();
        assert_eq!(found.user_id, UserId(7));
        assert_eq!(found.thread_id, ThreadId(80));
        assert_eq!(found.user_message_id, 10);

        assert!(directory.resolve_message_ref(WS, 901).await.unwrap().is_none());
    }
}
