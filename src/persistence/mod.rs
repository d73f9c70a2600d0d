//! Durable snapshot/recovery of cursor state.
//!
//! Two backing collaborators are modeled as traits rather than concrete network clients
//! ([`metadata_store::MetadataStore`], [`cursor_ledger::CursorLedgerLog`]), so a real deployment
//! can substitute its own storage engine without touching cursor logic. [`PersistenceManager`] is
//! the only thing in this module that knows about the small-form/large-form switch, the CAS
//! protocol, and orphan-ledger cleanup; the cursor core just calls `persist`/`recover`/`delete`.

pub mod cursor_ledger;
pub mod metadata_store;
pub mod snapshot;

use std::sync::Arc;

use crate::error::Result;
use crate::internal_events::{InternalEvent, PersistenceSpilled};
use crate::persistence::cursor_ledger::CursorLedgerLog;
use crate::persistence::metadata_store::{into_cursor_error, MetadataStore};
use crate::persistence::snapshot::CursorSnapshot;
use crate::position::Position;
use crate::range_set::Interval;

/// What recovery reconstructs for a single cursor.
#[derive(Clone, Debug)]
pub struct PersistedState {
    pub mark_delete_pos: Position,
    pub individually_deleted: Vec<Interval>,
    pub cursor_ledger_id: Option<u64>,
    pub metastore_version: u64,
}

/// Result of a single persistence attempt: the ledger id now backing the cursor (if any, which
/// may be newly created) and the metadata-store version to use as `expected_version` next time.
#[derive(Clone, Copy, Debug)]
pub struct PersistOutcome {
    pub cursor_ledger_id: Option<u64>,
    pub metastore_version: u64,
}

pub struct PersistenceManager {
    metadata_store: Arc<dyn MetadataStore>,
    cursor_ledger_log: Arc<dyn CursorLedgerLog>,
    max_unacked_ranges_to_persist_in_metastore: usize,
}

impl PersistenceManager {
    pub fn new(
        metadata_store: Arc<dyn MetadataStore>,
        cursor_ledger_log: Arc<dyn CursorLedgerLog>,
        max_unacked_ranges_to_persist_in_metastore: usize,
    ) -> Self {
        PersistenceManager {
            metadata_store,
            cursor_ledger_log,
            max_unacked_ranges_to_persist_in_metastore,
        }
    }

    /// Reconstructs durable state for `(log_name, cursor_name)`, following the recovery chain of
    /// §4.G.4: if the metadata record references a cursor ledger, the ledger's last entry is
    /// authoritative; if that ledger can't be opened, fall back to the mark-delete stored inline
    /// in the metadata record itself.
    pub async fn recover(&self, log_name: &str, cursor_name: &str) -> Result<Option<PersistedState>> {
        let Some(record) = self
            .metadata_store
            .get(log_name, cursor_name)
            .await
            .map_err(into_cursor_error)?
        else {
            return Ok(None);
        };

        let inline = &record.snapshot;
        let Some(ledger_id) = inline.cursor_ledger_id() else {
            return Ok(Some(PersistedState {
                mark_delete_pos: inline.mark_delete_pos(),
                individually_deleted: inline.individually_deleted_intervals(),
                cursor_ledger_id: None,
                metastore_version: record.version,
            }));
        };

        match self.cursor_ledger_log.read_last_snapshot(ledger_id).await {
            Ok(Some(blob)) => {
                let full = CursorSnapshot::decode(&blob)?;
                Ok(Some(PersistedState {
                    mark_delete_pos: full.mark_delete_pos(),
                    individually_deleted: full.individually_deleted_intervals(),
                    cursor_ledger_id: Some(ledger_id),
                    metastore_version: record.version,
                }))
            }
            // Ledger gone or unreadable: fall back to the mark-delete hint stored inline.
            Ok(None) | Err(_) => Ok(Some(PersistedState {
                mark_delete_pos: inline.mark_delete_pos(),
                individually_deleted: Vec::new(),
                cursor_ledger_id: Some(ledger_id),
                metastore_version: record.version,
            })),
        }
    }

    /// Persists a cursor snapshot, choosing the small form (inline in the metadata store) or the
    /// large form (appended to a dedicated cursor ledger, with only the ledger id left inline)
    /// depending on how many unacked ranges there are.
    ///
    /// `expected_version` must be the version the caller last observed for this record (`None`
    /// if it has never been written), enforcing optimistic-concurrency discipline across the
    /// small-to-large switch. On a failed switch (stale version after creating a new ledger), the
    /// newly created ledger is deleted before the error is returned.
    pub async fn persist(
        &self,
        log_name: &str,
        cursor_name: &str,
        mark_delete_pos: Position,
        individually_deleted: &[Interval],
        existing_ledger_id: Option<u64>,
        expected_version: Option<u64>,
        last_active: u64,
    ) -> Result<PersistOutcome> {
        let needs_large_form =
            individually_deleted.len() > self.max_unacked_ranges_to_persist_in_metastore;

        if !needs_large_form && existing_ledger_id.is_none() {
            let snapshot = CursorSnapshot::new(mark_delete_pos, None, individually_deleted, last_active);
            let version = self
                .metadata_store
                .put(log_name, cursor_name, snapshot, expected_version)
                .await
                .map_err(into_cursor_error)?;
            return Ok(PersistOutcome {
                cursor_ledger_id: None,
                metastore_version: version,
            });
        }

        let is_new_ledger = existing_ledger_id.is_none();
        let ledger_id = match existing_ledger_id {
            Some(id) => id,
            None => self
                .cursor_ledger_log
                .create_ledger()
                .await
                .map_err(into_cursor_error)?,
        };

        let full_snapshot =
            CursorSnapshot::new(mark_delete_pos, Some(ledger_id), individually_deleted, last_active);
        let blob = full_snapshot.encode()?;
        self.cursor_ledger_log
            .append_snapshot(ledger_id, blob)
            .await
            .map_err(into_cursor_error)?;

        // The metadata-store record only ever carries the ledger id (and bare mark-delete hint)
        // once a cursor has spilled; the range set itself lives solely in the ledger.
        let inline_hint = CursorSnapshot::new(mark_delete_pos, Some(ledger_id), &[], last_active);
        match self
            .metadata_store
            .put(log_name, cursor_name, inline_hint, expected_version)
            .await
        {
            Ok(version) => {
                if is_new_ledger {
                    PersistenceSpilled { cursor_name, ledger_id }.emit();
                }
                Ok(PersistOutcome {
                    cursor_ledger_id: Some(ledger_id),
                    metastore_version: version,
                })
            }
            Err(e) => {
                if is_new_ledger {
                    let _ = self.cursor_ledger_log.delete_ledger(ledger_id).await;
                }
                Err(into_cursor_error(e))
            }
        }
    }

    pub async fn delete(
        &self,
        log_name: &str,
        cursor_name: &str,
        cursor_ledger_id: Option<u64>,
    ) -> Result<()> {
        if let Some(ledger_id) = cursor_ledger_id {
            let _ = self.cursor_ledger_log.delete_ledger(ledger_id).await;
        }
        self.metadata_store
            .delete(log_name, cursor_name)
            .await
            .map_err(into_cursor_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::cursor_ledger::InMemoryCursorLedgerLog;
    use crate::persistence::metadata_store::InMemoryMetadataStore;

    fn manager(threshold: usize) -> PersistenceManager {
        PersistenceManager::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(InMemoryCursorLedgerLog::new()),
            threshold,
        )
    }

    #[tokio::test]
    async fn small_snapshots_stay_inline() {
        let manager = manager(10);
        let outcome = manager
            .persist("log", "c1", Position::new(0, 3), &[], None, None, 0)
            .await
            .unwrap();
        assert_eq!(outcome.cursor_ledger_id, None);

        let recovered = manager.recover("log", "c1").await.unwrap().unwrap();
        assert_eq!(recovered.mark_delete_pos, Position::new(0, 3));
        assert_eq!(recovered.cursor_ledger_id, None);
    }

    #[tokio::test]
    async fn large_snapshots_spill_to_a_dedicated_ledger() {
        let manager = manager(2);
        let ranges = vec![
            Interval::new(Position::new(0, 10), Position::new(0, 11)),
            Interval::new(Position::new(0, 20), Position::new(0, 21)),
            Interval::new(Position::new(0, 30), Position::new(0, 31)),
        ];
        let outcome = manager
            .persist("log", "c1", Position::new(0, 3), &ranges, None, None, 0)
            .await
            .unwrap();
        assert!(outcome.cursor_ledger_id.is_some());

        let recovered = manager.recover("log", "c1").await.unwrap().unwrap();
        assert_eq!(recovered.individually_deleted.len(), 3);
    }

    #[tokio::test]
    async fn failed_cas_switch_cleans_up_the_new_ledger() {
        let ledger_log = Arc::new(InMemoryCursorLedgerLog::new());
        let manager = PersistenceManager::new(
            Arc::new(InMemoryMetadataStore::new()),
            ledger_log.clone(),
            1,
        );
        let ranges = vec![
            Interval::new(Position::new(0, 10), Position::new(0, 11)),
            Interval::new(Position::new(0, 20), Position::new(0, 21)),
        ];
        // Passing a wrong expected_version (Some(99) when nothing has been written yet, so the
        // real current version is None) forces the metadata-store CAS to fail.
        let result = manager
            .persist("log", "c1", Position::new(0, 3), &ranges, None, Some(99), 0)
            .await;
        assert!(result.is_err());
        assert_eq!(ledger_log.ledger_count(), 0);
    }
}
