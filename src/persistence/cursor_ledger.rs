#[cfg(any(test, feature = "testing"))]
use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use parking_lot::Mutex;

use crate::error::MetaStoreError;

/// A cursor's dedicated small segmented log, used to store snapshots once the inline
/// `individually_deleted` range set has grown too large for the metadata store.
///
/// Only the last entry of a cursor ledger is ever authoritative on recovery (§4.G); this trait's
/// surface reflects exactly that: append, and read-the-last-entry. There is deliberately no
/// general random-access read, matching the metadata-log's actual access pattern.
#[async_trait]
pub trait CursorLedgerLog: Send + Sync {
    async fn create_ledger(&self) -> Result<u64, MetaStoreError>;

    /// Appends a snapshot blob, returning the entry id it was written at.
    async fn append_snapshot(&self, ledger_id: u64, blob: Vec<u8>) -> Result<u64, MetaStoreError>;

    async fn read_last_snapshot(&self, ledger_id: u64) -> Result<Option<Vec<u8>>, MetaStoreError>;

    /// Deletes a ledger outright. Used for cleanup of orphaned ledgers created during a failed
    /// small-to-large switch (§4.G).
    async fn delete_ledger(&self, ledger_id: u64) -> Result<(), MetaStoreError>;
}

#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
struct InMemoryLedgerState {
    next_ledger_id: u64,
    ledgers: HashMap<u64, Vec<Vec<u8>>>,
}

/// Reference, in-memory [`CursorLedgerLog`] used by this crate's own tests and available to
/// embedders under the `testing` feature.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct InMemoryCursorLedgerLog {
    state: Mutex<InMemoryLedgerState>,
}

#[cfg(any(test, feature = "testing"))]
impl InMemoryCursorLedgerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledgers currently tracked, including empty ones — used by tests asserting that
    /// a failed CAS switch cleans up after itself.
    pub fn ledger_count(&self) -> usize {
        self.state.lock().ledgers.len()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl CursorLedgerLog for InMemoryCursorLedgerLog {
    async fn create_ledger(&self) -> Result<u64, MetaStoreError> {
        let mut state = self.state.lock();
        let id = state.next_ledger_id;
        state.next_ledger_id += 1;
        state.ledgers.insert(id, Vec::new());
        Ok(id)
    }

    async fn append_snapshot(&self, ledger_id: u64, blob: Vec<u8>) -> Result<u64, MetaStoreError> {
        let mut state = self.state.lock();
        let entries = state
            .ledgers
            .get_mut(&ledger_id)
            .ok_or_else(|| MetaStoreError::new(format!("cursor ledger {ledger_id} does not exist")))?;
        entries.push(blob);
        Ok((entries.len() - 1) as u64)
    }

    async fn read_last_snapshot(&self, ledger_id: u64) -> Result<Option<Vec<u8>>, MetaStoreError> {
        let state = self.state.lock();
        let entries = state
            .ledgers
            .get(&ledger_id)
            .ok_or_else(|| MetaStoreError::new(format!("cursor ledger {ledger_id} does not exist")))?;
        Ok(entries.last().cloned())
    }

    async fn delete_ledger(&self, ledger_id: u64) -> Result<(), MetaStoreError> {
        self.state.lock().ledgers.remove(&ledger_id);
        Ok(())
    }
}
