#[cfg(any(test, feature = "testing"))]
use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use parking_lot::Mutex;

use crate::error::{CursorError, MetaStoreError};
use crate::persistence::snapshot::CursorSnapshot;

/// A metadata-store record together with the version it was read at, used to drive the
/// optimistic-concurrency `put`.
#[derive(Clone, Debug)]
pub struct VersionedRecord {
    pub snapshot: CursorSnapshot,
    pub version: u64,
}

/// Optimistic-concurrency key-value store of cursor records, keyed by `(log_name, cursor_name)`.
///
/// Grounded on the `Persistence`/`PersistenceReader` trait split in the convex-backend example:
/// an async, object-safe trait standing in for a real remote store, with versions enforced by the
/// implementation rather than trusted from the caller.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(
        &self,
        log_name: &str,
        cursor_name: &str,
    ) -> Result<Option<VersionedRecord>, MetaStoreError>;

    /// Writes `snapshot`, succeeding only if the stored version still matches
    /// `expected_version` (`None` means "must not exist yet"). Returns the new version on
    /// success.
    async fn put(
        &self,
        log_name: &str,
        cursor_name: &str,
        snapshot: CursorSnapshot,
        expected_version: Option<u64>,
    ) -> Result<u64, MetaStoreError>;

    async fn delete(&self, log_name: &str, cursor_name: &str) -> Result<(), MetaStoreError>;
}

#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
struct InMemoryStoreState {
    records: HashMap<(String, String), VersionedRecord>,
}

/// Reference, in-memory [`MetadataStore`] used by this crate's own tests and available to
/// embedders under the `testing` feature.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<InMemoryStoreState>,
}

#[cfg(any(test, feature = "testing"))]
impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(
        &self,
        log_name: &str,
        cursor_name: &str,
    ) -> Result<Option<VersionedRecord>, MetaStoreError> {
        Ok(self
            .state
            .lock()
            .records
            .get(&(log_name.to_string(), cursor_name.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        log_name: &str,
        cursor_name: &str,
        snapshot: CursorSnapshot,
        expected_version: Option<u64>,
    ) -> Result<u64, MetaStoreError> {
        let mut state = self.state.lock();
        let key = (log_name.to_string(), cursor_name.to_string());
        let current_version = state.records.get(&key).map(|r| r.version);
        if current_version != expected_version {
            return Err(MetaStoreError::new(format!(
                "stale write for {log_name}/{cursor_name}: expected version {expected_version:?}, found {current_version:?}"
            )));
        }
        let new_version = current_version.unwrap_or(0) + 1;
        state.records.insert(
            key,
            VersionedRecord {
                snapshot,
                version: new_version,
            },
        );
        Ok(new_version)
    }

    async fn delete(&self, log_name: &str, cursor_name: &str) -> Result<(), MetaStoreError> {
        self.state
            .lock()
            .records
            .remove(&(log_name.to_string(), cursor_name.to_string()));
        Ok(())
    }
}

pub(crate) fn into_cursor_error(err: MetaStoreError) -> CursorError {
    CursorError::MetaStoreFailed { source: err }
}
