//! The cursor state machine: `read_pos`, `mark_delete_pos`, and the individually-deleted set,
//! maintained under concurrent reads, acknowledgments, rewinds, seeks, resets, and skips. This
//! file owns the type and its lifecycle; the operation surface itself lives in [`ops`].

pub mod ops;
pub mod pending_read;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::CursorConfig;
use crate::entry_cache::EntryCache;
use crate::error::{CursorError, Result};
use crate::internal_events::{CursorOpened, InternalEvent, PersistenceFailed};
use crate::log_view::LogView;
use crate::persistence::PersistenceManager;
use crate::position::Position;
use crate::range_set::RangeSet;

pub use pending_read::PendingRead;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorLifecycle {
    Active,
    Closed,
    Deleted,
}

/// Governs whether individually-acknowledged positions count toward `n` in
/// `skip_entries`/`get_nth_entry`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountPolicy {
    IncludeIndividuallyDeleted,
    Exclude,
}

pub(crate) struct CursorState {
    pub(crate) read_pos: Position,
    pub(crate) mark_delete_pos: Position,
    pub(crate) individually_deleted: RangeSet,
    pub(crate) cursor_ledger_id: Option<u64>,
    pub(crate) metastore_version: Option<u64>,
    pub(crate) lifecycle: CursorLifecycle,
}

impl CursorState {
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.lifecycle {
            CursorLifecycle::Active => Ok(()),
            CursorLifecycle::Closed | CursorLifecycle::Deleted => {
                Err(CursorError::CursorAlreadyClosed)
            }
        }
    }

    /// Invariant 3: repeatedly absorb the lowest individually-deleted interval into
    /// `mark_delete_pos` while it directly abuts the current watermark, then pull `read_pos`
    /// forward if it had fallen behind the new watermark (can happen after a `mark_delete` or
    /// `skip_entries` that jumps ahead of what's actually been read).
    pub(crate) fn absorb(&mut self) {
        loop {
            match self.individually_deleted.lowest() {
                Some(interval) if interval.lo == self.mark_delete_pos.next() => {
                    self.mark_delete_pos = interval.hi.prev();
                    self.individually_deleted
                        .remove_below(self.mark_delete_pos.next());
                }
                _ => break,
            }
        }
        if self.read_pos < self.mark_delete_pos.next() {
            self.read_pos = self.mark_delete_pos.next();
        }
    }
}

struct ThrottleState {
    last_persist: Option<Instant>,
    task_running: bool,
}

/// A durable, multi-consumer cursor over an append-only log.
///
/// Always held behind an `Arc` (construction returns one): operations that may need to schedule
/// background persistence hold a clone of the `Arc` across `tokio::spawn`.
pub struct Cursor {
    pub(crate) name: String,
    pub(crate) log_name: String,
    pub(crate) log_view: Arc<dyn LogView>,
    pub(crate) cache: Option<Arc<EntryCache>>,
    pub(crate) persistence: Arc<PersistenceManager>,
    pub(crate) config: CursorConfig,
    pub(crate) state: AsyncMutex<CursorState>,
    pub(crate) pending: SyncMutex<Option<PendingRead>>,
    throttle: SyncMutex<ThrottleState>,
}

impl Cursor {
    /// Opens (or creates) a named cursor on a log. If no durable record exists, it is
    /// initialized at `(current_last_segment, -1)`; otherwise its state is reconstructed via
    /// [`PersistenceManager::recover`].
    pub async fn open(
        name: impl Into<String>,
        log_name: impl Into<String>,
        log_view: Arc<dyn LogView>,
        cache: Option<Arc<EntryCache>>,
        persistence: Arc<PersistenceManager>,
        config: CursorConfig,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        let log_name = log_name.into();

        let persisted = persistence.recover(&log_name, &name).await?;

        let (read_pos, mark_delete_pos, individually_deleted, cursor_ledger_id, metastore_version) =
            match persisted {
                Some(recovered) => {
                    let mut set = RangeSet::new();
                    for interval in recovered.individually_deleted {
                        set.insert_interval(interval);
                    }
                    (
                        recovered.mark_delete_pos.next(),
                        recovered.mark_delete_pos,
                        set,
                        recovered.cursor_ledger_id,
                        Some(recovered.metastore_version),
                    )
                }
                None => {
                    let start = log_view
                        .current_segment_start()
                        .await
                        .map_err(|source| CursorError::LogReadError { source })?;
                    (start.next(), start, RangeSet::new(), None, None)
                }
            };

        CursorOpened {
            log_name: &log_name,
            cursor_name: &name,
            read_pos,
            mark_delete_pos,
        }
        .emit();

        let cursor = Arc::new(Cursor {
            name,
            log_name,
            log_view: log_view.clone(),
            cache,
            persistence,
            config,
            state: AsyncMutex::new(CursorState {
                read_pos,
                mark_delete_pos,
                individually_deleted,
                cursor_ledger_id,
                metastore_version,
                lifecycle: CursorLifecycle::Active,
            }),
            pending: SyncMutex::new(None),
            throttle: SyncMutex::new(ThrottleState {
                last_persist: None,
                task_running: false,
            }),
        });

        let weak = Arc::downgrade(&cursor);
        log_view.subscribe_append(Arc::new(move |appended_pos: Position| {
            if let Some(cursor) = weak.upgrade() {
                cursor.on_append(appended_pos);
            }
        }));

        Ok(cursor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Invoked synchronously by the log view's append-notification path. Looks for a pending
    /// read and, if one is registered and the append landed at or after its waiting position,
    /// hands the actual (async) read off to a spawned task so this callback itself stays
    /// synchronous and non-blocking.
    pub(crate) fn on_append(self: &Arc<Self>, appended_pos: Position) {
        if self.pending.lock().is_none() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let ready = {
                let state = this.state.lock().await;
                state.lifecycle == CursorLifecycle::Active && appended_pos >= state.read_pos
            };
            if !ready {
                return;
            }
            let Some(pending) = this.pending.lock().take() else {
                return;
            };
            let result = this.read_entries(pending.max).await;
            let _ = pending.responder.send(result);
        });
    }

    /// Takes a consistent snapshot of the durable-relevant state under the cursor's lock, then
    /// issues the metadata-store/cursor-ledger I/O outside it, per §5: "the in-memory state is
    /// snapshotted atomically at the moment persistence begins" so concurrent mutations never
    /// corrupt an in-flight write.
    pub(crate) async fn persist_now(&self) -> Result<()> {
        let (mark_delete_pos, individually_deleted, cursor_ledger_id, expected_version) = {
            let state = self.state.lock().await;
            (
                state.mark_delete_pos,
                state.individually_deleted.iter().collect::<Vec<_>>(),
                state.cursor_ledger_id,
                state.metastore_version,
            )
        };

        let last_active = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let outcome = self
            .persistence
            .persist(
                &self.log_name,
                &self.name,
                mark_delete_pos,
                &individually_deleted,
                cursor_ledger_id,
                expected_version,
                last_active,
            )
            .await?;

        let mut state = self.state.lock().await;
        state.cursor_ledger_id = outcome.cursor_ledger_id;
        state.metastore_version = Some(outcome.metastore_version);
        Ok(())
    }

    /// Schedules a persistence honoring `throttle_mark_delete`: a per-cursor coalescing timer
    /// that runs the next persistence at most once per `1/throttle` seconds and always persists
    /// whatever is current when it fires. With throttling disabled, persists immediately and
    /// synchronously with respect to the caller.
    pub(crate) async fn schedule_persist(self: &Arc<Self>) -> Result<()> {
        let Some(interval) = self.config.throttle_interval() else {
            return self.persist_now().await;
        };

        let wait = {
            let mut throttle = self.throttle.lock();
            if throttle.task_running {
                // Already a persist scheduled; it will pick up whatever is current when it
                // actually runs, so this call coalesces into it for free.
                return Ok(());
            }
            throttle.task_running = true;
            throttle
                .last_persist
                .map(|t| interval.saturating_sub(t.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        let this = self.clone();
        tokio::spawn(async move {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            if let Err(err) = this.persist_now().await {
                PersistenceFailed {
                    cursor_name: &this.name,
                    error: err.to_string(),
                }
                .emit();
            }
            let mut throttle = this.throttle.lock();
            throttle.task_running = false;
            throttle.last_persist = Some(Instant::now());
        });

        Ok(())
    }

    /// Closes the cursor: durable state is preserved, but all further operations fail with
    /// `cursor_already_closed`.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_active()?;
        state.lifecycle = CursorLifecycle::Closed;
        Ok(())
    }

    /// Deletes all durable state for this cursor. Terminal.
    pub async fn delete_cursor(&self) -> Result<()> {
        let cursor_ledger_id = {
            let mut state = self.state.lock().await;
            let id = state.cursor_ledger_id;
            state.lifecycle = CursorLifecycle::Deleted;
            id
        };
        self.persistence
            .delete(&self.log_name, &self.name, cursor_ledger_id)
            .await
    }
}
