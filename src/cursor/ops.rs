//! The cursor's public operation surface: reads, acknowledgments, seeks, resets, skips, and the
//! derived counting queries (backlog size, entries available to read).

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::cursor::pending_read::PendingRead;
use crate::cursor::{Cursor, CountPolicy, CursorLifecycle};
use crate::entry::Entry;
use crate::error::{CursorError, Result};
use crate::find_newest::{self, SearchScope};
use crate::internal_events::{BacklogUpdated, InternalEvent, MarkDeleteAdvanced};
use crate::position::Position;
use crate::range_set::Interval;

const SCAN_BATCH_SIZE: usize = 64;

impl Cursor {
    /// Returns up to `max` live entries starting at `read_pos`, advancing `read_pos` past
    /// everything returned, including positions filtered out because they're
    /// individually-deleted: those are skipped, not counted against `max`.
    pub async fn read_entries(self: &Arc<Self>, max: usize) -> Result<Vec<Entry>> {
        if max == 0 {
            return Err(CursorError::InvalidArgument {
                reason: "read_entries requires max >= 1".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        state.ensure_active()?;

        let mut from = state.read_pos;
        let mut collected = Vec::with_capacity(max);
        loop {
            if collected.len() >= max {
                break;
            }
            let need = max - collected.len();
            let (batch, next) = self
                .log_view
                .read_entries(from, need)
                .await
                .map_err(|source| CursorError::LogReadError { source })?;
            if batch.is_empty() {
                break;
            }
            for entry in batch {
                if !state.individually_deleted.contains(entry.position) {
                    if let Some(cache) = &self.cache {
                        cache.put(entry.clone());
                    }
                    collected.push(entry);
                }
            }
            from = next;
        }
        state.read_pos = from;
        Ok(collected)
    }

    /// If a live entry exists at `read_pos` right now, behaves like [`Cursor::read_entries`].
    /// Otherwise registers a pending read (at most one per cursor) and resolves once the log
    /// view notifies of an append at or after `read_pos`. Resolves to `Ok(None)` if the pending
    /// read is cancelled via [`Cursor::cancel_pending_read`] rather than ever completing.
    ///
    /// This is the future-based reworking of `async_read_entries_or_wait(max, cb)` per Design
    /// Note 2: the continuation is just "whatever awaits this future" rather than an explicit
    /// callback parameter.
    pub async fn read_entries_or_wait(self: &Arc<Self>, max: usize) -> Result<Option<Vec<Entry>>> {
        if max == 0 {
            return Err(CursorError::InvalidArgument {
                reason: "read_entries_or_wait requires max >= 1".to_string(),
            });
        }

        let immediate = self.read_entries(max).await?;
        if !immediate.is_empty() {
            return Ok(Some(immediate));
        }

        let (responder, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(CursorError::PendingReadAlreadyRegistered);
            }
            *pending = Some(PendingRead { max, responder });
        }

        match rx.await {
            Ok(result) => result.map(Some),
            // The sender was dropped without sending, which only happens via
            // `cancel_pending_read`.
            Err(_) => Ok(None),
        }
    }

    /// Removes a pending read without invoking its completion, returning whether one was
    /// present. Synchronous and non-blocking.
    pub fn cancel_pending_read(&self) -> bool {
        self.pending.lock().take().is_some()
    }

    /// Advances `mark_delete_pos` to `p`. Requires `p >= mark_delete_pos` (ack must be
    /// monotonic); re-marking the current position is a no-op success.
    pub async fn mark_delete(self: &Arc<Self>, p: Position) -> Result<()> {
        let (mark_delete_pos, deleted_size) = {
            let mut state = self.state.lock().await;
            state.ensure_active()?;

            if p < state.mark_delete_pos {
                return Err(CursorError::InvalidMarkDelete {
                    requested: p,
                    current: state.mark_delete_pos,
                });
            }
            if p == state.mark_delete_pos {
                return Ok(());
            }

            let from = state.mark_delete_pos;
            state.mark_delete_pos = p;
            state.individually_deleted.remove_below(p.next());
            state.absorb();

            MarkDeleteAdvanced {
                cursor_name: &self.name,
                from,
                to: state.mark_delete_pos,
            }
            .emit();

            (state.mark_delete_pos, state.individually_deleted.size())
        };
        self.emit_backlog_updated(mark_delete_pos, deleted_size).await;
        self.schedule_persist().await
    }

    /// A single-position acknowledgment. Equivalent to inserting `p` into the
    /// individually-deleted set and then running absorption; silently succeeds if `p` is already
    /// covered by `mark_delete_pos`.
    pub async fn delete(self: &Arc<Self>, p: Position) -> Result<()> {
        let (mark_delete_pos, deleted_size) = {
            let mut state = self.state.lock().await;
            state.ensure_active()?;
            if p <= state.mark_delete_pos {
                return Ok(());
            }
            state.individually_deleted.insert(p);
            state.absorb();
            (state.mark_delete_pos, state.individually_deleted.size())
        };
        self.emit_backlog_updated(mark_delete_pos, deleted_size).await;
        self.schedule_persist().await
    }

    /// Reports the current backlog size through [`BacklogUpdated`], best-effort: a log read
    /// failure here only skips the metric, it never fails the acknowledgment that triggered it.
    async fn emit_backlog_updated(&self, mark_delete_pos: Position, individually_deleted_size: u64) {
        if let Ok(total_live) = self.log_view.total_entries_from(mark_delete_pos.next()).await {
            BacklogUpdated {
                cursor_name: &self.name,
                backlog: total_live.saturating_sub(individually_deleted_size),
            }
            .emit();
        }
    }

    /// Sets `read_pos = p` without touching `mark_delete_pos`. Fails if `p` precedes
    /// `mark_delete_pos.next()` — a cursor can't seek back before what it has already
    /// acknowledged.
    pub async fn seek(&self, p: Position) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_active()?;
        let floor = state.mark_delete_pos.next();
        if p < floor {
            return Err(CursorError::InvalidArgument {
                reason: format!("seek target {p} precedes mark_delete_pos.next() {floor}"),
            });
        }
        state.read_pos = p;
        Ok(())
    }

    /// Sets `read_pos = mark_delete_pos.next()`, re-exposing everything acknowledged only via
    /// the individually-deleted set (not yet absorbed into `mark_delete_pos`) for re-reading.
    pub async fn rewind(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_active()?;
        state.read_pos = state.mark_delete_pos.next();
        Ok(())
    }

    async fn apply_reset(&self, p: Position) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_active()?;
        state.read_pos = p;
        state.mark_delete_pos = p.prev();
        let below = state.mark_delete_pos.next();
        state.individually_deleted.remove_below(below);
        Ok(())
    }

    /// Sets both `read_pos = p` and `mark_delete_pos = p.prev()`, clearing any individually-
    /// deleted entries below the new watermark, and persists synchronously before returning.
    pub async fn reset_cursor(self: &Arc<Self>, p: Position) -> Result<()> {
        self.apply_reset(p).await?;
        self.persist_now().await
    }

    /// As [`Cursor::reset_cursor`], but persistence goes through the normal throttled scheduling
    /// path instead of being awaited synchronously.
    pub async fn async_reset_cursor(self: &Arc<Self>, p: Position) -> Result<()> {
        self.apply_reset(p).await?;
        self.schedule_persist().await
    }

    /// Equivalent to `mark_delete(log_last_position)`, with `read_pos` explicitly set to
    /// `log_last_position.next()` regardless of where `mark_delete` would otherwise leave it.
    pub async fn clear_backlog(self: &Arc<Self>) -> Result<()> {
        let mark_delete_pos = { self.state.lock().await.mark_delete_pos };
        let total = self
            .log_view
            .total_entries_from(mark_delete_pos.next())
            .await
            .map_err(|source| CursorError::LogReadError { source })?;
        if total == 0 {
            return Ok(());
        }
        let last_position = self
            .log_view
            .position_after_n(mark_delete_pos, total, crate::position::CountBound::StartExcluded)
            .await
            .map_err(|source| CursorError::LogReadError { source })?;
        self.mark_delete(last_position).await?;
        let mut state = self.state.lock().await;
        state.read_pos = last_position.next();
        Ok(())
    }

    /// Advances `read_pos` by `n` live entries, interpreting `n` according to `policy`, and
    /// treats the skipped span as acknowledged: `mark_delete_pos` advances to cover it and
    /// absorption runs.
    pub async fn skip_entries(self: &Arc<Self>, n: u64, policy: CountPolicy) -> Result<()> {
        if n == 0 {
            return Ok(());
        }

        let should_persist = {
            let mut state = self.state.lock().await;
            state.ensure_active()?;

            let mut from = state.read_pos;
            let mut counted: u64 = 0;
            let mut last_pos = state.read_pos.prev();
            loop {
                if counted >= n {
                    break;
                }
                let (batch, next) = self
                    .log_view
                    .read_entries(from, SCAN_BATCH_SIZE)
                    .await
                    .map_err(|source| CursorError::LogReadError { source })?;
                if batch.is_empty() {
                    break;
                }
                for entry in &batch {
                    let qualifies = match policy {
                        CountPolicy::IncludeIndividuallyDeleted => true,
                        CountPolicy::Exclude => !state.individually_deleted.contains(entry.position),
                    };
                    last_pos = entry.position;
                    if qualifies {
                        counted += 1;
                        if counted >= n {
                            break;
                        }
                    }
                }
                from = next;
            }

            let new_read_pos = last_pos.next();
            if new_read_pos > state.read_pos {
                state.read_pos = new_read_pos;
            }

            let new_mark_delete = new_read_pos.prev();
            let should_persist = new_mark_delete > state.mark_delete_pos;
            if should_persist {
                state.mark_delete_pos = new_mark_delete;
                let below = state.mark_delete_pos.next();
                state.individually_deleted.remove_below(below);
                state.absorb();
            }
            should_persist
        };

        if should_persist {
            self.schedule_persist().await
        } else {
            Ok(())
        }
    }

    /// Returns the n-th (1-based) entry at or after `read_pos`, honoring `policy` for whether
    /// individually-deleted positions qualify, without mutating any state. `None` if fewer than
    /// `n` qualifying entries remain.
    pub async fn get_nth_entry(&self, n: u64, policy: CountPolicy) -> Result<Option<Entry>> {
        if n == 0 {
            return Err(CursorError::InvalidArgument {
                reason: "get_nth_entry requires n >= 1".to_string(),
            });
        }

        let state = self.state.lock().await;
        state.ensure_active()?;
        let mut from = state.read_pos;
        let mut counted = 0u64;
        loop {
            let (batch, next) = self
                .log_view
                .read_entries(from, SCAN_BATCH_SIZE)
                .await
                .map_err(|source| CursorError::LogReadError { source })?;
            if batch.is_empty() {
                return Ok(None);
            }
            for entry in batch {
                let qualifies = match policy {
                    CountPolicy::IncludeIndividuallyDeleted => true,
                    CountPolicy::Exclude => !state.individually_deleted.contains(entry.position),
                };
                if qualifies {
                    counted += 1;
                    if counted == n {
                        return Ok(Some(entry));
                    }
                }
            }
            from = next;
        }
    }

    /// Reads an arbitrary set of positions and returns them as a batch, in the order given.
    /// Fails if any position is unknown to the log view; silently skips positions already
    /// covered by `mark_delete_pos`.
    pub async fn replay_entries(&self, positions: &[Position]) -> Result<Vec<Entry>> {
        let mark_delete_pos = { self.state.lock().await.mark_delete_pos };

        let mut out = Vec::with_capacity(positions.len());
        for &p in positions {
            if p <= mark_delete_pos {
                continue;
            }
            if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(p)) {
                out.push(cached);
                continue;
            }
            let entry = self
                .log_view
                .read_entry(p)
                .await
                .map_err(|source| CursorError::LogReadError { source })?;
            if let Some(cache) = &self.cache {
                cache.put(entry.clone());
            }
            out.push(entry);
        }
        Ok(out)
    }

    /// Number of live entries available to read from `read_pos` onward (invariant 5).
    pub async fn number_of_entries(&self) -> Result<u64> {
        let state = self.state.lock().await;
        let total_live = self
            .log_view
            .total_entries_from(state.read_pos)
            .await
            .map_err(|source| CursorError::LogReadError { source })?;
        let deleted_ahead = state.individually_deleted.count_from(state.read_pos);
        Ok(total_live.saturating_sub(deleted_ahead))
    }

    /// Number of live, unacknowledged entries beyond `mark_delete_pos` (invariant 4).
    pub async fn number_of_entries_in_backlog(&self) -> Result<u64> {
        let state = self.state.lock().await;
        let total_live = self
            .log_view
            .total_entries_from(state.mark_delete_pos.next())
            .await
            .map_err(|source| CursorError::LogReadError { source })?;
        Ok(total_live.saturating_sub(state.individually_deleted.size()))
    }

    pub async fn is_individually_deleted_entries_empty(&self) -> bool {
        self.state.lock().await.individually_deleted.is_empty()
    }

    pub async fn read_pos(&self) -> Position {
        self.state.lock().await.read_pos
    }

    pub async fn mark_delete_pos(&self) -> Position {
        self.state.lock().await.mark_delete_pos
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.lifecycle != CursorLifecycle::Active
    }

    pub async fn individually_deleted_intervals(&self) -> Vec<Interval> {
        self.state.lock().await.individually_deleted.iter().collect()
    }

    /// The bounded async binary search for the newest entry matching `f`, scoped to either the
    /// whole log or just this cursor's active range.
    pub async fn find_newest_matching(
        self: &Arc<Self>,
        start: Position,
        scope: SearchScope,
        f: impl Fn(&Entry) -> bool + Send + Sync,
    ) -> Result<Option<Position>> {
        let read_pos = self.read_pos().await;
        find_newest::find_newest_matching(&self.log_view, start, scope, read_pos, f).await
    }
}
