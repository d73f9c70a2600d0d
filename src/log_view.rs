use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use parking_lot::Mutex;

use crate::entry::Entry;
use crate::error::LogViewError;
use crate::position::{CountBound, Position};

type Result<T> = std::result::Result<T, LogViewError>;

/// Invoked once per successful append, with the position just assigned.
pub type AppendListener = Arc<dyn Fn(Position) + Send + Sync>;

/// The read-only surface of the externally-owned segmented log, consumed by the cursor core.
///
/// Object-safe (`Arc<dyn LogView>`), so a real backend can be substituted without touching cursor
/// logic. Errors are propagated unchanged; the cursor core only masks them in the one case that
/// calls for it — treating a mark-delete past the newest created segment as valid rather than an
/// error.
#[async_trait]
pub trait LogView: Send + Sync {
    /// Returns at most `max` live entries starting at `from`, in order, plus the position
    /// immediately after the last entry returned (or `from` unchanged if none were returned).
    async fn read_entries(&self, from: Position, max: usize) -> Result<(Vec<Entry>, Position)>;

    async fn read_entry(&self, p: Position) -> Result<Entry>;

    async fn has_more_after(&self, p: Position) -> Result<bool>;

    /// The position that sits `n` live entries after `start`.
    async fn position_after_n(&self, start: Position, n: u64, bound: CountBound) -> Result<Position>;

    async fn total_entries_from(&self, p: Position) -> Result<u64>;

    /// Registers a listener invoked on every future successful append. There is no
    /// unsubscribe; callers that need to stop listening should make the listener a no-op
    /// (e.g. by checking a flag captured in the closure).
    fn subscribe_append(&self, listener: AppendListener);

    /// The position immediately before the first entry of the segment the log is currently
    /// appending to — used to initialize a brand-new cursor that has no durable record yet.
    async fn current_segment_start(&self) -> Result<Position>;
}

#[cfg(any(test, feature = "testing"))]
struct InMemoryState {
    entries: std::collections::BTreeMap<Position, Entry>,
    current_segment: u64,
    listeners: Vec<AppendListener>,
}

/// Reference, in-memory [`LogView`] used by this crate's own tests and available to embedders
/// under the `testing` feature. Not part of the production surface: a real deployment supplies
/// its own `LogView` backed by the actual segmented log service.
#[cfg(any(test, feature = "testing"))]
pub struct InMemoryLogView {
    state: Mutex<InMemoryState>,
}

#[cfg(any(test, feature = "testing"))]
impl Default for InMemoryLogView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing"))]
impl InMemoryLogView {
    pub fn new() -> Self {
        InMemoryLogView {
            state: Mutex::new(InMemoryState {
                entries: std::collections::BTreeMap::new(),
                current_segment: 0,
                listeners: Vec::new(),
            }),
        }
    }

    /// Appends a payload to the current segment and returns its assigned position.
    pub fn append(&self, payload: impl Into<Vec<u8>>) -> Position {
        let payload = payload.into();
        let (position, listeners) = {
            let mut state = self.state.lock();
            let next_entry = state
                .entries
                .range(Position::segment_start(state.current_segment)..)
                .filter(|(p, _)| p.segment == state.current_segment)
                .next_back()
                .map(|(p, _)| p.entry + 1)
                .unwrap_or(0);
            let position = Position::new(state.current_segment, next_entry);
            state.entries.insert(position, Entry::new(position, payload));
            (position, state.listeners.clone())
        };
        for listener in listeners {
            listener(position);
        }
        position
    }

    /// Rolls over to a new segment, simulating the log view beginning to write to a fresh
    /// segment (e.g. on size/time rollover of the underlying storage engine).
    pub fn roll_segment(&self) {
        let mut state = self.state.lock();
        state.current_segment += 1;
    }

    /// Removes an entry, simulating out-of-band log retention/GC independent of any cursor's
    /// acknowledgement state. Used by tests that exercise `individually_deleted` counting
    /// against a log where some positions are simply gone.
    pub fn forget(&self, p: Position) {
        self.state.lock().entries.remove(&p);
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl LogView for InMemoryLogView {
    async fn read_entries(&self, from: Position, max: usize) -> Result<(Vec<Entry>, Position)> {
        let state = self.state.lock();
        let mut out = Vec::new();
        let mut last = from;
        for (&p, entry) in state.entries.range(from..) {
            if out.len() >= max {
                break;
            }
            out.push(entry.clone());
            last = p.next();
        }
        Ok((out, last))
    }

    async fn read_entry(&self, p: Position) -> Result<Entry> {
        self.state
            .lock()
            .entries
            .get(&p)
            .cloned()
            .ok_or_else(|| LogViewError::new(format!("no entry at {p}")))
    }

    async fn has_more_after(&self, p: Position) -> Result<bool> {
        Ok(self.state.lock().entries.range(p.next()..).next().is_some())
    }

    async fn position_after_n(&self, start: Position, n: u64, bound: CountBound) -> Result<Position> {
        let state = self.state.lock();
        let range_start = match bound {
            CountBound::StartIncluded => start,
            CountBound::StartExcluded => start.next(),
        };
        let mut last = start;
        for (i, (&p, _)) in state.entries.range(range_start..).enumerate() {
            last = p;
            if i as u64 + 1 == n {
                // `last` IS the n-th live entry after `start` — this is the position a caller
                // reads an entry at, not one past it.
                return Ok(last);
            }
        }
        // Fewer than `n` entries exist; returning one past the newest known entry signals
        // "nothing there yet" to callers (e.g. a mark_delete past the newest created segment).
        Ok(last.next())
    }

    async fn total_entries_from(&self, p: Position) -> Result<u64> {
        Ok(self.state.lock().entries.range(p..).count() as u64)
    }

    fn subscribe_append(&self, listener: AppendListener) {
        self.state.lock().listeners.push(listener);
    }

    async fn current_segment_start(&self) -> Result<Position> {
        Ok(Position::segment_start(self.state.lock().current_segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_increasing_positions_within_a_segment() {
        let log = InMemoryLogView::new();
        let p0 = log.append("a");
        let p1 = log.append("b");
        assert_eq!(p0, Position::new(0, 0));
        assert_eq!(p1, Position::new(0, 1));
    }

    #[tokio::test]
    async fn listeners_fire_with_the_new_position() {
        let log = InMemoryLogView::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        log.subscribe_append(Arc::new(move |p| seen_clone.lock().push(p)));
        log.append("a");
        log.append("b");
        assert_eq!(*seen.lock(), vec![Position::new(0, 0), Position::new(0, 1)]);
    }

    #[tokio::test]
    async fn read_entries_respects_max_and_returns_next_position() {
        let log = InMemoryLogView::new();
        log.append("a");
        log.append("b");
        log.append("c");
        let (entries, next) = log.read_entries(Position::new(0, 0), 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(next, Position::new(0, 2));
    }
}
