use std::collections::BTreeMap;
use std::collections::HashMap;

use metrics::counter;
use parking_lot::Mutex;

use crate::entry::Entry;
use crate::position::Position;

struct Slot {
    entry: Entry,
    tick: u64,
}

struct Inner {
    by_position: HashMap<Position, Slot>,
    by_tick: BTreeMap<u64, Position>,
    next_tick: u64,
    current_bytes: usize,
    max_bytes: usize,
}

/// Bounded, per-log cache of recently read entry payloads, keyed by position.
///
/// A running byte total is checked on every insert, and entries are evicted oldest-access-first
/// until back under budget. A miss is never an error — the caller always has the log view as
/// ground truth — so this type has no fallible operations at all.
///
/// Passing `max_bytes == 0` disables the cache: every `get` misses and `put` is a no-op, which is
/// exactly what "all reads are direct" means for callers.
pub struct EntryCache {
    inner: Mutex<Inner>,
    log_name: String,
}

impl EntryCache {
    pub fn new(log_name: impl Into<String>, max_bytes: usize) -> Self {
        EntryCache {
            inner: Mutex::new(Inner {
                by_position: HashMap::new(),
                by_tick: BTreeMap::new(),
                next_tick: 0,
                current_bytes: 0,
                max_bytes,
            }),
            log_name: log_name.into(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.lock().max_bytes == 0
    }

    pub fn get(&self, position: Position) -> Option<Entry> {
        let mut inner = self.inner.lock();
        if inner.max_bytes == 0 {
            return None;
        }
        let tick = inner.next_tick;
        inner.next_tick += 1;
        let entry = {
            let inner = &mut *inner;
            if let Some(slot) = inner.by_position.get_mut(&position) {
                inner.by_tick.remove(&slot.tick);
                slot.tick = tick;
                inner.by_tick.insert(tick, position);
                Some(slot.entry.clone())
            } else {
                None
            }
        };
        drop(inner);

        counter!(
            "entry_cache_hits_total",
            if entry.is_some() { 1 } else { 0 },
            "log" => self.log_name.clone()
        );
        counter!(
            "entry_cache_misses_total",
            if entry.is_none() { 1 } else { 0 },
            "log" => self.log_name.clone()
        );
        entry
    }

    pub fn put(&self, entry: Entry) {
        let mut inner = self.inner.lock();
        if inner.max_bytes == 0 {
            return;
        }
        let position = entry.position;
        let size = entry.byte_size();

        if let Some(old) = inner.by_position.remove(&position) {
            inner.by_tick.remove(&old.tick);
            inner.current_bytes -= old.entry.byte_size();
        }

        // A single entry larger than the whole budget is simply not cached.
        if size > inner.max_bytes {
            return;
        }

        while inner.current_bytes + size > inner.max_bytes {
            let Some((&oldest_tick, &oldest_pos)) = inner.by_tick.iter().next() else {
                break;
            };
            inner.by_tick.remove(&oldest_tick);
            if let Some(slot) = inner.by_position.remove(&oldest_pos) {
                inner.current_bytes -= slot.entry.byte_size();
            }
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.by_tick.insert(tick, position);
        inner.current_bytes += size;
        inner.by_position.insert(position, Slot { entry, tick });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_position.len()
    }
}
