use std::sync::Arc;

use crate::position::Position;

/// A single appended record: a position and an opaque payload.
///
/// Entries are reference-counted (`Arc`) rather than manually ref-counted: the "explicit release
/// performed by the reader" the data model calls for is simply dropping the last [`Entry`]
/// handle, which is what `Arc` already gives us idiomatically. The entry cache and any caller
/// holding a batch share ownership of the same underlying payload for as long as either keeps a
/// clone alive.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub position: Position,
    payload: Arc<[u8]>,
}

impl Entry {
    pub fn new(position: Position, payload: impl Into<Arc<[u8]>>) -> Self {
        Entry {
            position,
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size in bytes, used by the entry cache to enforce its byte budget.
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }
}
