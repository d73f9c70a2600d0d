use serde::{Deserialize, Serialize};

use crate::error::CursorError;
use crate::position::Position;
use crate::range_set::Interval;

/// The durable record of a cursor's acknowledgement state.
///
/// Fields are plain primitives (`mark_delete_segment`/`mark_delete_entry` rather than a single
/// `Position`, `cursors_ledger_id` as `-1` for "unused") to keep the wire format stable and
/// independent of in-memory type changes; `Position`/`Option` conversions happen at the edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub mark_delete_segment: u64,
    pub mark_delete_entry: i64,
    pub cursors_ledger_id: i64,
    pub individually_deleted: Vec<(u64, i64, u64, i64)>,
    pub last_active: u64,
}

impl CursorSnapshot {
    pub fn new(
        mark_delete_pos: Position,
        cursor_ledger_id: Option<u64>,
        individually_deleted: &[Interval],
        last_active: u64,
    ) -> Self {
        CursorSnapshot {
            mark_delete_segment: mark_delete_pos.segment,
            mark_delete_entry: mark_delete_pos.entry,
            cursors_ledger_id: cursor_ledger_id.map_or(-1, |id| id as i64),
            individually_deleted: individually_deleted
                .iter()
                .map(|i| (i.lo.segment, i.lo.entry, i.hi.segment, i.hi.entry))
                .collect(),
            last_active,
        }
    }

    pub fn mark_delete_pos(&self) -> Position {
        Position::new(self.mark_delete_segment, self.mark_delete_entry)
    }

    pub fn cursor_ledger_id(&self) -> Option<u64> {
        if self.cursors_ledger_id < 0 {
            None
        } else {
            Some(self.cursors_ledger_id as u64)
        }
    }

    pub fn individually_deleted_intervals(&self) -> Vec<Interval> {
        self.individually_deleted
            .iter()
            .map(|&(lo_seg, lo_ent, hi_seg, hi_ent)| {
                Interval::new(Position::new(lo_seg, lo_ent), Position::new(hi_seg, hi_ent))
            })
            .collect()
    }

    /// Encodes the snapshot as a checksummed blob suitable for the metadata store or a cursor
    /// ledger entry, the same `crc32fast`-guarded shape `disk_v2` uses for its own on-disk
    /// records.
    pub fn encode(&self) -> Result<Vec<u8>, CursorError> {
        let body = bincode::serialize(self).map_err(|e| CursorError::BrokenCursor {
            reason: format!("failed to encode cursor snapshot: {e}"),
        })?;
        let checksum = crc32fast::hash(&body);
        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CursorError> {
        if bytes.len() < 4 {
            return Err(CursorError::BrokenCursor {
                reason: "snapshot blob shorter than checksum header".to_string(),
            });
        }
        let (checksum_bytes, body) = bytes.split_at(4);
        let expected = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(CursorError::BrokenCursor {
                reason: format!("snapshot checksum mismatch: expected {expected}, got {actual}"),
            });
        }
        bincode::deserialize(body).map_err(|e| CursorError::BrokenCursor {
            reason: format!("failed to decode cursor snapshot: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let snapshot = CursorSnapshot::new(
            Position::new(2, 7),
            Some(9),
            &[Interval::new(Position::new(2, 9), Position::new(2, 12))],
            42,
        );
        let bytes = snapshot.encode().unwrap();
        let decoded = CursorSnapshot::decode(&bytes).unwrap();
        assert_eq!(snapshot, decoded);
        assert_eq!(decoded.mark_delete_pos(), Position::new(2, 7));
        assert_eq!(decoded.cursor_ledger_id(), Some(9));
    }

    #[test]
    fn negative_ledger_id_means_unused() {
        let snapshot = CursorSnapshot::new(Position::new(0, -1), None, &[], 0);
        assert_eq!(snapshot.cursor_ledger_id(), None);
    }

    #[test]
    fn corrupted_blob_fails_checksum() {
        let snapshot = CursorSnapshot::new(Position::new(0, 0), None, &[], 0);
        let mut bytes = snapshot.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(CursorSnapshot::decode(&bytes).is_err());
    }
}
