use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration recognized by the cursor core, the entry cache, and the persistence layer.
///
/// Mirrors the shape of `disk_v2::common::DiskBufferConfig`: a plain, heavily documented struct
/// with a small builder, rather than a trait-parameterized config object, since (unlike the disk
/// buffer) nothing here needs to be generic over a storage backend at the config-type level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Influences log-view segmentation. Opaque to the cursor core itself: segmentation is the
    /// log view's concern, this value only exists so callers have one place to configure it.
    pub max_entries_per_ledger: u64,

    /// Bytes budgeted to the per-log entry cache. `0` disables the cache entirely.
    pub max_cache_size: usize,

    /// Persistences allowed per second, per cursor. `0` disables throttling (every `mark_delete`
    /// schedules a persistence immediately).
    pub throttle_mark_delete: u32,

    /// Threshold on `individually_deleted.size()` above which a cursor snapshot spills from the
    /// metadata store into its own dedicated cursor ledger.
    pub max_unacked_ranges_to_persist_in_metastore: usize,

    /// Segment size of a cursor's dedicated metadata ledger, once created.
    pub metadata_max_entries_per_ledger: u64,

    /// Consumed by the log view's own retention/GC; surfaced here only so find-newest's scanned
    /// range can be bounded by what is actually retained.
    pub retention_size_mb: u64,
    pub retention_time: Duration,
}

impl CursorConfig {
    /// The minimum interval between persistences implied by `throttle_mark_delete`, or `None`
    /// when throttling is disabled.
    pub fn throttle_interval(&self) -> Option<Duration> {
        if self.throttle_mark_delete == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / f64::from(self.throttle_mark_delete)))
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        CursorConfig {
            max_entries_per_ledger: 50_000,
            max_cache_size: 0,
            throttle_mark_delete: 0,
            max_unacked_ranges_to_persist_in_metastore: 1_000,
            metadata_max_entries_per_ledger: 1_000,
            retention_size_mb: 0,
            retention_time: Duration::from_secs(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_disabled_by_default() {
        assert_eq!(CursorConfig::default().throttle_interval(), None);
    }

    #[test]
    fn throttle_interval_is_inverse_of_rate() {
        let mut config = CursorConfig::default();
        config.throttle_mark_delete = 4;
        assert_eq!(config.throttle_interval(), Some(Duration::from_millis(250)));
    }
}
