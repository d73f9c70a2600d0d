//! End-to-end scenarios exercising a cursor against the in-memory reference collaborators,
//! mirroring the numbered walkthroughs a reader of the durable-cursor design would expect to see
//! spelled out as tests: empty-then-append, multi-cursor backlog counting, out-of-order acks,
//! rewind-then-mark-delete, the bounded find-newest search, and spill-to-ledger recovery.
//!
//! Requires the `testing` feature (run with `cargo test --features testing`): these tests use
//! the crate's in-memory `LogView`/`MetadataStore`/`CursorLedgerLog` reference implementations,
//! which are not part of the default build surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use ledger_cursor::{
    Cursor, CursorConfig, CursorLedgerLog, Entry, EntryCache, InMemoryCursorLedgerLog,
    InMemoryLogView, InMemoryMetadataStore, LogView, MetadataStore, PersistenceManager, Position,
    Result, SearchScope,
};

/// Installs a `tracing` subscriber that writes through the test harness's captured output, so a
/// failing scenario's debug/warn events from the internal-events layer show up in `cargo test`
/// output without `--nocapture`. Idempotent: every scenario calls this, only the first call wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn persistence(threshold: usize) -> Arc<PersistenceManager> {
    Arc::new(PersistenceManager::new(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(InMemoryCursorLedgerLog::new()),
        threshold,
    ))
}

async fn open_cursor(
    name: &str,
    log: &Arc<dyn LogView>,
    persistence: Arc<PersistenceManager>,
) -> Arc<Cursor> {
    Cursor::open(
        name,
        "log",
        log.clone(),
        Some(Arc::new(EntryCache::new("log", 0))),
        persistence,
        CursorConfig::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn scenario_1_empty_log_then_append_is_immediately_visible() {
    init_tracing();
    let log = Arc::new(InMemoryLogView::new());
    let dyn_log: Arc<dyn LogView> = log.clone();
    let cursor = open_cursor("c1", &dyn_log, persistence(10)).await;

    assert_eq!(cursor.number_of_entries().await.unwrap(), 0);
    assert!(cursor.read_entries(10).await.unwrap().is_empty());

    let p0 = log.append("hello");
    let entries = cursor.read_entries(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].position, p0);
    assert_eq!(entries[0].payload(), b"hello");
}

#[tokio::test]
async fn scenario_2_backlog_counting_across_cursors_opened_at_different_points() {
    init_tracing();
    let log = Arc::new(InMemoryLogView::new());
    let dyn_log: Arc<dyn LogView> = log.clone();
    let shared_persistence = persistence(10);

    // A brand-new cursor starts at the tail of the currently-open segment, so each cursor below
    // is opened right after a segment roll to pin its starting point at "now".
    // c1 opens before anything is appended: sees the full stream as backlog once entries land.
    let c1 = open_cursor("c1", &dyn_log, shared_persistence.clone()).await;

    log.append("a");
    log.append("b");
    log.roll_segment();

    // c2 opens after two entries exist, so it starts past them.
    let c2 = open_cursor("c2", &dyn_log, shared_persistence.clone()).await;

    log.append("c");
    log.append("d");
    log.roll_segment();

    // c3 opens after four entries exist, in the same (now current) segment as c4 below.
    let c3 = open_cursor("c3", &dyn_log, shared_persistence.clone()).await;

    log.append("e");

    // c4 opens in the same segment as c3 and immediately acks the one entry visible to it.
    let c4 = open_cursor("c4", &dyn_log, shared_persistence).await;
    let read = c4.read_entries(3).await.unwrap();
    c4.mark_delete(read.last().unwrap().position).await.unwrap();

    assert_eq!(c1.number_of_entries_in_backlog().await.unwrap(), 5);
    assert_eq!(c2.number_of_entries_in_backlog().await.unwrap(), 3);
    assert_eq!(c3.number_of_entries_in_backlog().await.unwrap(), 1);
    assert_eq!(c4.number_of_entries_in_backlog().await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_3_out_of_order_acks_absorb_once_contiguous() {
    init_tracing();
    let log = Arc::new(InMemoryLogView::new());
    let p1 = log.append("p1");
    let p2 = log.append("p2");
    let p3 = log.append("p3");
    let dyn_log: Arc<dyn LogView> = log;
    let cursor = open_cursor("c1", &dyn_log, persistence(10)).await;

    let initial = cursor.mark_delete_pos().await;

    cursor.delete(p3).await.unwrap();
    assert_eq!(cursor.mark_delete_pos().await, initial, "p3 can't absorb yet, p1/p2 missing");
    assert!(!cursor.is_individually_deleted_entries_empty().await);

    cursor.delete(p1).await.unwrap();
    assert_eq!(cursor.mark_delete_pos().await, p1);

    cursor.delete(p2).await.unwrap();
    assert_eq!(cursor.mark_delete_pos().await, p3, "p1,p2,p3 all contiguous now");
    assert!(cursor.is_individually_deleted_entries_empty().await);
}

#[tokio::test]
async fn scenario_4_rewind_then_mark_delete() {
    init_tracing();
    let log = Arc::new(InMemoryLogView::new());
    let _p1 = log.append("p1");
    let p2 = log.append("p2");
    let p3 = log.append("p3");
    let p4 = log.append("p4");
    let dyn_log: Arc<dyn LogView> = log;
    let cursor = open_cursor("c1", &dyn_log, persistence(10)).await;

    let read = cursor.read_entries(4).await.unwrap();
    assert_eq!(read.len(), 4);
    assert!(cursor.read_entries(1).await.unwrap().is_empty());

    cursor.rewind().await.unwrap();
    assert_eq!(cursor.number_of_entries().await.unwrap(), 4);

    cursor.mark_delete(p2).await.unwrap();
    let remaining = cursor.read_entries(10).await.unwrap();
    assert_eq!(
        remaining.iter().map(|e| e.position).collect::<Vec<_>>(),
        vec![p3, p4]
    );
}

/// Wraps an [`InMemoryLogView`], counting `read_entry` calls, to check
/// `find_newest_matching`'s binary search stays within its expected read budget.
struct CountingLogView {
    inner: Arc<InMemoryLogView>,
    read_entry_calls: AtomicUsize,
}

#[async_trait]
impl LogView for CountingLogView {
    async fn read_entries(&self, from: Position, max: usize) -> Result<(Vec<Entry>, Position)> {
        self.inner.read_entries(from, max).await
    }

    async fn read_entry(&self, p: Position) -> Result<Entry> {
        self.read_entry_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.read_entry(p).await
    }

    async fn has_more_after(&self, p: Position) -> Result<bool> {
        self.inner.has_more_after(p).await
    }

    async fn position_after_n(
        &self,
        start: Position,
        n: u64,
        bound: ledger_cursor::CountBound,
    ) -> Result<Position> {
        self.inner.position_after_n(start, n, bound).await
    }

    async fn total_entries_from(&self, p: Position) -> Result<u64> {
        self.inner.total_entries_from(p).await
    }

    fn subscribe_append(&self, listener: ledger_cursor::log_view::AppendListener) {
        self.inner.subscribe_append(listener)
    }

    async fn current_segment_start(&self) -> Result<Position> {
        self.inner.current_segment_start().await
    }
}

#[tokio::test]
async fn scenario_5_find_newest_matching_stays_within_the_expected_read_budget() {
    init_tracing();
    let inner = Arc::new(InMemoryLogView::new());
    for payload in ["expired", "expired", "expired", "expired", "not-expired"] {
        inner.append(payload);
    }
    let counting = Arc::new(CountingLogView {
        inner,
        read_entry_calls: AtomicUsize::new(0),
    });
    let dyn_log: Arc<dyn LogView> = counting.clone();
    let cursor = open_cursor("c1", &dyn_log, persistence(10)).await;

    let start = Position::new(0, 0);
    let result = cursor
        .find_newest_matching(start, SearchScope::SearchAll, |e| e.payload() == b"expired")
        .await
        .unwrap();

    assert_eq!(result, Some(Position::new(0, 3)));

    // check_first + check_last + a binary search over 5 entries: ceil(log2(5)) + 2 == 5 reads.
    let budget = (5usize).next_power_of_two().trailing_zeros() as usize + 2;
    assert!(
        counting.read_entry_calls.load(Ordering::SeqCst) <= budget,
        "expected at most {budget} read_entry calls, saw {}",
        counting.read_entry_calls.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn scenario_6_spill_to_cursor_ledger_and_recover_after_reopen() {
    init_tracing();
    let log = Arc::new(InMemoryLogView::new());
    let dyn_log: Arc<dyn LogView> = log.clone();

    let metadata_store = Arc::new(InMemoryMetadataStore::new());
    let cursor_ledger_log = Arc::new(InMemoryCursorLedgerLog::new());
    // Threshold of 10 individually-deleted ranges before a cursor spills to its own ledger.
    let shared_persistence = Arc::new(PersistenceManager::new(
        metadata_store.clone(),
        cursor_ledger_log.clone(),
        10,
    ));

    let mut positions = Vec::with_capacity(100);
    for i in 0..100 {
        positions.push(log.append(format!("payload-{i}")));
    }

    {
        let cursor = open_cursor("c1", &dyn_log, shared_persistence.clone()).await;
        cursor.read_entries(100).await.unwrap();
        // Individually ack every even-indexed entry (50 ranges), well past the spill threshold.
        for k in 0..50 {
            cursor.delete(positions[2 * k]).await.unwrap();
        }
        assert_eq!(cursor.number_of_entries_in_backlog().await.unwrap(), 50);
        cursor.close().await.unwrap();
    }

    // Reopen (simulating process restart): state must be recovered from the cursor ledger, since
    // 50 individually-deleted ranges exceeds the threshold of 10.
    let cursor = open_cursor("c1", &dyn_log, shared_persistence).await;
    assert_eq!(cursor.number_of_entries_in_backlog().await.unwrap(), 50);

    let remaining = cursor.read_entries(100).await.unwrap();
    assert_eq!(remaining.len(), 50);
    for (k, entry) in remaining.iter().enumerate() {
        assert_eq!(entry.position, positions[2 * k + 1]);
    }

    let record = metadata_store.get("log", "c1").await.unwrap().unwrap();
    let ledger_id = record
        .snapshot
        .cursor_ledger_id()
        .expect("cursor should have spilled to a dedicated ledger");
    assert!(cursor_ledger_log
        .read_last_snapshot(ledger_id)
        .await
        .unwrap()
        .is_some());
}
