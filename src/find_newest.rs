use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{CursorError, Result};
use crate::log_view::LogView;
use crate::position::{CountBound, Position};

/// Selects whether `find_newest_matching` searches the whole log or only the cursor's active
/// (unread) range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchScope {
    SearchAll,
    SearchActiveRange,
}

/// A resumable binary search for the newest entry satisfying a predicate, over a possibly large
/// range of a log. Named states (`check_first`, `check_last`, `searching`) advance one
/// `read_entry` at a time rather than recursing, so the search cost stays bounded regardless of
/// how large the scanned range is.
///
/// `f` is assumed monotone in log order for the intended use (true, then false, as entries get
/// newer); the algorithm below does not depend on that assumption structurally.
pub async fn find_newest_matching(
    log_view: &Arc<dyn LogView>,
    start: Position,
    scope: SearchScope,
    read_pos: Position,
    f: impl Fn(&Entry) -> bool + Send + Sync,
) -> Result<Option<Position>> {
    let search_start = match scope {
        SearchScope::SearchAll => start,
        SearchScope::SearchActiveRange => read_pos,
    };

    let n = log_view
        .total_entries_from(search_start)
        .await
        .map_err(|source| CursorError::FindEntryFailed { source })?;
    if n == 0 {
        return Ok(None);
    }

    // check_first
    let (first_pos, first_entry) = read_entry(log_view, search_start).await?;
    if !f(&first_entry) {
        return Ok(None);
    }
    let mut last_match = first_pos;

    // A single live entry from `search_start` is `search_start` itself, already handled by
    // check_first above; `position_after_n(.., n - 1, StartExcluded)` below is only meaningful
    // once there's at least one entry strictly after it.
    if n == 1 {
        return Ok(Some(first_pos));
    }

    // check_last. `n` counts `search_start` itself (per the `total_entries_from` convention
    // used consistently elsewhere, e.g. `clear_backlog`), so the last live entry sits `n - 1`
    // positions after `search_start`, not `n`.
    let last_pos = log_view
        .position_after_n(search_start, n - 1, CountBound::StartExcluded)
        .await
        .map_err(|source| CursorError::FindEntryFailed { source })?;
    let (last_pos, last_entry) = read_entry(log_view, last_pos).await?;
    if f(&last_entry) {
        return Ok(Some(last_pos));
    }

    // searching: check_first ruled out position 0 (index of `search_start` itself) being the
    // answer's upper edge, check_last ruled out position `n - 1`, so the remaining candidates
    // are positions `1..=n-2` strictly after `search_start`.
    let mut min: u64 = 0;
    let mut max: u64 = n - 2;
    while max > min {
        let step = (max - min) / 2;
        let mid = min + step.max(1);
        let mid_pos = log_view
            .position_after_n(search_start, mid, CountBound::StartExcluded)
            .await
            .map_err(|source| CursorError::FindEntryFailed { source })?;
        let (pos, entry) = read_entry(log_view, mid_pos).await?;
        if f(&entry) {
            last_match = pos;
            min = mid;
        } else {
            max = mid - 1;
        }
    }

    Ok(Some(last_match))
}

async fn read_entry(log_view: &Arc<dyn LogView>, p: Position) -> Result<(Position, Entry)> {
    let entry = log_view
        .read_entry(p)
        .await
        .map_err(|source| CursorError::FindEntryFailed { source })?;
    Ok((p, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_view::InMemoryLogView;

    fn log_view_with(payloads: &[&str]) -> Arc<dyn LogView> {
        let log = InMemoryLogView::new();
        for payload in payloads {
            log.append(payload.as_bytes().to_vec());
        }
        Arc::new(log)
    }

    #[tokio::test]
    async fn finds_newest_matching_entry_scenario_5() {
        // 4 "expired" entries followed by 1 "not-expired": newest matching is the 4th (index 3).
        let log = log_view_with(&["expired", "expired", "expired", "expired", "not-expired"]);
        let start = Position::new(0, 0);
        let result = find_newest_matching(&log, start, SearchScope::SearchAll, start, |e| {
            e.payload() == b"expired"
        })
        .await
        .unwrap();
        assert_eq!(result, Some(Position::new(0, 3)));
    }

    #[tokio::test]
    async fn single_entry_log_short_circuits_on_check_first() {
        let log = log_view_with(&["expired"]);
        let start = Position::new(0, 0);
        let result = find_newest_matching(&log, start, SearchScope::SearchAll, start, |e| {
            e.payload() == b"expired"
        })
        .await
        .unwrap();
        assert_eq!(result, Some(Position::new(0, 0)));
    }

    #[tokio::test]
    async fn returns_none_when_first_entry_does_not_match() {
        let log = log_view_with(&["keep", "keep"]);
        let start = Position::new(0, 0);
        let result = find_newest_matching(&log, start, SearchScope::SearchAll, start, |e| {
            e.payload() == b"expired"
        })
        .await
        .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn returns_last_position_when_every_entry_matches() {
        let log = log_view_with(&["expired", "expired", "expired"]);
        let start = Position::new(0, 0);
        let result = find_newest_matching(&log, start, SearchScope::SearchAll, start, |e| {
            e.payload() == b"expired"
        })
        .await
        .unwrap();
        assert_eq!(result, Some(Position::new(0, 2)));
    }
}
