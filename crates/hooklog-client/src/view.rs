//! Record collections shown by the dashboard and how they combine
//!
//! Three collections feed the display: `history` (loaded once), `live`
//! (pushed by the feed, newest first) and `search` (results of the last
//! query). [`merge`] folds them into the displayed list; deletes are applied
//! optimistically and can be rolled back from a [`DeleteSnapshot`].

use hooklog_proto::{RequestRecord, SearchResponse};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long a deleted key keeps live records with the same key out
pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(60);

/// Newest first; equal timestamps by key, highest first
pub fn compare_records(a: &RequestRecord, b: &RequestRecord) -> Ordering {
    b.timestamp()
        .cmp(&a.timestamp())
        .then_with(|| b.key.cmp(&a.key))
}

/// Combine the three collections into the displayed list.
///
/// Non-empty search results replace everything else. Otherwise live records
/// whose key is already in history are dropped and the rest are sorted
/// together with history. Inputs are left untouched.
pub fn merge(
    history: &[RequestRecord],
    live: &[RequestRecord],
    search: &[RequestRecord],
) -> Vec<RequestRecord> {
    if !search.is_empty() {
        return search.to_vec();
    }

    let history_keys: HashSet<i64> = history.iter().map(|r| r.key).collect();
    let mut merged: Vec<RequestRecord> = live
        .iter()
        .filter(|r| !history_keys.contains(&r.key))
        .chain(history.iter())
        .cloned()
        .collect();
    merged.sort_by(compare_records);
    merged
}

/// Recently deleted keys
#[derive(Debug, Clone)]
pub struct Tombstones {
    ttl: Duration,
    entries: HashMap<i64, Instant>,
}

impl Tombstones {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: i64) {
        self.entries.insert(key, Instant::now());
    }

    pub fn remove(&mut self, key: i64) {
        self.entries.remove(&key);
    }

    pub fn contains(&self, key: i64) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|deleted| deleted.elapsed() < self.ttl)
    }

    /// Forget expired entries
    pub fn prune(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, deleted| deleted.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Tombstones {
    fn default() -> Self {
        Self::new(DEFAULT_TOMBSTONE_TTL)
    }
}

/// The three collections as they were before an optimistic delete
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSnapshot {
    pub key: i64,
    history: Vec<RequestRecord>,
    live: Vec<RequestRecord>,
    search: Vec<RequestRecord>,
}

/// What a search response did to the view
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Blank query, results cleared
    Cleared,
    /// Results now replace the merged view
    Results(usize),
    /// The query succeeded but matched nothing
    NoResults,
    /// The server reported a failure; results cleared
    Failed(String),
}

/// Client-side state of the dashboard
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    history: Vec<RequestRecord>,
    live: Vec<RequestRecord>,
    search: Vec<RequestRecord>,
    selected: Option<i64>,
    tombstones: Tombstones,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tombstone_ttl(ttl: Duration) -> Self {
        Self {
            tombstones: Tombstones::new(ttl),
            ..Self::default()
        }
    }

    pub fn history(&self) -> &[RequestRecord] {
        &self.history
    }

    pub fn live(&self) -> &[RequestRecord] {
        &self.live
    }

    pub fn search_results(&self) -> &[RequestRecord] {
        &self.search
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    pub fn set_history(&mut self, records: Vec<RequestRecord>) {
        self.history = records;
    }

    /// Add a record pushed by the live feed.
    ///
    /// Returns false when the record was dropped: its key is tombstoned or
    /// already held by the history or live collection. History wins the
    /// merge for a shared key, so a live copy would never be displayed.
    pub fn push_live(&mut self, record: RequestRecord) -> bool {
        self.tombstones.prune();
        if self.tombstones.contains(record.key) {
            debug!("Dropping live record {} (recently deleted)", record.key);
            return false;
        }
        if self.history.iter().any(|r| r.key == record.key) {
            debug!("Dropping live record {} (already in history)", record.key);
            return false;
        }
        if self.live.iter().any(|r| r.key == record.key) {
            debug!("Dropping duplicate live record {}", record.key);
            return false;
        }
        self.live.insert(0, record);
        true
    }

    /// The displayed list
    pub fn records(&self) -> Vec<RequestRecord> {
        merge(&self.history, &self.live, &self.search)
    }

    pub fn select(&mut self, key: Option<i64>) {
        self.selected = key;
    }

    /// The selected record, if it is still displayed
    pub fn selected(&self) -> Option<RequestRecord> {
        let key = self.selected?;
        self.records().into_iter().find(|r| r.key == key)
    }

    /// Remove `key` from every collection and tombstone it.
    ///
    /// The returned snapshot holds the collections as they were, for
    /// [`complete_delete`](Self::complete_delete) or
    /// [`rollback_delete`](Self::rollback_delete) once the server answers.
    pub fn begin_delete(&mut self, key: i64) -> DeleteSnapshot {
        let snapshot = DeleteSnapshot {
            key,
            history: self.history.clone(),
            live: self.live.clone(),
            search: self.search.clone(),
        };

        self.history.retain(|r| r.key != key);
        self.live.retain(|r| r.key != key);
        self.search.retain(|r| r.key != key);
        self.tombstones.insert(key);
        snapshot
    }

    pub fn complete_delete(&mut self, snapshot: &DeleteSnapshot) {
        if self.selected == Some(snapshot.key) {
            self.selected = None;
        }
    }

    /// Put the collections back as captured and lift the key's tombstone.
    ///
    /// Keys that are still tombstoned by other deletes stay hidden.
    pub fn rollback_delete(&mut self, snapshot: DeleteSnapshot) {
        self.tombstones.remove(snapshot.key);
        self.history = snapshot.history;
        self.live = snapshot.live;
        self.search = snapshot.search;

        let tombstones = &self.tombstones;
        self.history.retain(|r| !tombstones.contains(r.key));
        self.live.retain(|r| !tombstones.contains(r.key));
        self.search.retain(|r| !tombstones.contains(r.key));
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }

    /// Apply a search response
    pub fn apply_search(&mut self, response: SearchResponse) -> SearchOutcome {
        if !response.success {
            self.search.clear();
            return SearchOutcome::Failed(
                response
                    .error
                    .unwrap_or_else(|| "search failed".to_string()),
            );
        }
        if response.total == 0 || response.results.is_empty() {
            self.search.clear();
            return SearchOutcome::NoResults;
        }

        self.search = response.results;
        SearchOutcome::Results(self.search.len())
    }

    /// Drop every record after the server emptied the store
    pub fn clear_all(&mut self) {
        self.history.clear();
        self.live.clear();
        self.search.clear();
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklog_proto::CapturedRequest;

    fn record(key: i64, second: u32) -> RequestRecord {
        record_with_path(key, second, "/")
    }

    fn record_with_path(key: i64, second: u32, path: &str) -> RequestRecord {
        let request = CapturedRequest::from_json(&format!(
            r#"{{"method":"GET","path":"{}","timestamp":"2025-01-01T00:00:{:02}Z"}}"#,
            path, second
        ))
        .unwrap();
        RequestRecord::new(key, request)
    }

    fn keys(records: &[RequestRecord]) -> Vec<i64> {
        records.iter().map(|r| r.key).collect()
    }

    #[test]
    fn test_merge_disjoint_sorted_newest_first() {
        let history = vec![record(1, 1), record(2, 2)];
        let live = vec![record(4, 4), record(3, 3)];

        let merged = merge(&history, &live, &[]);
        assert_eq!(keys(&merged), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_merge_duplicate_keeps_history_payload() {
        let history = vec![record_with_path(2, 2, "/from-history"), record(1, 1)];
        let live = vec![record_with_path(2, 2, "/from-live")];

        let merged = merge(&history, &live, &[]);
        assert_eq!(keys(&merged), vec![2, 1]);
        assert_eq!(merged[0].request.path, "/from-history");
    }

    #[test]
    fn test_merge_is_idempotent_and_ordered() {
        let history = vec![record(5, 1), record(6, 1), record(2, 9)];
        let live = vec![record(7, 3)];

        let first = merge(&history, &live, &[]);
        let second = merge(&first, &[], &[]);
        assert_eq!(first, second);
        assert_eq!(keys(&first), vec![2, 7, 6, 5]);
        assert!(first
            .windows(2)
            .all(|pair| pair[0].timestamp() >= pair[1].timestamp()));
    }

    #[test]
    fn test_search_results_replace_view() {
        let history = vec![record(1, 1), record(2, 2)];
        let search = vec![record(1, 1)];

        assert_eq!(keys(&merge(&history, &[], &search)), vec![1]);
    }

    #[test]
    fn test_push_live_drops_duplicates_and_tombstoned() {
        let mut view = DashboardView::new();
        assert!(view.push_live(record(1, 1)));
        assert!(!view.push_live(record(1, 1)));

        view.begin_delete(2);
        assert!(!view.push_live(record(2, 2)));
        assert_eq!(keys(view.live()), vec![1]);
    }

    #[test]
    fn test_push_live_drops_keys_already_in_history() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(2, 2), record(1, 1)]);

        assert!(!view.push_live(record(1, 1)));
        assert!(view.push_live(record(3, 3)));
        assert_eq!(keys(view.live()), vec![3]);
        assert_eq!(keys(&view.records()), vec![3, 2, 1]);
    }

    #[test]
    fn test_expired_tombstone_allows_record() {
        let mut view = DashboardView::with_tombstone_ttl(Duration::ZERO);
        view.begin_delete(2);

        assert!(view.push_live(record(2, 2)));
    }

    #[test]
    fn test_selection_follows_displayed_records() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1), record(2, 2)]);
        view.select(Some(2));
        assert_eq!(view.selected().map(|r| r.key), Some(2));

        view.apply_search(SearchResponse::found(1, vec![record(1, 1)]));
        assert!(view.selected().is_none());

        view.clear_search();
        assert_eq!(view.selected().map(|r| r.key), Some(2));
    }

    #[test]
    fn test_delete_then_complete() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1), record(2, 2)]);
        view.push_live(record(3, 3));
        view.select(Some(2));

        let snapshot = view.begin_delete(2);
        assert_eq!(keys(&view.records()), vec![3, 1]);

        view.complete_delete(&snapshot);
        assert!(view.selected().is_none());
        assert!(view.tombstones().contains(2));
    }

    #[test]
    fn test_failed_delete_restores_exactly() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1), record(2, 2)]);
        view.push_live(record(3, 3));
        view.apply_search(SearchResponse::found(1, vec![record(2, 2)]));
        let before = (
            view.history().to_vec(),
            view.live().to_vec(),
            view.search_results().to_vec(),
        );

        let snapshot = view.begin_delete(2);
        assert!(view.search_results().is_empty());
        view.rollback_delete(snapshot);

        assert_eq!(view.history(), &before.0[..]);
        assert_eq!(view.live(), &before.1[..]);
        assert_eq!(view.search_results(), &before.2[..]);
        assert!(!view.tombstones().contains(2));
    }

    #[test]
    fn test_rollback_keeps_other_pending_delete_hidden() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1), record(2, 2)]);

        let first = view.begin_delete(1);
        let _second = view.begin_delete(2);
        view.rollback_delete(first);

        assert_eq!(keys(&view.records()), vec![1]);
        assert!(view.tombstones().contains(2));
    }

    #[test]
    fn test_search_outcomes() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1)]);

        assert_eq!(
            view.apply_search(SearchResponse::found(1, vec![record(1, 1)])),
            SearchOutcome::Results(1)
        );
        assert_eq!(
            view.apply_search(SearchResponse::found(0, vec![])),
            SearchOutcome::NoResults
        );
        assert!(view.search_results().is_empty());

        view.apply_search(SearchResponse::found(1, vec![record(1, 1)]));
        assert!(matches!(
            view.apply_search(SearchResponse::failed("Search failed")),
            SearchOutcome::Failed(_)
        ));
        assert!(view.search_results().is_empty());
        assert_eq!(keys(&view.records()), vec![1]);
    }

    #[test]
    fn test_clear_all_empties_everything() {
        let mut view = DashboardView::new();
        view.set_history(vec![record(1, 1)]);
        view.push_live(record(2, 2));
        view.apply_search(SearchResponse::found(1, vec![record(1, 1)]));
        view.select(Some(1));

        view.clear_all();
        assert!(view.records().is_empty());
        assert!(view.selected().is_none());
    }
}
