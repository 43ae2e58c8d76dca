use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::SourceError;
use crate::source::{SourceRecord, SuggestionSource};
use crate::suggestion::Suggestion;

pub const DEFAULT_LIMIT: usize = 10;

/// Counts describing one merge into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub before: usize,
    pub after: usize,
    pub added: usize,
    pub skipped: usize,
}

/// Ranked, append-only suggestion set shared between one refresher and any
/// number of readers.
///
/// Readers work on an immutable snapshot and never block. A refresh builds
/// the merged set next to the published one and swaps it in atomically, so a
/// query observes either the whole merge or none of it. Refreshes are
/// serialized among themselves by `writer`.
pub struct SuggestionStore {
    snapshot: ArcSwap<BTreeSet<Suggestion>>,
    writer: Mutex<()>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(BTreeSet::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Merges `records` into the store. Records already present are left as
    /// they are and nothing is ever removed; incomplete records are skipped.
    pub fn refresh<I>(&self, records: I) -> RefreshReport
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        let _writer = self.writer.lock();
        let current = self.snapshot.load_full();
        let before = current.len();

        let mut next: Option<BTreeSet<Suggestion>> = None;
        let mut skipped = 0;
        for record in records {
            let Some(suggestion) = record.into_suggestion() else {
                skipped += 1;
                continue;
            };
            if current.contains(&suggestion) {
                continue;
            }
            next.get_or_insert_with(|| (*current).clone())
                .insert(suggestion);
        }

        let after = match next {
            Some(next) => {
                let after = next.len();
                self.snapshot.store(Arc::new(next));
                after
            }
            None => before,
        };

        let report = RefreshReport {
            before,
            after,
            added: after - before,
            skipped,
        };
        debug!(
            before = report.before,
            after = report.after,
            skipped = report.skipped,
            "suggestion collection merged"
        );
        report
    }

    /// Loads a batch from `source` and merges it. The source is read before
    /// the writer lock is taken; on failure the store is left untouched.
    pub fn refresh_from(&self, source: &dyn SuggestionSource) -> Result<RefreshReport, SourceError> {
        let records = source.load()?;
        Ok(self.refresh(records))
    }

    /// Returns up to `limit` suggestions containing `substring`, in rank order.
    pub fn query(&self, substring: &str, limit: usize) -> Vec<Suggestion> {
        let snapshot = self.snapshot.load();
        snapshot
            .iter()
            .filter(|suggestion| suggestion.matches(substring))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for SuggestionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store_with(records: &[(&str, i64)]) -> SuggestionStore {
        let store = SuggestionStore::new();
        store.refresh(
            records
                .iter()
                .map(|(text, cost)| SourceRecord::new(*text, *cost)),
        );
        store
    }

    fn texts(results: &[Suggestion]) -> Vec<&str> {
        results.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn empty_store_returns_nothing() {
        let store = SuggestionStore::new();
        assert!(store.is_empty());
        assert!(store.query("", DEFAULT_LIMIT).is_empty());
        assert!(store.query("cat", DEFAULT_LIMIT).is_empty());
    }

    #[test]
    fn empty_query_returns_descending_weight() {
        let store = store_with(&[("low", 1), ("high", 9), ("mid", 5), ("top", 12)]);
        let results = store.query("", DEFAULT_LIMIT);
        let weights: Vec<i64> = results.iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![12, 9, 5, 1]);
    }

    #[test]
    fn equal_weights_fall_back_to_text_order() {
        let store = store_with(&[("pear", 3), ("apple", 3), ("fig", 3)]);
        assert_eq!(texts(&store.query("", DEFAULT_LIMIT)), ["apple", "fig", "pear"]);
    }

    #[test]
    fn match_at_start_of_text_counts() {
        let store = store_with(&[("apple", 5)]);
        assert_eq!(texts(&store.query("app", DEFAULT_LIMIT)), ["apple"]);
    }

    #[test]
    fn limit_caps_result_count() {
        let records: Vec<(String, i64)> = (0..15).map(|i| (format!("item {i}"), i)).collect();
        let store = SuggestionStore::new();
        store.refresh(
            records
                .iter()
                .map(|(text, cost)| SourceRecord::new(text.clone(), *cost)),
        );

        let results = store.query("", DEFAULT_LIMIT);
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].weight, 14);
        assert_eq!(results[9].weight, 5);
        assert!(store.query("", 0).is_empty());
    }

    #[test]
    fn substring_filter_keeps_rank_order() {
        let store = store_with(&[("cat food", 3), ("category", 7), ("dog food", 1)]);
        let results = store.query("cat", DEFAULT_LIMIT);
        assert_eq!(
            results,
            vec![Suggestion::new("category", 7), Suggestion::new("cat food", 3)]
        );
    }

    #[test]
    fn identical_refresh_is_idempotent() {
        let records = [("cat food", 3), ("category", 7)];
        let store = store_with(&records);
        let first = store.query("", DEFAULT_LIMIT);

        let report = store.refresh(
            records
                .iter()
                .map(|(text, cost)| SourceRecord::new(*text, *cost)),
        );
        assert_eq!(report.added, 0);
        assert_eq!(report.before, report.after);
        assert_eq!(store.query("", DEFAULT_LIMIT), first);
    }

    #[test]
    fn refresh_never_evicts_absent_records() {
        let store = store_with(&[("cat food", 3), ("category", 7)]);
        let report = store.refresh([SourceRecord::new("dog food", 1)]);
        assert_eq!(report.before, 2);
        assert_eq!(report.after, 3);
        assert_eq!(
            texts(&store.query("", DEFAULT_LIMIT)),
            ["category", "cat food", "dog food"]
        );
    }

    #[test]
    fn same_text_with_new_weight_is_a_new_entry() {
        let store = store_with(&[("cat", 3)]);
        store.refresh([SourceRecord::new("cat", 8)]);
        let weights: Vec<i64> = store.query("cat", DEFAULT_LIMIT).iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![8, 3]);
    }

    #[test]
    fn incomplete_records_are_skipped() {
        let store = SuggestionStore::new();
        let report = store.refresh([
            SourceRecord::new("kept", 2),
            SourceRecord {
                cost: Some(4),
                suggestion: None,
            },
            SourceRecord {
                cost: None,
                suggestion: Some("no cost".to_string()),
            },
        ]);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.added, 1);
        assert_eq!(texts(&store.query("", DEFAULT_LIMIT)), ["kept"]);
    }

    struct FailingSource;

    impl SuggestionSource for FailingSource {
        fn load(&self) -> Result<Vec<SourceRecord>, SourceError> {
            Err(SourceError::NotAnArray {
                path: "broken.json".into(),
            })
        }

        fn describe(&self) -> String {
            "broken.json".to_string()
        }
    }

    #[test]
    fn failed_source_keeps_previous_data() {
        let store = store_with(&[("cat food", 3)]);
        let error = store.refresh_from(&FailingSource).unwrap_err();
        assert!(matches!(error, SourceError::NotAnArray { .. }));
        assert_eq!(texts(&store.query("", DEFAULT_LIMIT)), ["cat food"]);
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let store = store_with(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);
        let batch: Vec<SourceRecord> = (0..2_000)
            .map(|i| SourceRecord::new(format!("bulk {i}"), 100 + i))
            .collect();

        thread::scope(|scope| {
            let readers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let mut seen = Vec::new();
                        for _ in 0..200 {
                            seen.push(store.query("", usize::MAX).len());
                        }
                        seen
                    })
                })
                .collect();

            scope.spawn(|| store.refresh(batch));

            for reader in readers {
                for len in reader.join().unwrap() {
                    assert!(len == 5 || len == 2_005, "observed partial merge of {len}");
                }
            }
        });

        assert_eq!(store.len(), 2_005);
    }
}
