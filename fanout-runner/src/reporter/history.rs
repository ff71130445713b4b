// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run history: every recorded attempt for every test in one execution scope.
//!
//! One store instance is one isolation scope. Forked workers each get a fresh
//! store, because frameworks under a fork may reuse a generic suite name and
//! their histories must not merge. A non-forked run uses a single store for
//! all execution threads, so concurrent reruns of one test land in one
//! history. [`ReportConfig`](crate::reporter::ReportConfig) makes that choice
//! once, at reporter construction time.

use crate::reporter::events::{ReportEntry, TestIdentity};
use indexmap::IndexMap;
use std::sync::Mutex;

/// Maps each test identity to the ordered list of its recorded attempts.
///
/// Appends from concurrent threads are serialized by an internal lock; the
/// per-test list is only ever appended to, in the order the append calls
/// arrived. Entries are never removed.
#[derive(Debug, Default)]
pub struct RunHistoryStore {
    // suite name -> test name -> attempts in attempt order.
    map: Mutex<IndexMap<String, IndexMap<String, Vec<ReportEntry>>>>,
}

impl RunHistoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one attempt to the history of the test named by the entry's
    /// identity, creating the nested maps on first use.
    pub fn append(&self, entry: ReportEntry) {
        let mut map = self.map.lock().expect("run history lock poisoned");
        map.entry(entry.identity.suite.clone())
            .or_default()
            .entry(entry.identity.test_name.clone())
            .or_default()
            .push(entry);
    }

    /// Returns a snapshot of the attempts recorded for `identity`, first
    /// attempt first. Empty if nothing was recorded.
    pub fn history_for(&self, identity: &TestIdentity) -> Vec<ReportEntry> {
        let map = self.map.lock().expect("run history lock poisoned");
        map.get(&identity.suite)
            .and_then(|suite| suite.get(&identity.test_name))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of attempts recorded for `identity`.
    ///
    /// The rerun scheduler compares this against the configured rerun limit
    /// to decide whether a failing test gets another attempt.
    pub fn attempt_count(&self, identity: &TestIdentity) -> usize {
        let map = self.map.lock().expect("run history lock poisoned");
        map.get(&identity.suite)
            .and_then(|suite| suite.get(&identity.test_name))
            .map_or(0, Vec::len)
    }

    /// Returns the suite names with recorded history, in first-observation
    /// order.
    pub fn suites(&self) -> Vec<String> {
        let map = self.map.lock().expect("run history lock poisoned");
        map.keys().cloned().collect()
    }

    /// Returns a snapshot of all histories recorded for one suite, keyed by
    /// test name in first-observation order.
    pub fn suite_history(&self, suite: &str) -> IndexMap<String, Vec<ReportEntry>> {
        let map = self.map.lock().expect("run history lock poisoned");
        map.get(suite).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reporter::events::{AttemptOutcome, FailureDetail};
    use chrono::Utc;
    use std::{sync::Arc, time::Duration};

    fn entry_with_message(identity: &TestIdentity, message: String) -> ReportEntry {
        ReportEntry::new(
            identity.clone(),
            AttemptOutcome::Failed,
            Utc::now().fixed_offset(),
            Duration::from_millis(5),
        )
        .with_failure(FailureDetail::new(Some(message), None))
    }

    #[test]
    fn append_and_lookup() {
        let store = RunHistoryStore::new();
        let identity = TestIdentity::new("ClassA", "methodX");

        assert_eq!(store.attempt_count(&identity), 0);
        assert!(store.history_for(&identity).is_empty());

        for outcome in [
            AttemptOutcome::Failed,
            AttemptOutcome::Failed,
            AttemptOutcome::Passed,
        ] {
            store.append(ReportEntry::new(
                identity.clone(),
                outcome,
                Utc::now().fixed_offset(),
                Duration::from_millis(5),
            ));
        }

        assert_eq!(store.attempt_count(&identity), 3);
        let history = store.history_for(&identity);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].outcome, AttemptOutcome::Failed);
        assert_eq!(history[1].outcome, AttemptOutcome::Failed);
        assert_eq!(history[2].outcome, AttemptOutcome::Passed);
    }

    #[test]
    fn concurrent_appends_preserve_per_caller_order() {
        const THREADS: usize = 8;
        const APPENDS: usize = 50;

        let store = Arc::new(RunHistoryStore::new());
        let identity = TestIdentity::new("TestSuite", "flaky");

        let handles: Vec<_> = (0..THREADS)
            .map(|thread| {
                let store = Arc::clone(&store);
                let identity = identity.clone();
                std::thread::spawn(move || {
                    for i in 0..APPENDS {
                        store.append(entry_with_message(&identity, format!("{thread}:{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = store.history_for(&identity);
        assert_eq!(history.len(), THREADS * APPENDS);

        // Each thread's entries must appear exactly once, in that thread's
        // append order.
        for thread in 0..THREADS {
            let prefix = format!("{thread}:");
            let seen: Vec<usize> = history
                .iter()
                .filter_map(|entry| {
                    let message = entry.failure.as_ref()?.message.as_deref()?;
                    let index = message.strip_prefix(&prefix)?;
                    index.parse().ok()
                })
                .collect();
            let expected: Vec<usize> = (0..APPENDS).collect();
            assert_eq!(seen, expected, "thread {thread} entries out of order");
        }
    }

    #[test]
    fn separate_stores_never_share_history() {
        // The same textual identity in two stores stays isolated; this is
        // what keeps forks that reuse a generic suite name apart.
        let fork_one = RunHistoryStore::new();
        let fork_two = RunHistoryStore::new();
        let identity = TestIdentity::new("TestSuite", "it_works");

        fork_one.append(ReportEntry::new(
            identity.clone(),
            AttemptOutcome::Passed,
            Utc::now().fixed_offset(),
            Duration::from_millis(1),
        ));

        assert_eq!(fork_one.attempt_count(&identity), 1);
        assert_eq!(fork_two.attempt_count(&identity), 0);
        assert!(fork_two.history_for(&identity).is_empty());
    }

    #[test]
    fn suite_snapshots() {
        let store = RunHistoryStore::new();
        store.append(ReportEntry::new(
            TestIdentity::new("SuiteB", "b1"),
            AttemptOutcome::Passed,
            Utc::now().fixed_offset(),
            Duration::from_millis(1),
        ));
        store.append(ReportEntry::new(
            TestIdentity::new("SuiteA", "a1"),
            AttemptOutcome::Failed,
            Utc::now().fixed_offset(),
            Duration::from_millis(1),
        ));
        store.append(ReportEntry::new(
            TestIdentity::new("SuiteB", "b2"),
            AttemptOutcome::Skipped,
            Utc::now().fixed_offset(),
            Duration::from_millis(1),
        ));

        // First-observation order, not alphabetical.
        assert_eq!(store.suites(), vec!["SuiteB", "SuiteA"]);
        let suite_b = store.suite_history("SuiteB");
        assert_eq!(
            suite_b.keys().cloned().collect::<Vec<_>>(),
            vec!["b1", "b2"]
        );
        assert!(store.suite_history("SuiteC").is_empty());
    }
}
