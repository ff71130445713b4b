// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run statistics: process-wide pass/fail counters plus the per-test runtime
//! and outcome records consulted by statistics-based run orders.

use crate::{
    errors::WriteReportError,
    reporter::{
        config::RunOrder,
        events::{AttemptOutcome, AttemptsSummary, ReportEntry, TestIdentity},
    },
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counters for a whole run.
///
/// A test with reruns counts once, by its final outcome; `attempts` counts
/// every execution.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of attempts executed, including reruns.
    pub attempts: usize,

    /// The number of logical tests that finished.
    pub tests: usize,

    /// The number of tests that passed. Includes `flaky`.
    pub passed: usize,

    /// The number of tests that passed only on a rerun.
    pub flaky: usize,

    /// The number of tests whose final attempt failed an assertion.
    pub failed: usize,

    /// The number of tests whose final attempt errored.
    pub errored: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if no test failed or errored.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Per-test record carried across runs through the statistics file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TestRunStat {
    /// How many attempts the test took in the recorded run.
    pub runs: u32,

    /// Total runtime across those attempts, in milliseconds.
    pub total_elapsed_ms: u64,

    /// The final outcome of the recorded run.
    pub last_outcome: Option<AttemptOutcome>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StatisticsFile {
    tests: IndexMap<String, TestRunStat>,
}

#[derive(Debug, Default)]
struct StatsInner {
    stats: RunStats,
    current: IndexMap<String, TestRunStat>,
}

/// Aggregates pass/fail/skip counts and per-test runtimes for the whole run.
///
/// There is exactly one instance per run regardless of fork mode, lazily
/// created through
/// [`ReportConfig::statistics_reporter`](crate::reporter::ReportConfig::statistics_reporter).
/// Statistics from the previous run are loaded from the statistics file on
/// construction and consulted by [`prioritize`](Self::prioritize);
/// [`finish`](Self::finish) rewrites the file from this run's records.
#[derive(Debug)]
pub struct StatisticsReporter {
    path: Utf8PathBuf,
    previous: IndexMap<String, TestRunStat>,
    inner: Mutex<StatsInner>,
}

impl StatisticsReporter {
    pub(crate) fn new(path: Utf8PathBuf) -> Self {
        let previous = match std::fs::File::open(&path) {
            Ok(file) => match serde_json::from_reader::<_, StatisticsFile>(file) {
                Ok(parsed) => parsed.tests,
                Err(error) => {
                    tracing::warn!("ignoring unparseable statistics file `{path}`: {error}");
                    IndexMap::new()
                }
            },
            Err(error) => {
                tracing::debug!("no prior statistics at `{path}`: {error}");
                IndexMap::new()
            }
        };
        Self {
            path,
            previous,
            inner: Mutex::new(StatsInner::default()),
        }
    }

    /// Records the completed attempt history of one test.
    ///
    /// Call once per logical test, after its last attempt, with the attempts
    /// in order.
    pub fn record_completed(&self, entries: &[ReportEntry]) {
        let Some(summary) = AttemptsSummary::new(entries) else {
            return;
        };
        let identity = &summary.last_entry().identity;

        let mut inner = self.inner.lock().expect("statistics lock poisoned");
        inner.stats.attempts += entries.len();
        inner.stats.tests += 1;
        match summary {
            AttemptsSummary::Success { .. } => inner.stats.passed += 1,
            AttemptsSummary::Flaky { .. } => {
                inner.stats.passed += 1;
                inner.stats.flaky += 1;
            }
            AttemptsSummary::Failure { last, .. } => {
                if last.outcome == AttemptOutcome::Errored {
                    inner.stats.errored += 1;
                } else {
                    inner.stats.failed += 1;
                }
            }
            AttemptsSummary::Skipped { .. } => inner.stats.skipped += 1,
        }

        let total_elapsed_ms = entries
            .iter()
            .map(|entry| u64::try_from(entry.elapsed.as_millis()).unwrap_or(u64::MAX))
            .sum();
        inner.current.insert(
            identity.to_string(),
            TestRunStat {
                runs: entries.len() as u32,
                total_elapsed_ms,
                last_outcome: entries.last().map(|entry| entry.outcome),
            },
        );
    }

    /// Returns a snapshot of the run counters.
    pub fn run_stats(&self) -> RunStats {
        self.inner.lock().expect("statistics lock poisoned").stats
    }

    /// Reorders candidates in place per the run order, using the previous
    /// run's records.
    ///
    /// `FailedFirst` moves previously failing tests to the front, keeping
    /// relative order otherwise; `Balanced` runs the slowest tests first.
    /// Orders that do not consult statistics leave the slice unchanged.
    pub fn prioritize(&self, candidates: &mut [TestIdentity], order: RunOrder) {
        match order {
            RunOrder::FailedFirst => {
                candidates.sort_by_key(|identity| {
                    let failed = self
                        .previous
                        .get(&identity.to_string())
                        .and_then(|stat| stat.last_outcome)
                        .is_some_and(AttemptOutcome::is_fail_like);
                    !failed
                });
            }
            RunOrder::Balanced => {
                candidates.sort_by_key(|identity| {
                    let elapsed = self
                        .previous
                        .get(&identity.to_string())
                        .map_or(0, |stat| stat.total_elapsed_ms);
                    std::cmp::Reverse(elapsed)
                });
            }
            RunOrder::Alphabetical | RunOrder::Random => {}
        }
    }

    /// Atomically rewrites the statistics file from this run's records.
    pub fn finish(&self) -> Result<(), WriteReportError> {
        let summary = {
            let inner = self.inner.lock().expect("statistics lock poisoned");
            StatisticsFile {
                tests: inner.current.clone(),
            }
        };
        // Serialization happens outside the lock; the write is atomic so a
        // concurrent reader never sees a torn file.
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|file| serde_json::to_writer_pretty(file, &summary))
            .map_err(|error| match error {
                atomicwrites::Error::Internal(error) => WriteReportError::Fs {
                    file: self.path.clone(),
                    error,
                },
                atomicwrites::Error::User(error) => WriteReportError::Json {
                    file: self.path.clone(),
                    error,
                },
            })?;
        tracing::debug!("wrote run statistics to {}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn attempt(identity: &TestIdentity, outcome: AttemptOutcome, millis: u64) -> ReportEntry {
        ReportEntry::new(
            identity.clone(),
            outcome,
            Utc::now().fixed_offset(),
            Duration::from_millis(millis),
        )
    }

    #[test]
    fn counters_track_final_outcomes() {
        let dir = Utf8TempDir::new().unwrap();
        let reporter = StatisticsReporter::new(dir.path().join("stats.json"));

        let flaky = TestIdentity::new("SuiteA", "flaky");
        reporter.record_completed(&[
            attempt(&flaky, AttemptOutcome::Failed, 10),
            attempt(&flaky, AttemptOutcome::Failed, 10),
            attempt(&flaky, AttemptOutcome::Passed, 10),
        ]);

        let failed = TestIdentity::new("SuiteA", "broken");
        reporter.record_completed(&[
            attempt(&failed, AttemptOutcome::Failed, 5),
            attempt(&failed, AttemptOutcome::Errored, 5),
        ]);

        let skipped = TestIdentity::new("SuiteA", "ignored");
        reporter.record_completed(&[attempt(&skipped, AttemptOutcome::Skipped, 0)]);

        let stats = reporter.run_stats();
        assert_eq!(
            stats,
            RunStats {
                attempts: 6,
                tests: 3,
                passed: 1,
                flaky: 1,
                failed: 0,
                errored: 1,
                skipped: 1,
            }
        );
        assert!(!stats.is_success());
    }

    #[test]
    fn finish_roundtrips_through_the_statistics_file() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("stats.json");

        let reporter = StatisticsReporter::new(path.clone());
        let identity = TestIdentity::new("SuiteA", "slow");
        reporter.record_completed(&[attempt(&identity, AttemptOutcome::Passed, 1500)]);
        reporter.finish().unwrap();

        // A new reporter sees the previous run's record.
        let reloaded = StatisticsReporter::new(path);
        assert_eq!(
            reloaded.previous.get("SuiteA::slow"),
            Some(&TestRunStat {
                runs: 1,
                total_elapsed_ms: 1500,
                last_outcome: Some(AttemptOutcome::Passed),
            })
        );
    }

    #[test]
    fn failed_first_moves_failures_to_the_front() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("stats.json");

        let reporter = StatisticsReporter::new(path.clone());
        let passing = TestIdentity::new("SuiteA", "passing");
        let failing = TestIdentity::new("SuiteA", "failing");
        reporter.record_completed(&[attempt(&passing, AttemptOutcome::Passed, 10)]);
        reporter.record_completed(&[attempt(&failing, AttemptOutcome::Failed, 10)]);
        reporter.finish().unwrap();

        let reloaded = StatisticsReporter::new(path);
        let mut order = vec![passing.clone(), failing.clone()];
        reloaded.prioritize(&mut order, RunOrder::FailedFirst);
        assert_eq!(order, vec![failing, passing]);
    }

    #[test]
    fn balanced_runs_slowest_first() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("stats.json");

        let reporter = StatisticsReporter::new(path.clone());
        let quick = TestIdentity::new("SuiteA", "quick");
        let slow = TestIdentity::new("SuiteA", "slow");
        reporter.record_completed(&[attempt(&quick, AttemptOutcome::Passed, 5)]);
        reporter.record_completed(&[attempt(&slow, AttemptOutcome::Passed, 5000)]);
        reporter.finish().unwrap();

        let reloaded = StatisticsReporter::new(path);
        let mut order = vec![quick.clone(), slow.clone()];
        reloaded.prioritize(&mut order, RunOrder::Balanced);
        assert_eq!(order, vec![slow.clone(), quick.clone()]);

        // Non-statistics orders leave the slice alone.
        let mut order = vec![quick.clone(), slow.clone()];
        reloaded.prioritize(&mut order, RunOrder::Alphabetical);
        assert_eq!(order, vec![quick, slow]);
    }

    #[test]
    fn unparseable_statistics_file_starts_empty() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "not json").unwrap();

        let reporter = StatisticsReporter::new(path);
        assert!(reporter.previous.is_empty());
    }
}
