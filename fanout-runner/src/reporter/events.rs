// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attempt outcomes recorded by reporters.
//!
//! A [`ReportEntry`] describes one attempt at running one test. Entries are
//! immutable once constructed; reruns of the same test produce additional
//! entries rather than modifying earlier ones.

use chrono::{DateTime, FixedOffset};
use debug_ignore::DebugIgnore;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The identity of one logical test: the qualified suite name plus the test
/// name within it.
///
/// Equality is exact string match. Two attempts with equal identities are
/// attempts of the same test within one run-history scope, whatever process
/// or thread observed them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TestIdentity {
    /// The qualified name of the suite (or class) the test belongs to.
    pub suite: String,

    /// The name of the test within the suite.
    pub test_name: String,
}

impl TestIdentity {
    /// Creates a new `TestIdentity`.
    pub fn new(suite: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            test_name: test_name.into(),
        }
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.suite, self.test_name)
    }
}

/// The outcome of a single attempt at running a test.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    /// The attempt passed.
    Passed,

    /// The attempt failed an assertion.
    Failed,

    /// The attempt aborted for a reason other than an assertion, e.g. the
    /// harness could not execute it.
    Errored,

    /// The attempt was skipped.
    Skipped,
}

impl AttemptOutcome {
    /// Returns true if the outcome counts as a success.
    pub fn is_success(self) -> bool {
        matches!(self, AttemptOutcome::Passed)
    }

    /// Returns true if the outcome is a failure or an execution error.
    pub fn is_fail_like(self) -> bool {
        matches!(self, AttemptOutcome::Failed | AttemptOutcome::Errored)
    }

    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            AttemptOutcome::Passed => "passed",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Errored => "errored",
            AttemptOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// Failure information attached to a failed or errored attempt.
#[derive(Clone, Debug)]
pub struct FailureDetail {
    /// The failure message, if one was produced.
    pub message: Option<String>,

    /// The stack trace, if one was captured. Stored untrimmed; trimming is
    /// applied at report-write time.
    pub stack_trace: Option<String>,
}

impl FailureDetail {
    /// Creates a new `FailureDetail`.
    pub fn new(message: Option<String>, stack_trace: Option<String>) -> Self {
        Self {
            message,
            stack_trace,
        }
    }
}

/// One recorded attempt at running a test.
#[derive(Clone, Debug)]
pub struct ReportEntry {
    /// The test this attempt belongs to.
    pub identity: TestIdentity,

    /// The outcome of the attempt.
    pub outcome: AttemptOutcome,

    /// The time at which the attempt started, including the offset from UTC.
    pub start_time: DateTime<FixedOffset>,

    /// The time the attempt took to run.
    pub elapsed: Duration,

    /// Failure information, present for failed and errored attempts.
    pub failure: Option<FailureDetail>,

    /// Captured output for this attempt, if output capture was enabled.
    pub output: Option<DebugIgnore<String>>,
}

impl ReportEntry {
    /// Creates a new `ReportEntry` with no failure detail and no captured
    /// output.
    pub fn new(
        identity: TestIdentity,
        outcome: AttemptOutcome,
        start_time: DateTime<FixedOffset>,
        elapsed: Duration,
    ) -> Self {
        Self {
            identity,
            outcome,
            start_time,
            elapsed,
            failure: None,
            output: None,
        }
    }

    /// Attaches failure detail to the entry.
    pub fn with_failure(mut self, failure: FailureDetail) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Attaches captured output to the entry.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(DebugIgnore(output.into()));
        self
    }
}

/// A description of all recorded attempts for one test.
///
/// Obtained from [`AttemptsSummary::new`] over an attempt-ordered slice, as
/// returned by [`RunHistoryStore::history_for`](crate::reporter::RunHistoryStore::history_for).
#[derive(Copy, Clone, Debug)]
pub enum AttemptsSummary<'a> {
    /// The test was run once and passed.
    Success {
        /// The single, passing attempt.
        single: &'a ReportEntry,
    },

    /// The test was run more than once and the final attempt passed.
    Flaky {
        /// The last, passing attempt.
        last: &'a ReportEntry,

        /// Prior attempts, none of which passed.
        prior: &'a [ReportEntry],
    },

    /// The test was run once or more and never passed.
    Failure {
        /// The first, failing attempt.
        first: &'a ReportEntry,

        /// The last, failing attempt. Same as `first` when there were no
        /// reruns.
        last: &'a ReportEntry,

        /// Reruns after the first attempt. May be empty.
        retries: &'a [ReportEntry],
    },

    /// The last attempt was skipped.
    Skipped {
        /// The last, skipped attempt.
        last: &'a ReportEntry,
    },
}

impl<'a> AttemptsSummary<'a> {
    /// Classifies a slice of attempts in attempt order. Returns `None` for an
    /// empty slice.
    pub fn new(entries: &'a [ReportEntry]) -> Option<Self> {
        let last = entries.last()?;
        let summary = match last.outcome {
            AttemptOutcome::Passed => {
                if entries.len() > 1 {
                    AttemptsSummary::Flaky {
                        last,
                        prior: &entries[..entries.len() - 1],
                    }
                } else {
                    AttemptsSummary::Success { single: last }
                }
            }
            AttemptOutcome::Skipped => AttemptsSummary::Skipped { last },
            AttemptOutcome::Failed | AttemptOutcome::Errored => AttemptsSummary::Failure {
                first: entries.first()?,
                last,
                retries: &entries[1..],
            },
        };
        Some(summary)
    }

    /// Returns the attempt that decides the final outcome.
    pub fn last_entry(&self) -> &'a ReportEntry {
        match self {
            AttemptsSummary::Success { single: last }
            | AttemptsSummary::Flaky { last, .. }
            | AttemptsSummary::Failure { last, .. }
            | AttemptsSummary::Skipped { last } => last,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    pub(super) fn entry(outcome: AttemptOutcome) -> ReportEntry {
        ReportEntry::new(
            TestIdentity::new("app::checkout", "totals_add_up"),
            outcome,
            Utc::now().fixed_offset(),
            Duration::from_millis(12),
        )
    }

    #[test]
    fn summary_classification() {
        let attempts = vec![entry(AttemptOutcome::Passed)];
        assert!(matches!(
            AttemptsSummary::new(&attempts),
            Some(AttemptsSummary::Success { .. })
        ));

        let attempts = vec![
            entry(AttemptOutcome::Failed),
            entry(AttemptOutcome::Passed),
        ];
        let summary = AttemptsSummary::new(&attempts).unwrap();
        match summary {
            AttemptsSummary::Flaky { last, prior } => {
                assert_eq!(last.outcome, AttemptOutcome::Passed);
                assert_eq!(prior.len(), 1);
            }
            other => panic!("expected flaky, got {other:?}"),
        }

        let attempts = vec![
            entry(AttemptOutcome::Failed),
            entry(AttemptOutcome::Errored),
        ];
        let summary = AttemptsSummary::new(&attempts).unwrap();
        match summary {
            AttemptsSummary::Failure {
                first,
                last,
                retries,
            } => {
                assert_eq!(first.outcome, AttemptOutcome::Failed);
                assert_eq!(last.outcome, AttemptOutcome::Errored);
                assert_eq!(retries.len(), 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }

        assert!(AttemptsSummary::new(&[]).is_none());
    }

    #[test]
    fn identity_display() {
        let identity = TestIdentity::new("app::checkout", "totals_add_up");
        assert_eq!(identity.to_string(), "app::checkout::totals_add_up");
    }
}
