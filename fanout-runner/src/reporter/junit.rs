// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The structured reporter: machine-readable JUnit XML, one report per suite,
//! with every rerun attempt correlated into its test case.
//!
//! Despite producing "stateless-looking" XML files, this reporter is not
//! history-free: it records each attempt into the run-history store it was
//! constructed with, and renders the full attempt history when a suite
//! completes.

use crate::{
    errors::WriteReportError,
    reporter::{
        events::{AttemptOutcome, AttemptsSummary, FailureDetail, ReportEntry, TestIdentity},
        history::RunHistoryStore,
    },
};
use camino::Utf8PathBuf;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestRerun, TestSuite};
use std::{fs::File, sync::Arc, time::Duration};

/// Reporter producing the machine-readable JUnit XML report.
///
/// Constructed via
/// [`ReportConfig::structured_reporter`](crate::reporter::ReportConfig::structured_reporter),
/// which decides whether the run-history store backing it is isolated to one
/// fork or shared across the process.
#[derive(Debug)]
pub struct StructuredReporter {
    reports_dir: Utf8PathBuf,
    report_name_suffix: Option<String>,
    trim_stack_trace: bool,
    history: Arc<RunHistoryStore>,
}

impl StructuredReporter {
    pub(crate) fn new(
        reports_dir: Utf8PathBuf,
        report_name_suffix: Option<String>,
        trim_stack_trace: bool,
        history: Arc<RunHistoryStore>,
    ) -> Self {
        Self {
            reports_dir,
            report_name_suffix,
            trim_stack_trace,
            history,
        }
    }

    /// Returns the run-history store this reporter records into.
    pub fn history(&self) -> &Arc<RunHistoryStore> {
        &self.history
    }

    /// Records one attempt into the run history.
    pub fn record_attempt(&self, entry: ReportEntry) {
        self.history.append(entry);
    }

    /// Returns the number of attempts recorded for `identity`, for the rerun
    /// scheduler to compare against the rerun limit.
    pub fn attempt_count(&self, identity: &TestIdentity) -> usize {
        self.history.attempt_count(identity)
    }

    /// Writes the JUnit XML report for one suite from its recorded history.
    ///
    /// The last attempt of each test decides the test-case status; earlier
    /// attempts become rerun elements (flaky ones when the test eventually
    /// passed). Returns the path written.
    pub fn write_suite_report(&self, suite: &str) -> Result<Utf8PathBuf, WriteReportError> {
        let histories = self.history.suite_history(suite);

        let mut test_suite = TestSuite::new(suite);
        let mut suite_start = None;
        let mut suite_elapsed = Duration::ZERO;

        for (test_name, entries) in &histories {
            let Some(summary) = AttemptsSummary::new(entries) else {
                continue;
            };
            suite_start = suite_start.or_else(|| entries.first().map(|e| e.start_time));
            suite_elapsed += entries.iter().map(|e| e.elapsed).sum::<Duration>();

            let (mut status, main, reruns) = match summary {
                AttemptsSummary::Success { single } => {
                    (TestCaseStatus::success(), single, &[][..])
                }
                AttemptsSummary::Flaky { last, prior } => {
                    (TestCaseStatus::success(), last, prior)
                }
                AttemptsSummary::Failure { first, retries, .. } => {
                    let (kind, ty) = non_success_kind_and_type(first.outcome);
                    let mut status = TestCaseStatus::non_success(kind);
                    status.set_type(ty);
                    if let Some(failure) = &first.failure {
                        self.set_failure_props(&mut status, suite, failure);
                    }
                    (status, first, retries)
                }
                AttemptsSummary::Skipped { last } => {
                    let mut status = TestCaseStatus::skipped();
                    if let Some(message) = last.failure.as_ref().and_then(|f| f.message.as_deref())
                    {
                        status.set_message(message);
                    }
                    (status, last, &[][..])
                }
            };

            for rerun in reruns {
                let (kind, ty) = non_success_kind_and_type(rerun.outcome);
                let mut test_rerun = TestRerun::new(kind);
                test_rerun
                    .set_timestamp(rerun.start_time)
                    .set_time(rerun.elapsed)
                    .set_type(ty);
                if let Some(failure) = &rerun.failure {
                    if let Some(message) = failure.message.as_deref() {
                        test_rerun.set_message(message);
                    }
                    if let Some(stack_trace) = failure.stack_trace.as_deref() {
                        test_rerun.set_stack_trace(self.render_stack_trace(suite, stack_trace));
                    }
                }
                if let Some(output) = &rerun.output {
                    test_rerun.set_system_out(output.as_str());
                }
                status.add_rerun(test_rerun);
            }

            let mut test_case = TestCase::new(test_name.as_str(), status);
            test_case
                .set_classname(suite)
                .set_timestamp(main.start_time)
                .set_time(main.elapsed);
            if let Some(output) = &main.output {
                test_case.set_system_out(output.as_str());
            }
            test_suite.add_test_case(test_case);
        }

        let mut report = Report::new(suite);
        if let Some(start) = suite_start {
            report.set_timestamp(start);
        }
        report.set_time(suite_elapsed).add_test_suite(test_suite);

        let path = self.report_path(suite);
        let file = File::create(&path).map_err(|error| WriteReportError::Fs {
            file: path.clone(),
            error,
        })?;
        report.serialize(file).map_err(|error| WriteReportError::Junit {
            file: path.clone(),
            error,
        })?;
        tracing::debug!("wrote structured report for {suite} to {path}");
        Ok(path)
    }

    /// Writes one report per suite with recorded history, in observation
    /// order. Returns the paths written.
    pub fn write_all_reports(&self) -> Result<Vec<Utf8PathBuf>, WriteReportError> {
        self.history
            .suites()
            .iter()
            .map(|suite| self.write_suite_report(suite))
            .collect()
    }

    fn set_failure_props(&self, status: &mut TestCaseStatus, suite: &str, failure: &FailureDetail) {
        if let Some(message) = failure.message.as_deref() {
            status.set_message(message);
        }
        if let Some(stack_trace) = failure.stack_trace.as_deref() {
            status.set_description(self.render_stack_trace(suite, stack_trace));
        }
    }

    fn render_stack_trace(&self, suite: &str, stack_trace: &str) -> String {
        if self.trim_stack_trace {
            trim_stack_trace(stack_trace, suite)
        } else {
            stack_trace.to_owned()
        }
    }

    fn report_path(&self, suite: &str) -> Utf8PathBuf {
        let file_name = match &self.report_name_suffix {
            Some(suffix) => format!("TEST-{suite}-{suffix}.xml"),
            None => format!("TEST-{suite}.xml"),
        };
        self.reports_dir.join(file_name)
    }
}

fn non_success_kind_and_type(outcome: AttemptOutcome) -> (NonSuccessKind, &'static str) {
    match outcome {
        AttemptOutcome::Errored => (NonSuccessKind::Error, "execution error"),
        // A skipped attempt only shows up here as a prior attempt of a rerun.
        AttemptOutcome::Failed | AttemptOutcome::Skipped | AttemptOutcome::Passed => {
            (NonSuccessKind::Failure, "test failure")
        }
    }
}

/// Drops frames below the last one that mentions the suite, keeping the
/// failure message and the frames inside the test itself.
fn trim_stack_trace(stack_trace: &str, suite: &str) -> String {
    let last_suite_line = stack_trace
        .lines()
        .collect::<Vec<_>>()
        .iter()
        .rposition(|line| line.contains(suite));
    match last_suite_line {
        Some(index) => {
            let mut lines: Vec<&str> = stack_trace.lines().collect();
            lines.truncate(index + 1);
            lines.join("\n")
        }
        None => stack_trace.to_owned(),
    }
}
