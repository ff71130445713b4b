// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The line-oriented file reporter: one text report per suite, in the
//! configured encoding.

use crate::{
    errors::WriteReportError,
    helpers::{FormattedDuration, plural},
    reporter::{
        config::ReportFormat,
        events::{AttemptOutcome, AttemptsSummary, ReportEntry},
    },
};
use camino::Utf8PathBuf;
use encoding_rs::Encoding;
use indexmap::IndexMap;
use std::{fmt::Write as _, fs::File, io::Write as _, time::Duration};

/// Per-suite tallies rendered into summary lines.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct SuiteCounts {
    pub(crate) tests: usize,
    pub(crate) failures: usize,
    pub(crate) errors: usize,
    pub(crate) skipped: usize,
    pub(crate) flaky: usize,
    pub(crate) elapsed: Duration,
}

impl SuiteCounts {
    /// Tallies entries of one suite, grouping attempts by test name so a
    /// rerun test counts once, by its final outcome.
    pub(crate) fn tally(entries: &[ReportEntry]) -> Self {
        let mut by_test: IndexMap<&str, Vec<ReportEntry>> = IndexMap::new();
        for entry in entries {
            by_test
                .entry(entry.identity.test_name.as_str())
                .or_default()
                .push(entry.clone());
        }

        let mut counts = SuiteCounts::default();
        for attempts in by_test.values() {
            let Some(summary) = AttemptsSummary::new(attempts) else {
                continue;
            };
            counts.tests += 1;
            counts.elapsed += attempts.iter().map(|e| e.elapsed).sum::<Duration>();
            match summary {
                AttemptsSummary::Success { .. } => {}
                AttemptsSummary::Flaky { .. } => counts.flaky += 1,
                AttemptsSummary::Failure { last, .. } => {
                    if last.outcome == AttemptOutcome::Errored {
                        counts.errors += 1;
                    } else {
                        counts.failures += 1;
                    }
                }
                AttemptsSummary::Skipped { .. } => counts.skipped += 1,
            }
        }
        counts
    }

    pub(crate) fn summary_line(&self) -> String {
        format!(
            "Tests run: {}, Failures: {}, Errors: {}, Skipped: {}, Flaky: {} -- in {}",
            self.tests,
            self.failures,
            self.errors,
            self.skipped,
            self.flaky,
            FormattedDuration(self.elapsed),
        )
    }
}

/// Reporter writing one plain-text file per completed suite.
///
/// Only constructed for the line-oriented formats; `Concise` renders failing
/// attempts, `Verbose` renders every attempt.
#[derive(Debug)]
pub struct FileReporter {
    reports_dir: Utf8PathBuf,
    report_name_suffix: Option<String>,
    encoding: &'static Encoding,
    format: ReportFormat,
    pending: IndexMap<String, Vec<ReportEntry>>,
}

impl FileReporter {
    pub(crate) fn new(
        reports_dir: Utf8PathBuf,
        report_name_suffix: Option<String>,
        encoding: &'static Encoding,
        format: ReportFormat,
    ) -> Self {
        Self {
            reports_dir,
            report_name_suffix,
            encoding,
            format,
            pending: IndexMap::new(),
        }
    }

    /// Buffers one attempt until its suite finishes.
    pub fn record_attempt(&mut self, entry: ReportEntry) {
        self.pending
            .entry(entry.identity.suite.clone())
            .or_default()
            .push(entry);
    }

    /// Writes the text report for a completed suite and drops its buffered
    /// entries. Returns `None` when nothing was recorded for the suite.
    pub fn suite_finished(
        &mut self,
        suite: &str,
    ) -> Result<Option<Utf8PathBuf>, WriteReportError> {
        let Some(entries) = self.pending.swap_remove(suite) else {
            return Ok(None);
        };

        let content = self.render(suite, &entries);
        let (encoded, _, _) = self.encoding.encode(&content);

        let path = self.report_path(suite);
        let mut file = File::create(&path).map_err(|error| WriteReportError::Fs {
            file: path.clone(),
            error,
        })?;
        file.write_all(&encoded).map_err(WriteReportError::Io)?;
        tracing::debug!("wrote text report for {suite} to {path}");
        Ok(Some(path))
    }

    fn render(&self, suite: &str, entries: &[ReportEntry]) -> String {
        let counts = SuiteCounts::tally(entries);

        let mut out = String::new();
        out.push_str("-------------------------------------------------------\n");
        let _ = writeln!(out, "Test set: {suite}");
        out.push_str("-------------------------------------------------------\n");

        let mut by_test: IndexMap<&str, Vec<&ReportEntry>> = IndexMap::new();
        for entry in entries {
            by_test
                .entry(entry.identity.test_name.as_str())
                .or_default()
                .push(entry);
        }

        for (test_name, attempts) in &by_test {
            let total = attempts.len();
            for (index, entry) in attempts.iter().enumerate() {
                let include = match self.format {
                    ReportFormat::Verbose => true,
                    _ => entry.outcome.is_fail_like(),
                };
                if !include {
                    continue;
                }
                if total > 1 {
                    let _ = writeln!(
                        out,
                        "{test_name} (attempt {}/{total}) -- {} in {}",
                        index + 1,
                        entry.outcome,
                        FormattedDuration(entry.elapsed),
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "{test_name} -- {} in {}",
                        entry.outcome,
                        FormattedDuration(entry.elapsed),
                    );
                }
                if let Some(message) = entry
                    .failure
                    .as_ref()
                    .and_then(|failure| failure.message.as_deref())
                {
                    let _ = writeln!(out, "  {message}");
                }
            }
        }

        if counts.flaky > 0 {
            let _ = writeln!(
                out,
                "{} {} passed only after rerun",
                counts.flaky,
                plural::tests_str(counts.flaky),
            );
        }
        let _ = writeln!(out, "\n{}", counts.summary_line());
        out
    }

    fn report_path(&self, suite: &str) -> Utf8PathBuf {
        let file_name = match &self.report_name_suffix {
            Some(suffix) => format!("{suite}-{suffix}.txt"),
            None => format!("{suite}.txt"),
        };
        self.reports_dir.join(file_name)
    }
}
