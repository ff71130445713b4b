// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporter configuration and construction.
//!
//! [`ReportConfig`] is an immutable snapshot of every setting needed to build
//! reporters, captured once at startup via [`ReportConfigBuilder`]. Its
//! `*_reporter` methods are the only way reporters are created: they resolve
//! the per-fork output directory, enforce that the fork identifier agrees
//! with the configured fork mode, and hand each reporter the run-history
//! store selected by the isolation policy.

use crate::{
    errors::{ConfigError, ReportFormatParseError, ReporterBuildError, RunOrderParseError},
    helpers,
    reporter::{
        capture::{ConsoleReporter, OutputCaptureReporter, SharedSink},
        file::FileReporter,
        history::RunHistoryStore,
        junit::StructuredReporter,
        statistics::StatisticsReporter,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use encoding_rs::{Encoding, UTF_8};
use std::{
    fmt, fs,
    io::Write,
    str::FromStr,
    sync::{Arc, Mutex, OnceLock},
};

/// The identifier of a forked worker process.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ForkId(u32);

impl ForkId {
    /// Creates a new `ForkId` from a fork number.
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Returns the fork number.
    pub fn number(self) -> u32 {
        self.0
    }
}

impl From<u32> for ForkId {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The text report format.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ReportFormat {
    /// Line-oriented output with failure detail only for failing tests.
    #[default]
    Concise,

    /// Line-oriented output with one line per attempt.
    Verbose,

    /// No text output; only the structured report is produced.
    StructuredOnly,
}

impl ReportFormat {
    /// Returns true for the formats the file reporter can render.
    pub fn is_line_oriented(self) -> bool {
        matches!(self, ReportFormat::Concise | ReportFormat::Verbose)
    }

    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 3] {
        ["concise", "verbose", "structured-only"]
    }
}

impl FromStr for ReportFormat {
    type Err = ReportFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concise" => Ok(ReportFormat::Concise),
            "verbose" => Ok(ReportFormat::Verbose),
            "structured-only" => Ok(ReportFormat::StructuredOnly),
            other => Err(ReportFormatParseError::new(other)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportFormat::Concise => "concise",
            ReportFormat::Verbose => "verbose",
            ReportFormat::StructuredOnly => "structured-only",
        };
        f.write_str(s)
    }
}

/// The order in which the scheduler runs tests.
///
/// Only the statistics requirement matters to this crate: `Balanced` and
/// `FailedFirst` consult runtimes and outcomes from the previous run, so they
/// need the statistics reporter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RunOrder {
    /// Alphabetical by test identity.
    #[default]
    Alphabetical,

    /// A random permutation.
    Random,

    /// Slowest tests first, using recorded runtimes.
    Balanced,

    /// Tests that failed in the previous run first.
    FailedFirst,
}

impl RunOrder {
    /// Returns true if this run order needs run statistics from the previous
    /// run.
    pub fn requires_statistics(self) -> bool {
        matches!(self, RunOrder::Balanced | RunOrder::FailedFirst)
    }

    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 4] {
        ["alphabetical", "random", "balanced", "failed-first"]
    }

    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            RunOrder::Alphabetical => "alphabetical",
            RunOrder::Random => "random",
            RunOrder::Balanced => "balanced",
            RunOrder::FailedFirst => "failed-first",
        }
    }
}

impl FromStr for RunOrder {
    type Err = RunOrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alphabetical" => Ok(RunOrder::Alphabetical),
            "random" => Ok(RunOrder::Random),
            "balanced" => Ok(RunOrder::Balanced),
            "failed-first" => Ok(RunOrder::FailedFirst),
            other => Err(RunOrderParseError::new(other)),
        }
    }
}

impl fmt::Display for RunOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    report_format: ReportFormat,
    use_file_reporter: bool,
    print_summary: bool,
    report_name_suffix: Option<String>,
    trim_stack_trace: bool,
    rerun_count: u32,
    structured_disabled: bool,
    encoding_label: String,
    redirect_output_to_file: bool,
    fork_mode: bool,
    statistics_file: Option<Utf8PathBuf>,
    run_order: RunOrder,
    console_out: DebugIgnore<Option<SharedSink>>,
    console_err: DebugIgnore<Option<SharedSink>>,
}

impl ReportConfigBuilder {
    /// Creates a new builder with defaults: concise format, file reporter
    /// enabled, summaries printed, stack traces trimmed, no reruns, no fork
    /// mode.
    pub fn new() -> Self {
        Self {
            use_file_reporter: true,
            print_summary: true,
            trim_stack_trace: true,
            ..Self::default()
        }
    }

    /// Sets the text report format.
    pub fn set_report_format(&mut self, report_format: ReportFormat) -> &mut Self {
        self.report_format = report_format;
        self
    }

    /// Sets whether the line-oriented file reporter is created at all.
    pub fn set_use_file_reporter(&mut self, use_file_reporter: bool) -> &mut Self {
        self.use_file_reporter = use_file_reporter;
        self
    }

    /// Sets whether per-suite summaries are printed to the console.
    pub fn set_print_summary(&mut self, print_summary: bool) -> &mut Self {
        self.print_summary = print_summary;
        self
    }

    /// Sets the suffix appended to report file names, used to disambiguate
    /// fork-specific files that land in a shared directory.
    pub fn set_report_name_suffix(&mut self, suffix: impl Into<String>) -> &mut Self {
        self.report_name_suffix = Some(suffix.into());
        self
    }

    /// Sets whether stack traces are trimmed at report-write time.
    pub fn set_trim_stack_trace(&mut self, trim_stack_trace: bool) -> &mut Self {
        self.trim_stack_trace = trim_stack_trace;
        self
    }

    /// Sets the number of times a failing test is rerun.
    pub fn set_rerun_count(&mut self, rerun_count: u32) -> &mut Self {
        self.rerun_count = rerun_count;
        self
    }

    /// Disables the structured (JUnit XML) report.
    pub fn set_structured_disabled(&mut self, structured_disabled: bool) -> &mut Self {
        self.structured_disabled = structured_disabled;
        self
    }

    /// Sets the text encoding label for file reports. A blank label selects
    /// the platform default, UTF-8.
    pub fn set_encoding(&mut self, label: impl Into<String>) -> &mut Self {
        self.encoding_label = label.into();
        self
    }

    /// Sets whether captured test output is redirected to per-suite files.
    pub fn set_redirect_output_to_file(&mut self, redirect: bool) -> &mut Self {
        self.redirect_output_to_file = redirect;
        self
    }

    /// Sets whether this run forks worker processes.
    pub fn set_fork_mode(&mut self, fork_mode: bool) -> &mut Self {
        self.fork_mode = fork_mode;
        self
    }

    /// Sets the statistics file consulted and rewritten by statistics-based
    /// run orders.
    pub fn set_statistics_file(&mut self, statistics_file: impl Into<Utf8PathBuf>) -> &mut Self {
        self.statistics_file = Some(statistics_file.into());
        self
    }

    /// Sets the run order strategy.
    pub fn set_run_order(&mut self, run_order: RunOrder) -> &mut Self {
        self.run_order = run_order;
        self
    }

    /// Sets the console sinks that direct (non-redirected) output capture and
    /// summaries write to.
    ///
    /// Capture these before any stream redirection so output stays visible
    /// even after the process's own standard streams are repointed for test
    /// isolation. Defaults to the process's stdout and stderr at build time.
    pub fn set_console_sinks(
        &mut self,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> &mut Self {
        self.console_out = DebugIgnore(Some(Arc::new(Mutex::new(out))));
        self.console_err = DebugIgnore(Some(Arc::new(Mutex::new(err))));
        self
    }

    /// Builds the [`ReportConfig`] for the reports directory template.
    ///
    /// The template may contain the fork token `%d`, replaced by the fork
    /// number when resolving per-fork directories.
    pub fn build(&mut self, reports_dir: impl Into<Utf8PathBuf>) -> Result<ReportConfig, ConfigError> {
        let encoding = resolve_encoding(&self.encoding_label)?;
        if self.run_order.requires_statistics() && self.statistics_file.is_none() {
            return Err(ConfigError::MissingStatisticsFile {
                run_order: self.run_order,
            });
        }

        let console_out = self
            .console_out
            .take()
            .unwrap_or_else(|| Arc::new(Mutex::new(Box::new(std::io::stdout()))));
        let console_err = self
            .console_err
            .take()
            .unwrap_or_else(|| Arc::new(Mutex::new(Box::new(std::io::stderr()))));

        Ok(ReportConfig {
            reports_dir: reports_dir.into(),
            report_format: self.report_format,
            use_file_reporter: self.use_file_reporter,
            print_summary: self.print_summary,
            report_name_suffix: self.report_name_suffix.clone(),
            trim_stack_trace: self.trim_stack_trace,
            rerun_count: self.rerun_count,
            structured_disabled: self.structured_disabled,
            encoding,
            redirect_output_to_file: self.redirect_output_to_file,
            fork_mode: self.fork_mode,
            statistics_file: self.statistics_file.clone(),
            run_order: self.run_order,
            console_out: DebugIgnore(console_out),
            console_err: DebugIgnore(console_err),
            shared_history: Arc::new(RunHistoryStore::new()),
            statistics: OnceLock::new(),
        })
    }
}

fn resolve_encoding(label: &str) -> Result<&'static Encoding, ConfigError> {
    let label = label.trim();
    if label.is_empty() {
        return Ok(UTF_8);
    }
    Encoding::for_label(label.as_bytes()).ok_or_else(|| ConfigError::UnknownEncoding {
        label: label.to_owned(),
    })
}

/// All the settings used to construct reporters.
///
/// Captured once at startup and never mutated afterwards, apart from the
/// lazily materialized statistics reporter. Owns the shared run-history
/// store; reporters hold non-owning (`Arc`) references to the store they were
/// handed and never outlive the configuration's run.
#[derive(Debug)]
pub struct ReportConfig {
    reports_dir: Utf8PathBuf,
    report_format: ReportFormat,
    use_file_reporter: bool,
    print_summary: bool,
    report_name_suffix: Option<String>,
    trim_stack_trace: bool,
    rerun_count: u32,
    structured_disabled: bool,
    encoding: &'static Encoding,
    redirect_output_to_file: bool,
    fork_mode: bool,
    statistics_file: Option<Utf8PathBuf>,
    run_order: RunOrder,
    console_out: DebugIgnore<SharedSink>,
    console_err: DebugIgnore<SharedSink>,
    shared_history: Arc<RunHistoryStore>,
    statistics: OnceLock<Option<StatisticsReporter>>,
}

impl ReportConfig {
    /// Returns the configured reports directory template.
    pub fn reports_dir(&self) -> &Utf8Path {
        &self.reports_dir
    }

    /// Returns the text report format.
    pub fn report_format(&self) -> ReportFormat {
        self.report_format
    }

    /// Returns the number of times a failing test is rerun.
    pub fn rerun_count(&self) -> u32 {
        self.rerun_count
    }

    /// Returns whether stack traces are trimmed at report-write time.
    pub fn trim_stack_trace(&self) -> bool {
        self.trim_stack_trace
    }

    /// Returns whether this run forks worker processes.
    pub fn fork_mode(&self) -> bool {
        self.fork_mode
    }

    /// Returns the text encoding used for file reports.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Returns the run order strategy.
    pub fn run_order(&self) -> RunOrder {
        self.run_order
    }

    /// Returns the run-history store shared by all in-process reporters.
    ///
    /// The rerun scheduler consults this store in non-fork mode to count
    /// prior attempts. In fork mode each structured reporter carries its own
    /// isolated store, reachable through the reporter itself.
    pub fn shared_run_history(&self) -> &Arc<RunHistoryStore> {
        &self.shared_history
    }

    /// Resolves the reports directory for a fork.
    ///
    /// Identity when `fork` is `None`; otherwise substitutes the decimal fork
    /// number for the fork token so concurrent forks never write into the
    /// same files. Passing a fork id without fork mode is a caller defect.
    pub fn resolve_reports_dir(&self, fork: Option<ForkId>) -> Result<Utf8PathBuf, ConfigError> {
        match fork {
            None => Ok(self.reports_dir.clone()),
            Some(fork) if self.fork_mode => {
                Ok(helpers::replace_fork_token(&self.reports_dir, fork))
            }
            Some(fork) => Err(ConfigError::ForkIdWithoutForkMode { fork }),
        }
    }

    /// Creates the structured (JUnit XML) reporter, or `None` when structured
    /// reporting is disabled.
    ///
    /// In fork mode every call creates a fresh, isolated run-history store:
    /// forked frameworks may reuse a generic suite name, and attempts from
    /// different forks must never merge. Without fork mode the single shared
    /// store is handed out, so concurrent in-process reruns of one test
    /// append to one history.
    pub fn structured_reporter(
        &self,
        fork: Option<ForkId>,
    ) -> Result<Option<StructuredReporter>, ReporterBuildError> {
        self.check_fork_agreement(fork)?;
        if self.structured_disabled {
            return Ok(None);
        }
        let dir = self.create_reports_dir(fork)?;
        let history = if self.fork_mode {
            Arc::new(RunHistoryStore::new())
        } else {
            Arc::clone(&self.shared_history)
        };
        Ok(Some(StructuredReporter::new(
            dir,
            self.report_name_suffix.clone(),
            self.trim_stack_trace,
            history,
        )))
    }

    /// Creates the line-oriented file reporter, or `None` when file output is
    /// off or the configured format has no text rendering.
    ///
    /// The `None` case touches nothing on disk.
    pub fn file_reporter(
        &self,
        fork: Option<ForkId>,
    ) -> Result<Option<FileReporter>, ReporterBuildError> {
        self.check_fork_agreement(fork)?;
        if !(self.use_file_reporter && self.report_format.is_line_oriented()) {
            return Ok(None);
        }
        let dir = self.create_reports_dir(fork)?;
        Ok(Some(FileReporter::new(
            dir,
            self.report_name_suffix.clone(),
            self.encoding,
            self.report_format,
        )))
    }

    /// Creates the output capture reporter.
    ///
    /// File-backed when output redirection is enabled, otherwise a direct
    /// pass-through to the console sinks captured at build time.
    pub fn output_capture_reporter(
        &self,
        fork: Option<ForkId>,
    ) -> Result<OutputCaptureReporter, ReporterBuildError> {
        self.check_fork_agreement(fork)?;
        if self.redirect_output_to_file {
            let dir = self.create_reports_dir(fork)?;
            Ok(OutputCaptureReporter::file_backed(
                dir,
                self.report_name_suffix.clone(),
            ))
        } else {
            Ok(OutputCaptureReporter::direct(
                Arc::clone(&self.console_out),
                Arc::clone(&self.console_err),
            ))
        }
    }

    /// Creates the console summary reporter, or `None` when summaries are
    /// turned off.
    pub fn console_reporter(&self) -> Option<ConsoleReporter> {
        self.print_summary
            .then(|| ConsoleReporter::new(Arc::clone(&self.console_out)))
    }

    /// Returns the statistics reporter, or `None` when the configured run
    /// order does not consult run statistics.
    ///
    /// The reporter is constructed on first access and memoized; concurrent
    /// first access from any number of threads observes the same instance.
    pub fn statistics_reporter(&self) -> Option<&StatisticsReporter> {
        self.statistics
            .get_or_init(|| match &self.statistics_file {
                Some(path) if self.run_order.requires_statistics() => {
                    Some(StatisticsReporter::new(path.clone()))
                }
                _ => None,
            })
            .as_ref()
    }

    fn check_fork_agreement(&self, fork: Option<ForkId>) -> Result<(), ConfigError> {
        match (fork, self.fork_mode) {
            (Some(fork), false) => Err(ConfigError::ForkIdWithoutForkMode { fork }),
            (None, true) => Err(ConfigError::ForkModeWithoutForkId),
            _ => Ok(()),
        }
    }

    fn create_reports_dir(&self, fork: Option<ForkId>) -> Result<Utf8PathBuf, ReporterBuildError> {
        let dir = self.resolve_reports_dir(fork)?;
        fs::create_dir_all(&dir).map_err(|error| ReporterBuildError::CreateDir {
            dir: dir.clone(),
            error,
        })?;
        tracing::debug!("reports directory ready at {dir}");
        Ok(dir)
    }
}
