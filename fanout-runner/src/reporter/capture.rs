// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capture of worker output, and the console summary reporter.
//!
//! A worker's raw stdout/stderr lines reach the reporting layer through an
//! [`OutputLineAdapter`], which bridges the transport's line callback onto an
//! [`OutputLineSink`]. The [`OutputCaptureReporter`] is the sink: it either
//! forwards lines straight to the console sinks captured at configuration
//! time, or redirects them to a per-suite file.

use crate::{errors::WriteReportError, reporter::events::ReportEntry, reporter::file::SuiteCounts};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    sync::{Arc, Mutex},
};

/// A console sink shared between the configuration and the reporters writing
/// to it. Captured once, before any stream redirection.
pub(crate) type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Which standard stream a captured line came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StreamKind {
    /// The worker's standard output.
    Stdout,

    /// The worker's standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Consumer of captured output lines.
pub trait OutputLineSink {
    /// Handles one line of captured output.
    fn handle_line(&self, kind: StreamKind, line: &str);
}

/// Bridges a raw line of worker output onto an [`OutputLineSink`].
///
/// A pure adapter: each line is forwarded unmodified, in received order, with
/// no buffering, filtering or coalescing.
pub struct OutputLineAdapter<'sink> {
    kind: StreamKind,
    sink: &'sink dyn OutputLineSink,
}

impl<'sink> OutputLineAdapter<'sink> {
    /// Creates an adapter for the worker's standard output.
    pub fn stdout(sink: &'sink dyn OutputLineSink) -> Self {
        Self {
            kind: StreamKind::Stdout,
            sink,
        }
    }

    /// Creates an adapter for the worker's standard error.
    pub fn stderr(sink: &'sink dyn OutputLineSink) -> Self {
        Self {
            kind: StreamKind::Stderr,
            sink,
        }
    }

    /// Forwards one line to the underlying sink.
    pub fn consume_line(&self, line: &str) {
        self.sink.handle_line(self.kind, line);
    }
}

/// Reporter for a worker's captured standard-output/standard-error text.
///
/// Built by
/// [`ReportConfig::output_capture_reporter`](crate::reporter::ReportConfig::output_capture_reporter):
/// file-backed when output redirection is enabled, direct pass-through
/// otherwise.
pub struct OutputCaptureReporter {
    mode: CaptureMode,
}

enum CaptureMode {
    Direct {
        out: SharedSink,
        err: SharedSink,
    },
    FileBacked {
        dir: Utf8PathBuf,
        suffix: Option<String>,
        state: Mutex<CaptureState>,
    },
}

#[derive(Default)]
struct CaptureState {
    suite: Option<String>,
    // None until the first line of a suite arrives; suites with no output
    // produce no file.
    file: Option<BufWriter<File>>,
    failed: bool,
}

impl OutputCaptureReporter {
    pub(crate) fn direct(out: SharedSink, err: SharedSink) -> Self {
        Self {
            mode: CaptureMode::Direct { out, err },
        }
    }

    pub(crate) fn file_backed(dir: Utf8PathBuf, suffix: Option<String>) -> Self {
        Self {
            mode: CaptureMode::FileBacked {
                dir,
                suffix,
                state: Mutex::new(CaptureState::default()),
            },
        }
    }

    /// Returns true when captured lines are redirected to files.
    pub fn is_file_backed(&self) -> bool {
        matches!(self.mode, CaptureMode::FileBacked { .. })
    }

    /// Marks the start of a suite. For file-backed capture the suite names
    /// the output file; its creation is deferred to the first line.
    pub fn suite_started(&self, suite: &str) {
        if let CaptureMode::FileBacked { state, .. } = &self.mode {
            let mut state = state.lock().expect("capture state lock poisoned");
            *state = CaptureState {
                suite: Some(suite.to_owned()),
                ..CaptureState::default()
            };
        }
    }

    /// Marks the end of a suite, flushing and closing the capture file if one
    /// was opened.
    pub fn suite_finished(&self) -> Result<(), WriteReportError> {
        match &self.mode {
            CaptureMode::Direct { out, err } => {
                let mut out = out.lock().expect("console sink lock poisoned");
                out.flush().map_err(WriteReportError::Io)?;
                let mut err = err.lock().expect("console sink lock poisoned");
                err.flush().map_err(WriteReportError::Io)?;
                Ok(())
            }
            CaptureMode::FileBacked { state, .. } => {
                let mut state = state.lock().expect("capture state lock poisoned");
                if let Some(mut file) = state.file.take() {
                    file.flush().map_err(WriteReportError::Io)?;
                }
                state.suite = None;
                Ok(())
            }
        }
    }

    fn capture_path(dir: &Utf8Path, suffix: Option<&str>, suite: Option<&str>) -> Utf8PathBuf {
        let stem = suite.unwrap_or("run");
        let file_name = match suffix {
            Some(suffix) => format!("{stem}-{suffix}-output.txt"),
            None => format!("{stem}-output.txt"),
        };
        dir.join(file_name)
    }
}

impl OutputLineSink for OutputCaptureReporter {
    fn handle_line(&self, kind: StreamKind, line: &str) {
        match &self.mode {
            CaptureMode::Direct { out, err } => {
                let sink = match kind {
                    StreamKind::Stdout => out,
                    StreamKind::Stderr => err,
                };
                let mut sink = sink.lock().expect("console sink lock poisoned");
                if let Err(error) = writeln!(sink, "{line}") {
                    tracing::debug!("error forwarding captured {kind} line: {error}");
                }
            }
            CaptureMode::FileBacked { dir, suffix, state } => {
                let mut state = state.lock().expect("capture state lock poisoned");
                if state.failed {
                    return;
                }
                if state.file.is_none() {
                    let path = Self::capture_path(dir, suffix.as_deref(), state.suite.as_deref());
                    match File::create(&path) {
                        Ok(file) => state.file = Some(BufWriter::new(file)),
                        Err(error) => {
                            state.failed = true;
                            tracing::error!("error creating capture file `{path}`: {error}");
                            return;
                        }
                    }
                }
                let file = state.file.as_mut().expect("file was just created");
                if let Err(error) = writeln!(file, "{line}") {
                    state.failed = true;
                    tracing::error!("error writing captured {kind} line: {error}");
                }
            }
        }
    }
}

/// Reporter printing per-suite progress and summary lines to the console.
pub struct ConsoleReporter {
    out: SharedSink,
}

impl ConsoleReporter {
    pub(crate) fn new(out: SharedSink) -> Self {
        Self { out }
    }

    /// Prints the start-of-suite line.
    pub fn suite_started(&self, suite: &str) {
        let mut out = self.out.lock().expect("console sink lock poisoned");
        if let Err(error) = writeln!(out, "Running {suite}") {
            tracing::debug!("error writing console line: {error}");
        }
    }

    /// Prints the end-of-suite summary from the suite's recorded attempts.
    pub fn suite_finished(&self, suite: &str, entries: &[ReportEntry]) {
        let counts = SuiteCounts::tally(entries);
        let mut out = self.out.lock().expect("console sink lock poisoned");
        if let Err(error) = writeln!(out, "{} -- {}", counts.summary_line(), suite) {
            tracing::debug!("error writing console line: {error}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reporter::events::{AttemptOutcome, TestIdentity};
    use camino_tempfile::Utf8TempDir;
    use chrono::Utc;
    use std::time::Duration;

    /// A sink that records (kind, line) pairs for assertions.
    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(StreamKind, String)>>,
    }

    impl OutputLineSink for RecordingSink {
        fn handle_line(&self, kind: StreamKind, line: &str) {
            self.lines
                .lock()
                .unwrap()
                .push((kind, line.to_owned()));
        }
    }

    fn shared_buffer() -> (SharedSink, Arc<Mutex<Vec<u8>>>) {
        #[derive(Clone)]
        struct BufSink(Arc<Mutex<Vec<u8>>>);
        impl Write for BufSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink: SharedSink = Arc::new(Mutex::new(Box::new(BufSink(Arc::clone(&buffer)))));
        (sink, buffer)
    }

    #[test]
    fn adapter_forwards_lines_in_order() {
        let sink = RecordingSink::default();
        let stdout = OutputLineAdapter::stdout(&sink);
        let stderr = OutputLineAdapter::stderr(&sink);

        stdout.consume_line("first");
        stderr.consume_line("second");
        stdout.consume_line("third");

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (StreamKind::Stdout, "first".to_owned()),
                (StreamKind::Stderr, "second".to_owned()),
                (StreamKind::Stdout, "third".to_owned()),
            ]
        );
    }

    #[test]
    fn direct_capture_passes_through_to_sinks() {
        let (out, out_buffer) = shared_buffer();
        let (err, err_buffer) = shared_buffer();
        let reporter = OutputCaptureReporter::direct(out, err);

        reporter.handle_line(StreamKind::Stdout, "to stdout");
        reporter.handle_line(StreamKind::Stderr, "to stderr");
        reporter.suite_finished().unwrap();

        assert_eq!(
            String::from_utf8(out_buffer.lock().unwrap().clone()).unwrap(),
            "to stdout\n"
        );
        assert_eq!(
            String::from_utf8(err_buffer.lock().unwrap().clone()).unwrap(),
            "to stderr\n"
        );
    }

    #[test]
    fn file_backed_capture_writes_per_suite_file() {
        let dir = Utf8TempDir::new().unwrap();
        let reporter =
            OutputCaptureReporter::file_backed(dir.path().to_owned(), Some("fork-1".to_owned()));
        assert!(reporter.is_file_backed());

        reporter.suite_started("app::checkout");
        reporter.handle_line(StreamKind::Stdout, "line one");
        reporter.handle_line(StreamKind::Stderr, "line two");
        reporter.suite_finished().unwrap();

        let path = dir.path().join("app::checkout-fork-1-output.txt");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "line one\nline two\n");
    }

    #[test]
    fn file_backed_capture_without_output_creates_no_file() {
        let dir = Utf8TempDir::new().unwrap();
        let reporter = OutputCaptureReporter::file_backed(dir.path().to_owned(), None);

        reporter.suite_started("app::checkout");
        reporter.suite_finished().unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn console_reporter_prints_summary() {
        let (out, buffer) = shared_buffer();
        let reporter = ConsoleReporter::new(out);

        reporter.suite_started("app::checkout");
        let entries = vec![ReportEntry::new(
            TestIdentity::new("app::checkout", "totals_add_up"),
            AttemptOutcome::Passed,
            Utc::now().fixed_offset(),
            Duration::from_millis(10),
        )];
        reporter.suite_finished("app::checkout", &entries);

        let content = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(content.contains("Running app::checkout"));
        assert!(content.contains("Tests run: 1"));
        assert!(content.contains("-- app::checkout"));
    }
}
