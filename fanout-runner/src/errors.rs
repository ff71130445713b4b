// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by fanout-runner.

use crate::reporter::{ForkId, ReportFormat, RunOrder};
use camino::Utf8PathBuf;
use thiserror::Error;

/// An invalid or inconsistent reporter configuration.
///
/// These are caller defects: they are surfaced immediately and never retried.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A fork identifier was passed while fork mode is off.
    #[error("fork {fork} passed to a configuration without fork mode")]
    ForkIdWithoutForkMode {
        /// The fork identifier that was passed.
        fork: ForkId,
    },

    /// Fork mode is on but no fork identifier was passed.
    #[error("fork mode is enabled but no fork id was passed")]
    ForkModeWithoutForkId,

    /// The configured encoding label is not a known encoding.
    #[error("unknown encoding label `{label}`")]
    UnknownEncoding {
        /// The label that failed to resolve.
        label: String,
    },

    /// The configured run order needs run statistics but no statistics file
    /// was configured.
    #[error("run order `{run_order}` requires a statistics file")]
    MissingStatisticsFile {
        /// The run order that was requested.
        run_order: RunOrder,
    },
}

/// An error that occurs while constructing a reporter.
///
/// Failures here are isolated to the single `make` call that produced them:
/// run-history state is unaffected and other reporters keep working.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReporterBuildError {
    /// The configuration and the requested reporter disagree.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The resolved reports directory could not be created.
    #[error("error creating reports directory `{dir}`")]
    CreateDir {
        /// The directory that could not be created.
        dir: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An output file could not be created or opened.
    #[error("error creating report file `{file}`")]
    CreateFile {
        /// The file that could not be created.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while writing a report.
///
/// Entries already appended to the run history are never discarded because a
/// write failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// An error occurred while writing to the output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while operating on the file system.
    #[error("error operating on path `{file}`")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to `{file}`")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },

    /// An error occurred while serializing the statistics file.
    #[error("error serializing statistics to `{file}`")]
    Json {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// Error returned while parsing a [`ReportFormat`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for report format: {input}\n(known values: {})",
    ReportFormat::variants().join(", "),
)]
pub struct ReportFormatParseError {
    input: String,
}

impl ReportFormatParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`RunOrder`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for run order: {input}\n(known values: {})",
    RunOrder::variants().join(", "),
)]
pub struct RunOrderParseError {
    input: String,
}

impl RunOrderParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}
