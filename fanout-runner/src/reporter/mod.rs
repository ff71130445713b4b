// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a test run across forks, threads and reruns.
//!
//! The entry point is [`ReportConfig`], built once at startup via
//! [`ReportConfigBuilder`]. Before a fork (or the lone in-process worker)
//! runs its first test, the driver asks the configuration for a structured,
//! file and output-capture reporter, passing its [`ForkId`] if any. The
//! reporters record every attempt into a [`RunHistoryStore`], which the rerun
//! scheduler consults to correlate all attempts of one test into a single
//! logical result.

mod capture;
mod config;
mod events;
mod file;
mod history;
mod junit;
mod statistics;

pub use capture::*;
pub use config::*;
pub use events::*;
pub use file::*;
pub use history::*;
pub use junit::*;
pub use statistics::*;
