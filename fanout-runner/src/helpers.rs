// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for fanout-runner.

use crate::reporter::ForkId;
use camino::{Utf8Path, Utf8PathBuf};
use std::{fmt, time::Duration};

/// The token replaced by the decimal fork number when resolving a per-fork
/// reports directory.
pub const FORK_TOKEN: &str = "%d";

/// Substitutes the decimal fork number for every [`FORK_TOKEN`] in `template`.
///
/// Templates without the token resolve to themselves, so non-forked layouts
/// keep working unchanged.
pub(crate) fn replace_fork_token(template: &Utf8Path, fork: ForkId) -> Utf8PathBuf {
    Utf8PathBuf::from(template.as_str().replace(FORK_TOKEN, &fork.to_string()))
}

/// Utilities for pluralizing words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }
}

#[derive(Debug)]
pub(crate) struct FormattedDuration(pub(crate) Duration);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = self.0.as_secs_f64();
        if duration > 60.0 {
            write!(f, "{}m {:.2}s", duration as u32 / 60, duration % 60.0)
        } else {
            write!(f, "{duration:.2}s")
        }
    }
}
