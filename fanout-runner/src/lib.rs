// Copyright (c) The fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Reporter coordination for [fanout](https://github.com/fanout-rs/fanout), a
//! test harness that splits a suite across isolated forked workers and
//! concurrent in-process threads, retries failing tests, and merges every
//! attempt of a test into one logical result.
//!
//! This crate owns the run-history and reporter-construction layer: which
//! reporters exist for a given fork, where they write, and whether they share
//! one run history or get an isolated one.

pub mod errors;
mod helpers;
pub mod reporter;

pub use helpers::FORK_TOKEN;
