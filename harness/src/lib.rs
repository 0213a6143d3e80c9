//! Run, plan, and inspect racebench benchmarks.
//!
//! The `racebench` binary wraps three commands:
//!
//! - [run]: load a bug manifest and the fuzz input, invoke both parts of every bug from
//!   concurrent threads, and shut down (aborting if any bug fired).
//! - [stats]: print the counters accumulated in a statistics file.
//! - [plan]: derive the input map of a bug from a known-good input and add it to a manifest.

use thiserror::Error;

pub mod plan;
pub mod run;
pub mod stats;

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Errors that can occur when running a command.
#[derive(Error, Debug)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(#[from] racebench_engine::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stat file of {0} bytes does not hold a whole record")]
    InvalidStatFile(usize),
    #[error("invalid field (expected <offset>:<width>): {0}")]
    InvalidField(String),
    #[error("bug already in manifest: {0}")]
    DuplicateBug(usize),
}
