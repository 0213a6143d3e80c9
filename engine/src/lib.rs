//! Pair, gate, and count deterministic concurrency-bug benchmarks.
//!
//! A benchmark program is seeded with synthetic race conditions ("bugs"). Each bug has two
//! call sites, part `0` and part `1`, that the program reaches from different threads. This
//! crate provides the engine those call sites invoke:
//!
//! - [Barrier] and [BeforeSlot] line the two parts up and record which reached a point first.
//! - [Synchronizer] pairs exactly one part-0 and one part-1 invocation per round and enforces
//!   a retry budget.
//! - [InputMap] ties bytes of an external fuzz input to whether a round runs the bug body.
//! - [Stats] counts attempts and triggers, and [persist] merges them into a file shared by
//!   every process run of the benchmark.
//! - [Engine] owns the registry of bugs and the process lifecycle. When any bug fired,
//!   shutdown aborts the process so a harness observes a crash.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use racebench_engine::{Config, Engine, InputMap, Part, Pattern, Registry};
//!
//! struct Quiet;
//!
//! impl Pattern for Quiet {
//!     fn name(&self) -> &'static str {
//!         "quiet"
//!     }
//!
//!     fn reset_state(&self) {}
//!
//!     fn run_part(&self, _: Part) -> bool {
//!         false
//!     }
//! }
//!
//! let cfg = Config::default();
//! let mut registry = Registry::new(cfg.max_bugs);
//! registry.register(0, InputMap::default(), Box::new(Quiet)).unwrap();
//!
//! let engine = Engine::with_input(cfg, registry, Bytes::from_static(b"input"), 7);
//! std::thread::scope(|s| {
//!     s.spawn(|| engine.invoke(0, Part::Zero));
//!     s.spawn(|| engine.invoke(0, Part::One));
//! });
//! assert!(!engine.stats().is_triggered());
//! ```

use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

mod barrier;
pub use barrier::{Barrier, Role};
mod before;
pub use before::BeforeSlot;
mod config;
pub use config::{Config, DEFAULT_STAT_PATH, STAT_PATH_ENV};
mod input;
pub use input::{obfuscate, Field, InputMap};
mod lifecycle;
pub use lifecycle::{Engine, ShutdownGuard, Termination};
mod manifest;
pub use manifest::{Entry, Manifest};
mod pattern;
pub use pattern::{Part, Pattern};
mod registry;
pub use registry::{Bug, Registry};
mod stats;
pub use stats::{persist, Record, Stats};
mod sync;
pub use sync::{Outcome, Synchronizer};

/// Identifier of a bug within a benchmark (an index into every per-bug array).
pub type BugId = usize;

/// Errors that can occur when interacting with the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing input argument at position {0}")]
    MissingInput(usize),
    #[error("input unreadable: {0}: {1}")]
    InputUnreadable(PathBuf, IoError),
    #[error("bug out of range: {0} (max bugs {1})")]
    BugOutOfRange(BugId, usize),
    #[error("duplicate bug: {0}")]
    DuplicateBug(BugId),
    #[error("invalid input map: {0}")]
    InvalidMap(String),
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
    #[error("stat file open failed: {0}: {1}")]
    StatOpenFailed(PathBuf, IoError),
    #[error("stat file lock failed: {0}")]
    StatLockFailed(IoError),
    #[error("stat file read failed: {0}")]
    StatReadFailed(IoError),
    #[error("stat file write failed: {0}")]
    StatWriteFailed(IoError),
    #[error("stat layout mismatch: expected {expected} bytes, found {found}")]
    LayoutMismatch { expected: usize, found: usize },
    #[error("manifest invalid: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] IoError),
}
