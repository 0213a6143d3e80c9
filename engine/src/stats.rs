//! Per-process counters and their merge into a statistics file shared across runs.
//!
//! # Format
//!
//! The statistics file holds a single fixed-size record of little-endian `u32` fields:
//!
//! ```text
//! +-----------+----------------+-------------------+---------------------+------------------+
//! | total_run | tried[N]       | dua_pass[N]       | check_pass[N]       | trigger[N]       |
//! +-----------+----------------+-------------------+---------------------+------------------+
//!
//! N = number of bugs in the benchmark
//! ```
//!
//! _A file written with a different bug count (or by an engine that only persisted
//! `total_run` and `trigger`) has a different length and is rejected rather than merged._

use crate::{BugId, Error};
use bytes::{Buf, BufMut};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::Path,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use tracing::debug;

/// Number of per-bug counter arrays in a [Record].
const COUNTERS: usize = 4;

/// Counters accumulated by one process.
///
/// Every counter is only ever incremented, so [Stats] can be shared by all threads invoking bugs.
#[derive(Debug)]
pub struct Stats {
    tried: Box<[AtomicU32]>,
    dua_pass: Box<[AtomicU32]>,
    check_pass: Box<[AtomicU32]>,
    trigger: Box<[AtomicU32]>,
    triggered: AtomicBool,
}

fn counters(bugs: usize) -> Box<[AtomicU32]> {
    (0..bugs).map(|_| AtomicU32::new(0)).collect()
}

fn load(counters: &[AtomicU32]) -> Vec<u32> {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).collect()
}

impl Stats {
    /// Create zeroed counters for `bugs` bug ids.
    pub fn new(bugs: usize) -> Self {
        Self {
            tried: counters(bugs),
            dua_pass: counters(bugs),
            check_pass: counters(bugs),
            trigger: counters(bugs),
            triggered: AtomicBool::new(false),
        }
    }

    /// Number of bug ids tracked.
    pub fn bugs(&self) -> usize {
        self.tried.len()
    }

    pub fn tried(&self, bug: BugId) -> u32 {
        self.tried[bug].load(Ordering::Acquire)
    }

    pub fn dua_pass(&self, bug: BugId) -> u32 {
        self.dua_pass[bug].load(Ordering::Relaxed)
    }

    pub fn check_pass(&self, bug: BugId) -> u32 {
        self.check_pass[bug].load(Ordering::Relaxed)
    }

    pub fn trigger(&self, bug: BugId) -> u32 {
        self.trigger[bug].load(Ordering::Relaxed)
    }

    pub(crate) fn record_tried(&self, bug: BugId) {
        self.tried[bug].fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dua_pass(&self, bug: BugId) {
        self.dua_pass[bug].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_pass(&self, bug: BugId) {
        self.check_pass[bug].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a trigger for `bug` and mark the process as triggered.
    pub(crate) fn record_trigger(&self, bug: BugId) {
        self.trigger[bug].fetch_add(1, Ordering::Relaxed);
        self.triggered.store(true, Ordering::Release);
    }

    /// Whether any bug fired during this process.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Capture the counters as the record this process contributes (one run).
    pub fn snapshot(&self) -> Record {
        Record {
            total_run: 1,
            tried: load(&self.tried),
            dua_pass: load(&self.dua_pass),
            check_pass: load(&self.check_pass),
            trigger: load(&self.trigger),
        }
    }
}

/// A plain statistics record, as persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub total_run: u32,
    pub tried: Vec<u32>,
    pub dua_pass: Vec<u32>,
    pub check_pass: Vec<u32>,
    pub trigger: Vec<u32>,
}

impl Record {
    /// An all-zero record for `bugs` bug ids.
    pub fn zeroed(bugs: usize) -> Self {
        Self {
            total_run: 0,
            tried: vec![0; bugs],
            dua_pass: vec![0; bugs],
            check_pass: vec![0; bugs],
            trigger: vec![0; bugs],
        }
    }

    /// Number of bug ids in the record.
    pub fn bugs(&self) -> usize {
        self.tried.len()
    }

    /// Encoded size of a record with `bugs` bug ids.
    pub const fn encoded_len(bugs: usize) -> usize {
        4 * (1 + COUNTERS * bugs)
    }

    /// Number of bug ids in an encoded record of `len` bytes (if `len` is a valid size).
    pub fn bugs_for_len(len: usize) -> Option<usize> {
        if len < 4 || len % 4 != 0 {
            return None;
        }
        let words = len / 4 - 1;
        if words % COUNTERS != 0 {
            return None;
        }
        Some(words / COUNTERS)
    }

    fn arrays(&self) -> [&Vec<u32>; COUNTERS] {
        [&self.tried, &self.dua_pass, &self.check_pass, &self.trigger]
    }

    /// Serialize the record.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.total_run);
        for array in self.arrays() {
            for value in array {
                buf.put_u32_le(*value);
            }
        }
    }

    /// Serialize the record into a new buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_len(self.bugs()));
        self.write(&mut buf);
        buf
    }

    /// Deserialize a record with `bugs` bug ids from exactly [Record::encoded_len] bytes.
    pub fn decode(mut buf: impl Buf, bugs: usize) -> Result<Self, Error> {
        let expected = Self::encoded_len(bugs);
        if buf.remaining() != expected {
            return Err(Error::LayoutMismatch {
                expected,
                found: buf.remaining(),
            });
        }
        let total_run = buf.get_u32_le();
        let mut read = || (0..bugs).map(|_| buf.get_u32_le()).collect::<Vec<_>>();
        let tried = read();
        let dua_pass = read();
        let check_pass = read();
        let trigger = read();
        Ok(Self {
            total_run,
            tried,
            dua_pass,
            check_pass,
            trigger,
        })
    }

    /// Add `other` into `self` field by field.
    ///
    /// # Panics
    ///
    /// Panics if the records track a different number of bugs.
    pub fn merge(&mut self, other: &Record) {
        assert_eq!(self.bugs(), other.bugs(), "bug count mismatch");
        self.total_run = self.total_run.wrapping_add(other.total_run);
        let pairs = [
            (&mut self.tried, &other.tried),
            (&mut self.dua_pass, &other.dua_pass),
            (&mut self.check_pass, &other.check_pass),
            (&mut self.trigger, &other.trigger),
        ];
        for (mine, theirs) in pairs {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a = a.wrapping_add(*b);
            }
        }
    }

    /// Whether every field is zero.
    pub fn is_zero(&self) -> bool {
        self.total_run == 0 && self.arrays().iter().all(|a| a.iter().all(|v| *v == 0))
    }
}

/// An exclusive advisory lock on an open file, released on drop.
struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    fn acquire(file: &'a File) -> Result<Self, Error> {
        // SAFETY: the descriptor is owned by `file`, which outlives the lock.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
            return Err(Error::StatLockFailed(std::io::Error::last_os_error()));
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still open (borrowed for the lifetime of the lock).
        if unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) } != 0 {
            debug!(error = ?std::io::Error::last_os_error(), "failed to unlock stat file");
        }
    }
}

/// Merge `local` into the statistics file at `path`, returning the merged totals.
///
/// The file is created if absent and held under an exclusive advisory lock for the whole
/// read-merge-write, so concurrent processes serialize and no update is lost. An empty file
/// reads as all zeros. A file whose length does not match the record layout is left untouched.
pub fn persist(path: &Path, local: &Record) -> Result<Record, Error> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o666)
        .open(path)
        .map_err(|e| Error::StatOpenFailed(path.into(), e))?;
    let _lock = FileLock::acquire(&file)?;
    let mut handle = &file;

    // Read the existing record
    let mut existing = Vec::with_capacity(Record::encoded_len(local.bugs()));
    handle
        .read_to_end(&mut existing)
        .map_err(Error::StatReadFailed)?;
    let mut merged = if existing.is_empty() {
        Record::zeroed(local.bugs())
    } else {
        Record::decode(existing.as_slice(), local.bugs())?
    };
    merged.merge(local);

    // Write the merged record in place
    handle
        .seek(SeekFrom::Start(0))
        .map_err(Error::StatWriteFailed)?;
    handle
        .write_all(&merged.encode())
        .map_err(Error::StatWriteFailed)?;
    file.sync_data().map_err(Error::StatWriteFailed)?;
    debug!(path = ?path, total_run = merged.total_run, "persisted stats");
    Ok(merged)
}
