//! Pair one part-0 and one part-1 invocation of a bug per round.
//!
//! # Protocol
//!
//! Any number of threads may invoke either part of a bug concurrently and repeatedly. For each
//! invocation:
//!
//! 1. If the bug has exhausted its retry budget, return.
//! 2. Claim the part's lock (`0 -> 1`). If another invocation of the same part holds it, return.
//! 3. Increment the active counter. An invocation observing a prior value of `1` found its
//!    partner waiting and joins the round. Otherwise it is alone: it may yield a bounded number
//!    of times for its partner, then tries to roll the counter back (`1 -> 0`). If the rollback
//!    succeeds nobody came and it abstains; if it fails, the partner incremented in between and
//!    it joins the round.
//! 4. Both members of the round meet at the `before` barrier (part `1` counts the attempt first),
//!    release their share of the counter, run the body, record success, and meet at the `after`
//!    barrier.
//! 5. Exactly one member consumes the success flag (`1 -> 0`) and counts the trigger.
//! 6. Release the part's lock.

use crate::{Barrier, BugId, Part, Stats};
use std::{
    sync::atomic::{AtomicU8, Ordering},
    thread,
};
use tracing::trace;

/// What a single invocation of [Synchronizer::run] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The bug has no retry budget left in this process.
    Exhausted,
    /// Another invocation of the same part was already in flight.
    Busy,
    /// No partner arrived; the body did not run.
    Abstained,
    /// The round ran. `triggered` is set for the member that counted a trigger.
    Completed { triggered: bool },
    /// The bug id is not registered.
    Unregistered,
}

/// Pairing state of a single bug.
#[derive(Debug, Default)]
pub struct Synchronizer {
    locks: [AtomicU8; 2],
    active: AtomicU8,
    success: AtomicU8,
    before: Barrier,
    after: Barrier,
}

impl Synchronizer {
    /// Create a new [Synchronizer] with no invocation in flight.
    pub const fn new() -> Self {
        Self {
            locks: [AtomicU8::new(0), AtomicU8::new(0)],
            active: AtomicU8::new(0),
            success: AtomicU8::new(0),
            before: Barrier::new(),
            after: Barrier::new(),
        }
    }

    /// Run `body` for `part` of `bug` if a partner invocation of the other part joins the round.
    ///
    /// `spins` bounds how many times a lone arrival yields waiting for its partner. Once a round
    /// forms, `body` runs on both members concurrently and a `true` from either counts as a
    /// trigger.
    ///
    /// # Panics
    ///
    /// Panics if `bug` is not below [Stats::bugs].
    pub fn run<F>(
        &self,
        stats: &Stats,
        bug: BugId,
        part: Part,
        max_tries: u32,
        spins: u32,
        body: F,
    ) -> Outcome
    where
        F: FnOnce(Part) -> bool,
    {
        if stats.tried(bug) >= max_tries {
            return Outcome::Exhausted;
        }

        // At most one invocation per part
        let lock = &self.locks[part.index()];
        if lock
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Outcome::Busy;
        }

        // Part one is the only part that spends budget, and only one part one runs at a time,
        // so checking again under the lock keeps `tried` within the budget.
        if part == Part::One && stats.tried(bug) >= max_tries {
            lock.fetch_sub(1, Ordering::AcqRel);
            return Outcome::Exhausted;
        }

        let outcome = if self.pair(spins) {
            self.round(stats, bug, part, body)
        } else {
            trace!(bug, ?part, "abstained");
            Outcome::Abstained
        };

        lock.fetch_sub(1, Ordering::AcqRel);
        outcome
    }

    /// Join the active counter, returning whether a partner is present.
    fn pair(&self, spins: u32) -> bool {
        if self.active.fetch_add(1, Ordering::AcqRel) == 1 {
            return true;
        }

        // Alone so far. This spin is bounded by `spins`; the partner may never come.
        for _ in 0..spins {
            if self.active.load(Ordering::Acquire) != 1 {
                break;
            }
            thread::yield_now();
        }

        // If the rollback fails, the partner incremented in between
        self.active
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    }

    fn round<F>(&self, stats: &Stats, bug: BugId, part: Part, body: F) -> Outcome
    where
        F: FnOnce(Part) -> bool,
    {
        if part == Part::One {
            stats.record_tried(bug);
        }

        self.before.enter();
        self.active.fetch_sub(1, Ordering::AcqRel);
        if body(part) {
            self.success.fetch_or(1, Ordering::AcqRel);
        }
        self.after.enter();

        let triggered = self
            .success
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if triggered {
            stats.record_trigger(bug);
        }
        trace!(bug, ?part, triggered, "round completed");
        Outcome::Completed { triggered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racebench_macros::test_traced;
    use std::sync::{
        atomic::{AtomicBool, AtomicU32},
        Arc,
    };

    const SPINS: u32 = 1_000;

    /// Invoke `part` until `done` holds or `attempts` runs out.
    fn drive<F>(
        sync: &Synchronizer,
        stats: &Stats,
        part: Part,
        max_tries: u32,
        attempts: usize,
        done: impl Fn() -> bool,
        body: F,
    ) where
        F: Fn(Part) -> bool,
    {
        for _ in 0..attempts {
            if done() {
                return;
            }
            sync.run(stats, 0, part, max_tries, SPINS, &body);
        }
    }

    #[test_traced]
    fn test_lone_part_abstains() {
        let sync = Synchronizer::new();
        let stats = Stats::new(1);
        for part in Part::ALL {
            let outcome = sync.run(&stats, 0, part, 10, 0, |_| panic!("ran alone"));
            assert_eq!(outcome, Outcome::Abstained);
        }
        assert_eq!(stats.tried(0), 0);
        assert_eq!(sync.active.load(Ordering::Acquire), 0);
    }

    #[test_traced]
    fn test_busy_part() {
        let sync = Synchronizer::new();
        let stats = Stats::new(1);
        sync.locks[0].store(1, Ordering::Release);
        assert_eq!(
            sync.run(&stats, 0, Part::Zero, 10, 0, |_| true),
            Outcome::Busy
        );
        assert_eq!(sync.locks[0].load(Ordering::Acquire), 1);
    }

    #[test_traced]
    fn test_exhausted_budget() {
        let sync = Synchronizer::new();
        let stats = Stats::new(1);
        for part in Part::ALL {
            assert_eq!(
                sync.run(&stats, 0, part, 0, 0, |_| true),
                Outcome::Exhausted
            );
        }
        assert_eq!(stats.tried(0), 0);
    }

    #[test_traced]
    #[should_panic]
    fn test_bug_outside_stats_panics() {
        let sync = Synchronizer::new();
        let stats = Stats::new(1);
        sync.run(&stats, 1, Part::Zero, 10, 0, |_| true);
    }

    #[test_traced]
    fn test_pairs_and_counts_one_trigger() {
        let sync = Arc::new(Synchronizer::new());
        let stats = Arc::new(Stats::new(1));
        let handles: Vec<_> = Part::ALL
            .into_iter()
            .map(|part| {
                let (sync, stats) = (sync.clone(), stats.clone());
                thread::spawn(move || {
                    let done = || stats.tried(0) > 0;
                    drive(&sync, &stats, part, 10, 1_000_000, done, |_| true);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Both parts reported a trigger but the round counts once
        assert_eq!(stats.tried(0), 1);
        assert_eq!(stats.trigger(0), 1);
        assert!(stats.is_triggered());
        assert_eq!(sync.success.load(Ordering::Acquire), 0);
        assert_eq!(sync.active.load(Ordering::Acquire), 0);
    }

    #[test_traced]
    fn test_rounds_are_exclusive() {
        const THREADS_PER_PART: usize = 3;
        const MAX_TRIES: u32 = 50;
        let sync = Arc::new(Synchronizer::new());
        let stats = Arc::new(Stats::new(1));
        let inside = Arc::new([AtomicU32::new(0), AtomicU32::new(0)]);
        let bodies = Arc::new([AtomicU32::new(0), AtomicU32::new(0)]);
        let overlap = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for part in Part::ALL {
            for _ in 0..THREADS_PER_PART {
                let (sync, stats) = (sync.clone(), stats.clone());
                let (inside, bodies, overlap) = (inside.clone(), bodies.clone(), overlap.clone());
                handles.push(thread::spawn(move || {
                    let done = || stats.tried(0) >= MAX_TRIES;
                    drive(&sync, &stats, part, MAX_TRIES, 1_000_000, done, |part| {
                        if inside[part.index()].fetch_add(1, Ordering::AcqRel) != 0 {
                            overlap.store(true, Ordering::Release);
                        }
                        bodies[part.index()].fetch_add(1, Ordering::AcqRel);
                        inside[part.index()].fetch_sub(1, Ordering::AcqRel);
                        false
                    });
                }));
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // One body per part per round, never two of the same part at once
        assert!(!overlap.load(Ordering::Acquire));
        assert_eq!(stats.tried(0), MAX_TRIES);
        assert_eq!(bodies[0].load(Ordering::Acquire), MAX_TRIES);
        assert_eq!(bodies[1].load(Ordering::Acquire), MAX_TRIES);
        assert_eq!(stats.trigger(0), 0);
        assert!(!stats.is_triggered());
    }

    #[test_traced]
    fn test_budget_never_exceeded() {
        const MAX_TRIES: u32 = 5;
        let sync = Arc::new(Synchronizer::new());
        let stats = Arc::new(Stats::new(1));
        let handles: Vec<_> = Part::ALL
            .into_iter()
            .map(|part| {
                let (sync, stats) = (sync.clone(), stats.clone());
                thread::spawn(move || {
                    let done = || stats.tried(0) >= MAX_TRIES;
                    drive(&sync, &stats, part, MAX_TRIES, 1_000_000, done, |_| false);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.tried(0), MAX_TRIES);

        // Further invocations return immediately without spending budget
        for part in Part::ALL {
            assert_eq!(
                sync.run(&stats, 0, part, MAX_TRIES, SPINS, |_| true),
                Outcome::Exhausted
            );
        }
        assert_eq!(stats.tried(0), MAX_TRIES);
    }
}
