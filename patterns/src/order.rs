//! Races on ordering between plain memory accesses.

use racebench_engine::{Part, Pattern};
use std::{
    sync::atomic::{fence, AtomicBool, AtomicI32, Ordering},
    thread,
};

const TERMS: usize = 3;
const INITIAL: [i32; TERMS] = [0, 2, 1];
const TOTAL: i32 = 3;

/// Both parts add their half of an array into a shared sum with a non-atomic read-modify-write.
///
/// Part one waits for part zero to finish and then checks the sum. Triggers when an update was
/// lost.
#[derive(Debug)]
pub struct NonAtomicArith {
    terms: [AtomicI32; TERMS],
    sum: AtomicI32,
    done: AtomicBool,
}

impl NonAtomicArith {
    fn add(&self, range: std::ops::Range<usize>) {
        for i in range {
            let next = self.sum.load(Ordering::Relaxed) + self.terms[i].load(Ordering::Relaxed);
            self.sum.store(next, Ordering::Relaxed);
        }
        fence(Ordering::SeqCst);
    }
}

impl Default for NonAtomicArith {
    fn default() -> Self {
        Self {
            terms: INITIAL.map(AtomicI32::new),
            sum: AtomicI32::new(0),
            done: AtomicBool::new(false),
        }
    }
}

impl Pattern for NonAtomicArith {
    fn name(&self) -> &'static str {
        "non-atomic-arith"
    }

    fn reset_state(&self) {
        for (term, value) in self.terms.iter().zip(INITIAL) {
            term.store(value, Ordering::Relaxed);
        }
        self.sum.store(0, Ordering::Relaxed);
        self.done.store(false, Ordering::Relaxed);
    }

    fn run_part(&self, part: Part) -> bool {
        let index = part.index();
        self.terms[index + 1].store(2 - index as i32, Ordering::Relaxed);
        match part {
            Part::One => {
                self.add(0..TERMS / 2);

                // Part zero sets `done` in the same round
                while !self.done.load(Ordering::Relaxed) {
                    thread::yield_now();
                }
                let lost = self.sum.load(Ordering::Relaxed) != TOTAL;
                self.done.store(false, Ordering::Relaxed);
                self.sum.store(0, Ordering::Relaxed);
                lost
            }
            Part::Zero => {
                self.add(TERMS / 2..TERMS);
                self.done.store(true, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Part one raises a flag before publishing the value the flag guards.
///
/// Part zero waits for the flag and then consumes the value. Triggers when it finds nothing
/// published.
#[derive(Debug, Default)]
pub struct DisorderDepend {
    flag: AtomicBool,
    published: AtomicBool,
}

impl Pattern for DisorderDepend {
    fn name(&self) -> &'static str {
        "disorder-depend"
    }

    fn reset_state(&self) {
        self.flag.store(false, Ordering::Relaxed);
        self.published.store(false, Ordering::Relaxed);
    }

    fn run_part(&self, part: Part) -> bool {
        match part {
            Part::One => {
                self.flag.store(true, Ordering::Relaxed);
                fence(Ordering::SeqCst);
                self.published.store(true, Ordering::Relaxed);
                false
            }
            Part::Zero => {
                // Part one raises the flag in the same round
                while !self.flag.load(Ordering::Relaxed) {
                    thread::yield_now();
                }
                let missing = !self.published.swap(false, Ordering::Relaxed);
                self.flag.store(false, Ordering::Relaxed);
                missing
            }
        }
    }
}
