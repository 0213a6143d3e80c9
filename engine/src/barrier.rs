//! Reusable two-party rendezvous.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// The part a participant played in a completed [Barrier] round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Arrived first, blocked until the second arrival, and reset the round.
    Waiter,
    /// Arrived second and released the waiter without blocking on the round.
    Releaser,
}

/// A rendezvous for exactly two participants that can be reused for any number of rounds.
///
/// The turn count cycles through `0`, `1`, and `2`. The first arrival of a round (observing `1`)
/// waits until the second arrival (observing `2`) signals, then resets the count to `0`.
///
/// There is no timeout: a participant whose partner never arrives blocks forever. Both call
/// sites of a bug are controlled by the harness, so a missing partner mirrors the missing
/// synchronization being benchmarked rather than an engine fault.
#[derive(Debug, Default)]
pub struct Barrier {
    turn: Mutex<u8>,
    cv: Condvar,
}

impl Barrier {
    /// Create a new [Barrier] with no participants.
    pub const fn new() -> Self {
        Self {
            turn: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u8> {
        // Nothing that can panic runs under the lock, so a poisoned count is still valid
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, u8>) -> MutexGuard<'a, u8> {
        self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the other participant has also entered this round.
    pub fn enter(&self) -> Role {
        let mut turn = self.lock();

        // A releaser that re-enters before its waiter woke must not join the draining round.
        while *turn == 2 {
            turn = self.wait(turn);
        }

        *turn += 1;
        if *turn == 1 {
            while *turn != 2 {
                turn = self.wait(turn);
            }
            *turn = 0;
            self.cv.notify_all();
            Role::Waiter
        } else {
            self.cv.notify_all();
            Role::Releaser
        }
    }

    /// Number of participants currently inside the round (`0`, `1`, or `2`).
    pub fn turn(&self) -> u8 {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racebench_macros::test_traced;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    #[test_traced]
    fn test_single_round_roles() {
        let barrier = Arc::new(Barrier::new());
        let other = barrier.clone();
        let handle = thread::spawn(move || other.enter());
        let mine = barrier.enter();
        let theirs = handle.join().unwrap();

        // Exactly one waiter and one releaser
        assert_ne!(mine, theirs);
        assert_eq!(barrier.turn(), 0);
    }

    #[test_traced]
    fn test_reusable_across_rounds() {
        const ROUNDS: usize = 2_000;
        let barrier = Arc::new(Barrier::new());
        let waiters = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = barrier.clone();
                let waiters = waiters.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        if barrier.enter() == Role::Waiter {
                            waiters.fetch_add(1, Ordering::Relaxed);
                        }
                        assert!(barrier.turn() <= 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every round has exactly one waiter
        assert_eq!(waiters.load(Ordering::Relaxed), ROUNDS);
        assert_eq!(barrier.turn(), 0);
    }

    #[test_traced]
    fn test_rounds_do_not_overlap() {
        const ROUNDS: usize = 500;
        let barrier = Arc::new(Barrier::new());
        let arrivals = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);

        let handles: Vec<_> = (0..2)
            .map(|me| {
                let barrier = barrier.clone();
                let arrivals = arrivals.clone();
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        arrivals[me].store(round + 1, Ordering::SeqCst);
                        barrier.enter();

                        // The partner has reached this round before either of us leaves it
                        assert!(arrivals[1 - me].load(Ordering::SeqCst) > round);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
