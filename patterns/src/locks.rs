//! Races around mutual exclusion.

use racebench_engine::{Part, Pattern};
use std::{
    sync::{
        atomic::{fence, AtomicI32, AtomicI8, Ordering},
        Mutex, MutexGuard, PoisonError, TryLockError,
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns whether `mutex` is held elsewhere, taking and releasing it otherwise.
fn contended<T>(mutex: &Mutex<T>) -> bool {
    matches!(mutex.try_lock(), Err(TryLockError::WouldBlock))
}

/// Each part takes one lock and then tries the other, in opposite orders.
///
/// Triggers when a part finds its second lock held by the other part (where a blocking
/// acquisition would deadlock).
#[derive(Debug, Default)]
pub struct DiffLockOrder {
    first: Mutex<()>,
    second: Mutex<()>,
}

impl Pattern for DiffLockOrder {
    fn name(&self) -> &'static str {
        "diff-lock-order"
    }

    fn reset_state(&self) {}

    fn run_part(&self, part: Part) -> bool {
        let (outer, inner) = match part {
            Part::One => (&self.first, &self.second),
            Part::Zero => (&self.second, &self.first),
        };
        let _outer = lock(outer);
        contended(inner)
    }
}

/// Both parts increment a counter and read it back, but only part one holds the lock.
///
/// Triggers when a part reads back a value other than the one it wrote.
#[derive(Debug, Default)]
pub struct LackOfLock {
    guard: Mutex<()>,
    value: AtomicI32,
}

impl LackOfLock {
    fn bump(&self) -> bool {
        let next = self.value.load(Ordering::Relaxed) + 1;
        self.value.store(next, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        self.value.load(Ordering::Relaxed) != next
    }
}

impl Pattern for LackOfLock {
    fn name(&self) -> &'static str {
        "lack-of-lock"
    }

    fn reset_state(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    fn run_part(&self, part: Part) -> bool {
        match part {
            Part::One => {
                let _guard = lock(&self.guard);
                self.bump()
            }
            Part::Zero => self.bump(),
        }
    }
}

/// A resource is published and retired in two critical sections where one was needed.
///
/// Part one publishes under the lock, releases it, and consumes under a second acquisition.
/// Part zero publishes and consumes in a single critical section, retiring the resource part
/// one published. Triggers when part one finds nothing to consume.
#[derive(Debug, Default)]
pub struct SplitCriticalRegion {
    resource: Mutex<Option<Box<i32>>>,
}

impl Pattern for SplitCriticalRegion {
    fn name(&self) -> &'static str {
        "split-critical-region"
    }

    fn reset_state(&self) {
        *lock(&self.resource) = None;
    }

    fn run_part(&self, part: Part) -> bool {
        if part == Part::One {
            *lock(&self.resource) = Some(Box::new(0));
        }
        let mut resource = lock(&self.resource);
        if part == Part::Zero {
            *resource = Some(Box::new(0));
        }
        resource.take().is_none()
    }
}

/// Part zero sleeps instead of synchronizing and assumes part one went first by the time it
/// wakes.
///
/// Triggers when part zero still finds itself first.
#[derive(Debug)]
pub struct TimedWait {
    delay: Duration,
    first: Mutex<Option<Part>>,
}

impl TimedWait {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            first: Mutex::new(None),
        }
    }

    /// Claim the first arrival, returning whether this part got it.
    fn arrive(&self, part: Part) -> bool {
        let mut first = lock(&self.first);
        match *first {
            None => {
                *first = Some(part);
                true
            }
            Some(_) => {
                *first = None;
                false
            }
        }
    }
}

impl Default for TimedWait {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl Pattern for TimedWait {
    fn name(&self) -> &'static str {
        "timed-wait"
    }

    fn reset_state(&self) {
        *lock(&self.first) = None;
    }

    fn run_part(&self, part: Part) -> bool {
        match part {
            Part::One => {
                self.arrive(part);
                false
            }
            Part::Zero => {
                thread::sleep(self.delay);
                self.arrive(part)
            }
        }
    }
}

const UNSET: i8 = -1;
const KEPT: i8 = 0;
const RELEASED: i8 = 1;

/// Returns `true` in one of every ten wall-clock seconds.
fn every_tenth_second() -> bool {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| now.as_secs() % 10 == 0)
        .unwrap_or(false)
}

/// On some path part zero keeps the lock it should have released.
///
/// Whichever part locks first records itself. When part zero is first it normally releases the
/// lock and announces the release. When `keep` holds it announces that it keeps the lock instead
/// and holds it until part one notices. Triggers on both parts when the lock is kept.
#[derive(Debug)]
pub struct LockNoRelease {
    keep: fn() -> bool,
    guard: Mutex<()>,
    first: AtomicI8,
    released: AtomicI8,
}

impl LockNoRelease {
    /// Create a pattern that keeps the lock whenever `keep` returns `true`.
    pub fn new(keep: fn() -> bool) -> Self {
        Self {
            keep,
            guard: Mutex::new(()),
            first: AtomicI8::new(UNSET),
            released: AtomicI8::new(UNSET),
        }
    }

    fn run_one(&self) -> bool {
        // Spins until the lock is free or part zero announces it is keeping it. Part zero
        // always does one or the other within the round.
        let guard = loop {
            match self.guard.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(poisoned)) => break poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
            if self.released.load(Ordering::Relaxed) == KEPT {
                self.first.store(UNSET, Ordering::Relaxed);
                self.released.store(UNSET, Ordering::Relaxed);
                return true;
            }
            thread::yield_now();
        };
        if self.first.load(Ordering::Relaxed) == UNSET {
            self.first.store(Part::One.index() as i8, Ordering::Relaxed);
        } else {
            // Part zero went first and announces its release right after unlocking
            self.first.store(UNSET, Ordering::Relaxed);
            while self.released.load(Ordering::Relaxed) == UNSET {
                thread::yield_now();
            }
            self.released.store(UNSET, Ordering::Relaxed);
        }
        drop(guard);
        false
    }

    fn run_zero(&self) -> bool {
        let guard = lock(&self.guard);
        if self.first.load(Ordering::Relaxed) != UNSET {
            self.first.store(UNSET, Ordering::Relaxed);
            return false;
        }
        self.first.store(Part::Zero.index() as i8, Ordering::Relaxed);
        if !(self.keep)() {
            drop(guard);
            self.released.store(RELEASED, Ordering::Relaxed);
            return false;
        }

        // Hold the lock until part one notices, which it does while spinning on it
        self.released.store(KEPT, Ordering::Relaxed);
        while self.released.load(Ordering::Relaxed) != UNSET {
            thread::yield_now();
        }
        drop(guard);
        true
    }
}

impl Default for LockNoRelease {
    fn default() -> Self {
        Self::new(every_tenth_second)
    }
}

impl Pattern for LockNoRelease {
    fn name(&self) -> &'static str {
        "lock-no-release"
    }

    fn reset_state(&self) {
        self.first.store(UNSET, Ordering::Relaxed);
        self.released.store(UNSET, Ordering::Relaxed);
    }

    fn run_part(&self, part: Part) -> bool {
        match part {
            Part::Zero => self.run_zero(),
            Part::One => self.run_one(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{round, sequential};
    use racebench_macros::test_traced;

    #[test_traced]
    fn test_diff_lock_order() {
        let pattern = DiffLockOrder::default();
        assert_eq!(sequential(&pattern, [Part::Zero, Part::One]), [false, false]);

        // Part one holds the first lock while part zero reaches for it
        let _held = lock(&pattern.first);
        assert!(pattern.run_part(Part::Zero));
    }

    #[test_traced]
    fn test_lack_of_lock() {
        let pattern = LackOfLock::default();
        assert_eq!(sequential(&pattern, [Part::Zero, Part::One]), [false, false]);
        assert_eq!(pattern.value.load(Ordering::Relaxed), 2);
        pattern.reset_state();
        assert_eq!(pattern.value.load(Ordering::Relaxed), 0);
    }

    #[test_traced]
    fn test_split_critical_region() {
        let pattern = SplitCriticalRegion::default();
        assert_eq!(sequential(&pattern, [Part::One, Part::Zero]), [false, false]);
        assert!(lock(&pattern.resource).is_none());
        for _ in 0..100 {
            round(&pattern);
        }
    }

    #[test_traced]
    fn test_timed_wait() {
        let pattern = TimedWait::new(Duration::ZERO);

        // Part one first: part zero's assumption holds
        assert_eq!(sequential(&pattern, [Part::One, Part::Zero]), [false, false]);

        // Part zero first: it finds itself first
        assert_eq!(sequential(&pattern, [Part::Zero, Part::One]), [true, false]);

        // The sleep lets part one in first almost always
        let pattern = TimedWait::new(Duration::from_millis(50));
        let [zero, one] = round(&pattern);
        assert!(!one);
        assert!(!zero);
    }

    #[test_traced]
    fn test_lock_no_release_released() {
        let pattern = LockNoRelease::new(|| false);
        assert_eq!(sequential(&pattern, [Part::Zero, Part::One]), [false, false]);
        assert_eq!(pattern.first.load(Ordering::Relaxed), UNSET);
        assert_eq!(pattern.released.load(Ordering::Relaxed), UNSET);
        for _ in 0..100 {
            assert_eq!(round(&pattern), [false, false]);
        }
    }

    #[test_traced]
    fn test_lock_no_release_kept() {
        let pattern = LockNoRelease::new(|| true);
        for _ in 0..100 {
            // Either part one locked first (no trigger) or both saw the kept lock
            let [zero, one] = round(&pattern);
            assert_eq!(zero, one);
            assert_eq!(pattern.released.load(Ordering::Relaxed), UNSET);
        }
    }
}
