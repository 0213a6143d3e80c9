//! Races around condition variables.

use racebench_engine::{Part, Pattern};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Condvar, Mutex, MutexGuard, PoisonError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Notice {
    ready: bool,
    sent: bool,
}

/// Part one notifies once and part zero waits for it.
///
/// Triggers when part zero arrives after the notification was already sent. A waiter that did
/// not check `sent` first would block forever on that path; part zero reports instead.
#[derive(Debug, Default)]
pub struct NotifyBeforeWait {
    notice: Mutex<Notice>,
    cv: Condvar,
}

impl Pattern for NotifyBeforeWait {
    fn name(&self) -> &'static str {
        "notify-before-wait"
    }

    fn reset_state(&self) {
        *lock(&self.notice) = Notice::default();
    }

    fn run_part(&self, part: Part) -> bool {
        let mut notice = lock(&self.notice);
        match part {
            Part::One => {
                notice.ready = true;
                self.cv.notify_one();
                notice.sent = true;
                false
            }
            Part::Zero => {
                let late = notice.sent;
                if !late {
                    while !notice.ready {
                        notice = self.cv.wait(notice).unwrap_or_else(PoisonError::into_inner);
                    }
                }
                notice.ready = false;
                late
            }
        }
    }
}

/// Part zero waits on a condition variable with `if` where it needed `while`.
///
/// Part one signals once before publishing a resource (a stray wakeup) and once after. Triggers
/// when part zero wakes on the stray signal and finds nothing published.
#[derive(Debug, Default)]
pub struct SpuriousWakeup {
    ready: AtomicBool,
    resource: Mutex<Option<Box<i32>>>,
    cv: Condvar,
}

impl Pattern for SpuriousWakeup {
    fn name(&self) -> &'static str {
        "spurious-wakeup"
    }

    fn reset_state(&self) {
        self.ready.store(false, Ordering::Relaxed);
        *lock(&self.resource) = None;
    }

    fn run_part(&self, part: Part) -> bool {
        match part {
            Part::One => {
                self.ready.store(false, Ordering::Relaxed);
                self.cv.notify_one();
                {
                    let mut resource = lock(&self.resource);
                    *resource = Some(Box::new(0));
                    self.ready.store(true, Ordering::Relaxed);
                }
                self.cv.notify_one();
                false
            }
            Part::Zero => {
                let mut resource = lock(&self.resource);
                if !self.ready.load(Ordering::Relaxed) {
                    resource = self
                        .cv
                        .wait(resource)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                let missing = resource.take().is_none();
                self.ready.store(false, Ordering::Relaxed);
                missing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{round, sequential};
    use racebench_macros::test_traced;

    #[test_traced]
    fn test_notify_before_wait_late_waiter() {
        let pattern = NotifyBeforeWait::default();
        assert_eq!(sequential(&pattern, [Part::One, Part::Zero]), [true, false]);
        assert!(!lock(&pattern.notice).ready);
    }

    #[test_traced]
    fn test_notify_before_wait_rounds() {
        let pattern = NotifyBeforeWait::default();
        for _ in 0..200 {
            let [_, one] = round(&pattern);
            assert!(!one);
        }
    }

    #[test_traced]
    fn test_spurious_wakeup_published_first() {
        let pattern = SpuriousWakeup::default();
        assert_eq!(sequential(&pattern, [Part::One, Part::Zero]), [false, false]);
        assert!(lock(&pattern.resource).is_none());
    }

    #[test_traced]
    fn test_spurious_wakeup_rounds() {
        let pattern = SpuriousWakeup::default();
        for _ in 0..200 {
            let [_, one] = round(&pattern);
            assert!(!one);
        }
    }
}
