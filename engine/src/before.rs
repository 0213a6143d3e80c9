//! Record which part of a bug reaches an interleave point first.

use crate::{Barrier, Part};
use std::{
    sync::atomic::{AtomicU8, Ordering},
    thread,
};
use tracing::trace;

/// An interleave point shared by the two parts of a bug.
///
/// Both parts reach the slot once per round. The slot records which arrived first and reports,
/// identically to both, whether the preferred part won.
#[derive(Debug, Default)]
pub struct BeforeSlot {
    order: AtomicU8,
    barrier: Barrier,
}

impl BeforeSlot {
    /// Create a new [BeforeSlot] that no part has reached.
    pub const fn new() -> Self {
        Self {
            order: AtomicU8::new(0),
            barrier: Barrier::new(),
        }
    }

    /// Resolve the slot for `part`.
    ///
    /// Both parts first meet at the slot's barrier. If `yielder` is this part, it gives up the
    /// processor before racing for the order flag. The first part to set its bit wins and
    /// returns `part == preferred`; the second clears the flag (readying the slot for the next
    /// round) and returns `part != preferred`. Both parts therefore observe the same result:
    /// `true` exactly when `preferred` arrived first.
    pub fn resolve(&self, part: Part, preferred: Part, yielder: Part) -> bool {
        self.barrier.enter();
        if yielder == part {
            thread::yield_now();
        }

        self.decide(part, preferred)
    }

    /// Race for the order flag (the half of [BeforeSlot::resolve] after the rendezvous).
    fn decide(&self, part: Part, preferred: Part) -> bool {
        let prior = self.order.fetch_or(part.bit(), Ordering::AcqRel);
        let before = if prior == 0 {
            part == preferred
        } else {
            self.order.store(0, Ordering::Release);
            part != preferred
        };
        trace!(?part, ?preferred, first = prior == 0, before, "resolved slot");
        before
    }
}
