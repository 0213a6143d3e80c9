//! Synthetic race conditions for the racebench engine.
//!
//! Every pattern implements [racebench_engine::Pattern]: two call sites that, run concurrently,
//! race on some shared state in a way a real program might. Each reports whether its side
//! observed the bad outcome. Shared state is modelled with relaxed atomics and standard locks,
//! so a race changes what a part observes without being undefined behaviour.
//!
//! Patterns are addressed by name in bug manifests (see [by_name] and [NAMES]).

use racebench_engine::Pattern;

mod locks;
pub use locks::{DiffLockOrder, LackOfLock, LockNoRelease, SplitCriticalRegion, TimedWait};
mod order;
pub use order::{DisorderDepend, NonAtomicArith};
mod signal;
pub use signal::{NotifyBeforeWait, SpuriousWakeup};

/// Names of all patterns, as accepted by [by_name].
pub const NAMES: [&str; 9] = [
    "diff-lock-order",
    "disorder-depend",
    "lack-of-lock",
    "lock-no-release",
    "non-atomic-arith",
    "notify-before-wait",
    "split-critical-region",
    "spurious-wakeup",
    "timed-wait",
];

/// Create the pattern named `name` in its default configuration.
pub fn by_name(name: &str) -> Option<Box<dyn Pattern>> {
    let pattern: Box<dyn Pattern> = match name {
        "diff-lock-order" => Box::<DiffLockOrder>::default(),
        "disorder-depend" => Box::<DisorderDepend>::default(),
        "lack-of-lock" => Box::<LackOfLock>::default(),
        "lock-no-release" => Box::<LockNoRelease>::default(),
        "non-atomic-arith" => Box::<NonAtomicArith>::default(),
        "notify-before-wait" => Box::<NotifyBeforeWait>::default(),
        "split-critical-region" => Box::<SplitCriticalRegion>::default(),
        "spurious-wakeup" => Box::<SpuriousWakeup>::default(),
        "timed-wait" => Box::<TimedWait>::default(),
        _ => return None,
    };
    Some(pattern)
}
