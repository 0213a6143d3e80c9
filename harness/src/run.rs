//! Drive every bug of a benchmark from concurrent threads.

use crate::Error;
use racebench_engine::{Engine, Manifest, Outcome, Part, Registry};
use std::{path::Path, thread};
use tracing::{debug, info};

pub const CMD: &str = "run";

/// Default number of threads per part per bug.
pub const DEFAULT_THREADS: &str = "1";

/// Default number of invocations per thread.
pub const DEFAULT_ROUNDS: &str = "1000";

/// Build the registry of `manifest` from the pattern catalogue.
pub fn registry(manifest: &Manifest) -> Result<Registry, Error> {
    Ok(manifest.registry(racebench_patterns::by_name)?)
}

/// Invoke every registered bug: `threads` threads per part, each making up to `rounds`
/// invocations. A thread stops early once its bug's budget is spent.
pub fn drive(engine: &Engine, threads: usize, rounds: usize) {
    thread::scope(|s| {
        for bug in engine.registry().ids() {
            for part in Part::ALL {
                for _ in 0..threads {
                    s.spawn(move || {
                        for _ in 0..rounds {
                            if engine.invoke(bug, part) == Outcome::Exhausted {
                                break;
                            }
                        }
                    });
                }
            }
        }
    });
    for bug in engine.registry().ids() {
        let stats = engine.stats();
        debug!(
            bug,
            tried = stats.tried(bug),
            dua_pass = stats.dua_pass(bug),
            check_pass = stats.check_pass(bug),
            trigger = stats.trigger(bug),
            "bug finished"
        );
    }
}

/// Run the benchmark described by `manifest` against the fuzz input at `input`.
///
/// Fails without touching the statistics file if the manifest or input cannot be loaded.
/// Otherwise persists the statistics of the run and aborts the process if any bug fired.
pub fn run(
    manifest: &Path,
    input: Option<&Path>,
    threads: usize,
    rounds: usize,
) -> Result<(), Error> {
    let manifest = Manifest::load(manifest)?;
    let registry = registry(&manifest)?;
    let engine = Engine::initialize(manifest.config(), registry, input)?.guard();
    info!(
        bugs = engine.registry().len(),
        threads,
        rounds,
        "running benchmark"
    );
    drive(&engine, threads, rounds);
    info!(triggered = engine.stats().is_triggered(), "benchmark finished");
    Ok(())
}
