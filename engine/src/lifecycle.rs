//! Load the fuzz input at startup and persist statistics at shutdown.
//!
//! [Engine::initialize] is fatal on a missing or unreadable input: no statistics are touched and
//! the caller is expected to exit with status `1`. [Engine::shutdown] never fails: statistics
//! I/O errors are logged and the process's counters are dropped. If any bug fired, shutdown
//! returns [Termination::Triggered] and [Termination::enforce] aborts the process so that a
//! monitoring harness observes a crash.

use crate::{persist, BugId, Config, Error, Outcome, Part, Registry, Stats};
use bytes::Bytes;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::{
    fs,
    ops::Deref,
    path::Path,
    process,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{error, info};

/// How a process ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// No bug fired.
    Clean,
    /// At least one bug fired.
    Triggered,
}

impl Termination {
    /// Abort the process if a bug fired.
    pub fn enforce(self) {
        if self == Termination::Triggered {
            error!("bug triggered, aborting");
            eprintln!("racebench: bug triggered");
            process::abort();
        }
    }
}

/// A benchmark process: the registry, the fuzz input, and the counters of this run.
pub struct Engine {
    cfg: Config,
    registry: Registry,
    input: Bytes,
    yields: Vec<u32>,
    stats: Stats,
}

impl Engine {
    /// Load the fuzz input at `input` and prepare the registry for invocation.
    ///
    /// The yield bias of every bug is derived from the process id and the wall clock.
    pub fn initialize(
        cfg: Config,
        registry: Registry,
        input: Option<&Path>,
    ) -> Result<Self, Error> {
        let path = input.ok_or(Error::MissingInput(cfg.input_arg))?;
        let bytes = fs::read(path).map_err(|e| Error::InputUnreadable(path.to_path_buf(), e))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let seed = (process::id() as u64).wrapping_add(now);
        info!(path = ?path, len = bytes.len(), "loaded input");
        Ok(Self::with_input(cfg, registry, Bytes::from(bytes), seed))
    }

    /// Like [Engine::initialize], reading the input path from `args` at [Config::input_arg].
    pub fn from_args<I>(cfg: Config, registry: Registry, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = String>,
    {
        let path = args.into_iter().nth(cfg.input_arg);
        Self::initialize(cfg, registry, path.as_deref().map(Path::new))
    }

    /// Create an engine over an in-memory input with a fixed yield seed.
    pub fn with_input(cfg: Config, registry: Registry, input: Bytes, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let yields = (0..cfg.max_bugs).map(|_| rng.next_u32()).collect();
        let stats = Stats::new(cfg.max_bugs);
        info!(
            bugs = registry.len(),
            max_bugs = cfg.max_bugs,
            max_tries = cfg.max_tries,
            seed,
            "engine initialized"
        );
        Self {
            cfg,
            registry,
            input,
            yields,
            stats,
        }
    }

    /// Invoke `part` of `bug`.
    ///
    /// Call sites of both parts are expected to invoke this concurrently from different threads.
    /// The body runs only when the other part is invoked at the same time, the retry budget has
    /// not been spent, and the input check passes.
    pub fn invoke(&self, bug: BugId, part: Part) -> Outcome {
        let Some(entry) = self.registry.get(bug) else {
            return Outcome::Unregistered;
        };
        let Some(&yields) = self.yields.get(bug) else {
            return Outcome::Unregistered;
        };
        entry.invoke(
            &self.stats,
            &self.input,
            yields,
            part,
            self.cfg.max_tries,
            self.cfg.pairing_spins,
        )
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Yield bias of `bug`: bit `i % 32` selects the part that yields before interleave slot `i`.
    pub fn yields(&self, bug: BugId) -> Option<u32> {
        self.yields.get(bug).copied()
    }

    /// Persist this process's counters and report whether any bug fired.
    pub fn shutdown(self) -> Termination {
        self.finish()
    }

    fn finish(&self) -> Termination {
        let path = self.cfg.stat_path();
        match persist(&path, &self.stats.snapshot()) {
            Ok(merged) => info!(path = ?path, total_run = merged.total_run, "persisted stats"),
            Err(e) => error!(path = ?path, error = ?e, "failed to persist stats"),
        }
        if self.stats.is_triggered() {
            Termination::Triggered
        } else {
            Termination::Clean
        }
    }

    /// Wrap the engine so that dropping it shuts down (and aborts if a bug fired).
    pub fn guard(self) -> ShutdownGuard {
        ShutdownGuard {
            engine: self,
            finished: false,
        }
    }
}

/// Runs [Engine::shutdown] and [Termination::enforce] when dropped, including on early returns.
pub struct ShutdownGuard {
    engine: Engine,
    finished: bool,
}

impl ShutdownGuard {
    /// Shut down now instead of on drop, without enforcing the outcome.
    pub fn shutdown(mut self) -> Termination {
        self.finished = true;
        self.engine.finish()
    }
}

impl Deref for ShutdownGuard {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.engine.finish().enforce();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InputMap, Pattern, Record};
    use racebench_macros::test_traced;
    use rand::{rngs::OsRng, Rng};
    use std::{env, path::PathBuf};

    struct Never;

    impl Pattern for Never {
        fn name(&self) -> &'static str {
            "never"
        }

        fn reset_state(&self) {}

        fn run_part(&self, _: Part) -> bool {
            false
        }
    }

    fn temp_path(prefix: &str) -> PathBuf {
        env::temp_dir().join(format!("{prefix}_{}", OsRng.gen::<u64>()))
    }

    fn config(stat: &Path) -> Config {
        Config {
            max_bugs: 4,
            stat_path: Some(stat.to_path_buf()),
            pairing_spins: 1_000,
            ..Default::default()
        }
    }

    #[test_traced]
    fn test_missing_input() {
        let cfg = Config::default();
        let registry = Registry::new(cfg.max_bugs);
        let args = vec!["bench".to_string()];
        assert!(matches!(
            Engine::from_args(cfg, registry, args),
            Err(Error::MissingInput(1))
        ));
    }

    #[test_traced]
    fn test_unreadable_input() {
        let cfg = Config::default();
        let registry = Registry::new(cfg.max_bugs);
        let missing = temp_path("rb_missing_input");
        let args = vec!["bench".to_string(), missing.display().to_string()];
        assert!(matches!(
            Engine::from_args(cfg, registry, args),
            Err(Error::InputUnreadable(path, _)) if path == missing
        ));
    }

    #[test_traced]
    fn test_initialize_reads_input() {
        let input = temp_path("rb_input");
        fs::write(&input, b"fuzz").unwrap();
        let cfg = Config {
            input_arg: 2,
            ..Default::default()
        };
        let registry = Registry::new(cfg.max_bugs);
        let args = vec![
            "bench".to_string(),
            "--flag".to_string(),
            input.display().to_string(),
        ];
        let engine = Engine::from_args(cfg, registry, args).unwrap();
        assert_eq!(engine.input(), b"fuzz");
        assert_eq!(engine.yields.len(), engine.config().max_bugs);
        fs::remove_file(&input).unwrap();
    }

    #[test_traced]
    fn test_yields_follow_seed() {
        let a = Engine::with_input(Config::default(), Registry::new(16), Bytes::new(), 42);
        let b = Engine::with_input(Config::default(), Registry::new(16), Bytes::new(), 42);
        let c = Engine::with_input(Config::default(), Registry::new(16), Bytes::new(), 43);
        assert_eq!(a.yields, b.yields);
        assert_ne!(a.yields, c.yields);
    }

    #[test_traced]
    fn test_invoke_unregistered() {
        let mut registry = Registry::new(2);
        registry
            .register(0, InputMap::default(), Box::new(Never))
            .unwrap();
        let cfg = Config {
            max_bugs: 1,
            ..Default::default()
        };
        let engine = Engine::with_input(cfg, registry, Bytes::new(), 0);
        assert_eq!(engine.invoke(1, Part::Zero), Outcome::Unregistered);
        assert_eq!(engine.invoke(9, Part::One), Outcome::Unregistered);
    }

    #[test_traced]
    fn test_clean_shutdown_persists() {
        let stat = temp_path("rb_stat_clean");
        let cfg = config(&stat);
        let mut registry = Registry::new(cfg.max_bugs);
        registry
            .register(2, InputMap::default(), Box::new(Never))
            .unwrap();
        let engine = Engine::with_input(cfg, registry, Bytes::new(), 0);
        std::thread::scope(|s| {
            for part in Part::ALL {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..1_000_000 {
                        if engine.stats().tried(2) >= 3 {
                            return;
                        }
                        engine.invoke(2, part);
                    }
                });
            }
        });
        assert_eq!(engine.shutdown(), Termination::Clean);

        let record = Record::decode(&fs::read(&stat).unwrap()[..], 4).unwrap();
        assert_eq!(record.total_run, 1);
        assert_eq!(record.tried, vec![0, 0, 3, 0]);
        assert_eq!(record.check_pass, vec![0, 0, 3, 0]);
        assert_eq!(record.trigger, vec![0; 4]);
        fs::remove_file(&stat).unwrap();
    }

    #[test_traced]
    fn test_shutdown_survives_bad_stat_file() {
        let stat = temp_path("rb_stat_bad");
        fs::write(&stat, [0u8; 3]).unwrap();
        let engine = Engine::with_input(config(&stat), Registry::new(4), Bytes::new(), 0);
        assert_eq!(engine.shutdown(), Termination::Clean);
        assert_eq!(fs::read(&stat).unwrap(), vec![0u8; 3]);
        fs::remove_file(&stat).unwrap();
    }

    #[test_traced]
    fn test_guard_shutdown() {
        let stat = temp_path("rb_stat_guard");
        let guard = Engine::with_input(config(&stat), Registry::new(4), Bytes::new(), 0).guard();
        assert_eq!(guard.config().max_bugs, 4);
        assert_eq!(guard.shutdown(), Termination::Clean);

        // Dropping a clean guard persists a second run
        drop(Engine::with_input(config(&stat), Registry::new(4), Bytes::new(), 0).guard());
        let record = Record::decode(&fs::read(&stat).unwrap()[..], 4).unwrap();
        assert_eq!(record.total_run, 2);
        fs::remove_file(&stat).unwrap();
    }
}
