//! Engine limits and the location of the statistics file.

use std::{env, path::PathBuf};

/// Environment variable overriding the statistics file path.
pub const STAT_PATH_ENV: &str = "RACEBENCH_STAT";

/// Statistics file used when neither [Config::stat_path] nor [STAT_PATH_ENV] is set.
pub const DEFAULT_STAT_PATH: &str = ".rb_stat";

/// Configuration for an [crate::Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of bug ids in the benchmark (the length of every per-bug array).
    pub max_bugs: usize,

    /// Maximum number of paired rounds attempted per bug per process.
    pub max_tries: u32,

    /// Process argument slot holding the path of the fuzz input.
    pub input_arg: usize,

    /// Statistics file (takes precedence over [STAT_PATH_ENV]).
    pub stat_path: Option<PathBuf>,

    /// Number of times a lone arrival yields while waiting for its partner before
    /// abandoning the round. With `0`, a part only pairs if its partner has already
    /// arrived.
    pub pairing_spins: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_bugs: 16,
            max_tries: 100,
            input_arg: 1,
            stat_path: None,
            pairing_spins: 64,
        }
    }
}

impl Config {
    /// Resolve the statistics file path.
    pub fn stat_path(&self) -> PathBuf {
        if let Some(path) = &self.stat_path {
            return path.clone();
        }
        match env::var_os(STAT_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_STAT_PATH),
        }
    }
}
