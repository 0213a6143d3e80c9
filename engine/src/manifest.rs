//! JSON description of a benchmark build.
//!
//! ```json
//! {
//!   "max_bugs": 4,
//!   "max_tries": 100,
//!   "bugs": [
//!     {
//!       "id": 0,
//!       "pattern": "lack-of-lock",
//!       "map": { "fields": [{ "offset": 0, "width": 2, "expected": 2701139038 }],
//!                "preferred": [1, 0], "pads": [17], "magic": 2701139055 }
//!     }
//!   ]
//! }
//! ```

use crate::{BugId, Config, Error, InputMap, Pattern, Registry};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

/// A bug of the benchmark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: BugId,
    /// Name of the pattern implementing the bug.
    pub pattern: String,
    pub map: InputMap,
}

/// Every bug of a benchmark and the limits it runs under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub max_bugs: usize,
    pub max_tries: u32,
    #[serde(default)]
    pub bugs: Vec<Entry>,
}

impl Manifest {
    /// An empty manifest using the default limits.
    pub fn new() -> Self {
        let cfg = Config::default();
        Self {
            max_bugs: cfg.max_bugs,
            max_tries: cfg.max_tries,
            bugs: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = fs::read(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Engine configuration with the manifest's limits applied over the defaults.
    pub fn config(&self) -> Config {
        Config {
            max_bugs: self.max_bugs,
            max_tries: self.max_tries,
            ..Default::default()
        }
    }

    /// Build a registry, resolving each entry's pattern with `factory`.
    pub fn registry<F>(&self, factory: F) -> Result<Registry, Error>
    where
        F: Fn(&str) -> Option<Box<dyn Pattern>>,
    {
        let mut registry = Registry::new(self.max_bugs);
        for entry in &self.bugs {
            let pattern = factory(&entry.pattern)
                .ok_or_else(|| Error::UnknownPattern(entry.pattern.clone()))?;
            registry.register(entry.id, entry.map.clone(), pattern)?;
        }
        debug!(bugs = registry.len(), "built registry from manifest");
        Ok(registry)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}
