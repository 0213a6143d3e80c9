//! Map bug ids to their pattern and runtime state.

use crate::{
    Barrier, BeforeSlot, BugId, Error, InputMap, Outcome, Part, Pattern, Stats, Synchronizer,
};
use tracing::debug;

/// A registered bug: its pattern, trigger condition, and all per-bug runtime state.
pub struct Bug {
    id: BugId,
    map: InputMap,
    pattern: Box<dyn Pattern>,
    sync: Synchronizer,
    slots: Box<[BeforeSlot]>,
    entry: Barrier,
}

impl Bug {
    fn new(id: BugId, map: InputMap, pattern: Box<dyn Pattern>) -> Self {
        let slots = (0..map.slots()).map(|_| BeforeSlot::new()).collect();
        Self {
            id,
            map,
            pattern,
            sync: Synchronizer::new(),
            slots,
            entry: Barrier::new(),
        }
    }

    pub fn id(&self) -> BugId {
        self.id
    }

    pub fn map(&self) -> &InputMap {
        &self.map
    }

    pub fn pattern(&self) -> &dyn Pattern {
        self.pattern.as_ref()
    }

    /// Invoke `part` of the bug: pair with the other part, check the input, and run the body.
    pub(crate) fn invoke(
        &self,
        stats: &Stats,
        input: &[u8],
        yields: u32,
        part: Part,
        max_tries: u32,
        spins: u32,
    ) -> Outcome {
        self.sync.run(stats, self.id, part, max_tries, spins, |part| {
            self.map
                .check(&self.slots, input, yields, stats, self.id, part, |part| {
                    self.body(stats, part)
                })
        })
    }

    /// Run the pattern body once the round passed its input check.
    fn body(&self, stats: &Stats, part: Part) -> bool {
        if part == Part::Zero {
            stats.record_check_pass(self.id);
            self.pattern.reset_state();
        }

        // The reset must be visible before either part starts
        self.entry.enter();
        self.pattern.run_part(part)
    }
}

impl std::fmt::Debug for Bug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bug")
            .field("id", &self.id)
            .field("pattern", &self.pattern.name())
            .field("map", &self.map)
            .finish()
    }
}

/// Bugs of a benchmark, indexed by id.
#[derive(Debug)]
pub struct Registry {
    bugs: Vec<Option<Bug>>,
}

impl Registry {
    /// Create an empty registry accepting ids below `max_bugs`.
    pub fn new(max_bugs: usize) -> Self {
        Self {
            bugs: (0..max_bugs).map(|_| None).collect(),
        }
    }

    /// Register `pattern` under `id`, gated by `map`.
    pub fn register(
        &mut self,
        id: BugId,
        map: InputMap,
        pattern: Box<dyn Pattern>,
    ) -> Result<(), Error> {
        let max_bugs = self.bugs.len();
        let slot = self
            .bugs
            .get_mut(id)
            .ok_or(Error::BugOutOfRange(id, max_bugs))?;
        if slot.is_some() {
            return Err(Error::DuplicateBug(id));
        }
        map.validate()?;
        debug!(bug = id, pattern = pattern.name(), "registered bug");
        *slot = Some(Bug::new(id, map, pattern));
        Ok(())
    }

    /// Get the bug registered under `id`.
    pub fn get(&self, id: BugId) -> Option<&Bug> {
        self.bugs.get(id).and_then(Option::as_ref)
    }

    /// Number of ids the registry accepts.
    pub fn max_bugs(&self) -> usize {
        self.bugs.len()
    }

    /// Number of registered bugs.
    pub fn len(&self) -> usize {
        self.bugs.iter().filter(|bug| bug.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of registered bugs, ascending.
    pub fn ids(&self) -> impl Iterator<Item = BugId> + '_ {
        self.bugs
            .iter()
            .enumerate()
            .filter_map(|(id, bug)| bug.as_ref().map(|_| id))
    }
}
