//! The contract every bug pattern implements.

use serde::{Deserialize, Serialize};

/// One of the two call sites of a bug.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Part {
    Zero,
    One,
}

impl Part {
    /// Both parts, in index order.
    pub const ALL: [Part; 2] = [Part::Zero, Part::One];

    /// Index of the part (`0` or `1`).
    pub const fn index(self) -> usize {
        match self {
            Part::Zero => 0,
            Part::One => 1,
        }
    }

    /// The part selected by the low bit of `value`.
    pub const fn from_bit(value: u32) -> Self {
        if value & 1 == 0 {
            Part::Zero
        } else {
            Part::One
        }
    }

    /// The other part.
    pub const fn other(self) -> Self {
        match self {
            Part::Zero => Part::One,
            Part::One => Part::Zero,
        }
    }

    /// Flag bit owned by the part in a before-relation slot.
    pub(crate) const fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl From<Part> for u8 {
    fn from(part: Part) -> Self {
        part.index() as u8
    }
}

impl TryFrom<u8> for Part {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Part::Zero),
            1 => Ok(Part::One),
            other => Err(format!("invalid part: {other}")),
        }
    }
}

/// A synthetic race between two call sites.
///
/// Everything inside [Pattern::run_part] is intentionally under-synchronized: the absence of
/// synchronization is the bug being benchmarked. The engine guarantees only that
/// [Pattern::reset_state] completes before either part starts a round and that both parts of
/// a round run concurrently.
pub trait Pattern: Send + Sync {
    /// Stable name of the pattern (used in manifests).
    fn name(&self) -> &'static str;

    /// Restore the pattern's shared state before a round.
    ///
    /// Called once per round, by part `0`, before either part runs. Must be idempotent.
    fn reset_state(&self);

    /// Run one side of the race, returning whether this invocation observed the bad outcome.
    fn run_part(&self, part: Part) -> bool;
}
