//! Gate bug bodies on bytes of the fuzz input.
//!
//! An [InputMap] names a handful of fields in the fuzz input and the obfuscated value each must
//! hold, plus a list of interleave slots with the part that should reach each first. A round runs
//! the bug body only when the sum of the extracted field tokens (and padding constants), each
//! weighted by its slot's before-relation outcome, equals the map's magic value.

use crate::{BeforeSlot, BugId, Error, Part, Stats};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Widest field (in bytes) that can be extracted from the input.
const MAX_WIDTH: u8 = 4;

/// Map a raw field value to the token compared against [Field::expected].
///
/// The transform is fixed and invertible. It exists to keep the trigger condition from being
/// read directly off the input bytes, not to provide any secrecy.
pub const fn obfuscate(x: u32) -> u32 {
    let x = x ^ 0xda01_7281;
    let x = x.wrapping_add(0x1010_1014);
    x.rotate_left(4)
}

/// A little-endian field of the fuzz input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Byte offset of the field.
    pub offset: u32,
    /// Width of the field in bytes (`1..=4`).
    pub width: u8,
    /// Obfuscated value the field must hold.
    pub expected: u32,
}

impl Field {
    /// Extract the field from `input` and obfuscate it.
    ///
    /// A field starting past the end of the input yields `0`. A field running past the end is
    /// zero-padded.
    pub fn token(&self, input: &[u8]) -> u32 {
        let offset = self.offset as usize;
        let Some(tail) = input.get(offset..) else {
            return 0;
        };
        if tail.is_empty() {
            return 0;
        }
        let mut raw = [0u8; 4];
        let len = tail.len().min(self.width as usize);
        raw[..len].copy_from_slice(&tail[..len]);
        obfuscate(u32::from_le_bytes(raw) & mask(self.width))
    }
}

/// Mask selecting the low `width` bytes of a word.
const fn mask(width: u8) -> u32 {
    if width >= MAX_WIDTH {
        u32::MAX
    } else {
        (1u32 << (width as u32 * 8)) - 1
    }
}

/// Trigger condition of a single bug.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMap {
    /// Fields extracted from the input.
    pub fields: Vec<Field>,
    /// Part expected to reach each interleave slot first.
    pub preferred: Vec<Part>,
    /// Constants standing in for fields at slots beyond the last field.
    pub pads: Vec<u32>,
    /// Value the weighted sum must equal.
    pub magic: u32,
}

impl InputMap {
    /// Number of interleave slots.
    pub fn slots(&self) -> usize {
        self.preferred.len()
    }

    /// Number of terms in the weighted sum.
    fn terms(&self) -> usize {
        self.fields.len().max(self.preferred.len())
    }

    /// Ensure the map is well-formed.
    pub fn validate(&self) -> Result<(), Error> {
        for field in &self.fields {
            if field.width == 0 || field.width > MAX_WIDTH {
                return Err(Error::InvalidMap(format!(
                    "field at offset {} has width {}",
                    field.offset, field.width
                )));
            }
        }
        let pads = self.slots().saturating_sub(self.fields.len());
        if self.pads.len() != pads {
            return Err(Error::InvalidMap(format!(
                "expected {} pads, found {}",
                pads,
                self.pads.len()
            )));
        }
        Ok(())
    }

    /// Build a map that passes for `input`.
    ///
    /// Each `(offset, width)` becomes a field expecting the token `input` holds there. Preferred
    /// parts and pads are drawn from `rng`. The magic value assumes every before-relation holds,
    /// so a round passes only with the right input and the right interleaving.
    pub fn plan<R: Rng>(
        rng: &mut R,
        input: &[u8],
        fields: &[(u32, u8)],
        slots: usize,
    ) -> Result<Self, Error> {
        let fields = fields
            .iter()
            .map(|&(offset, width)| {
                let field = Field {
                    offset,
                    width,
                    expected: 0,
                };
                let end = offset as usize + width as usize;
                if width == 0 || width > MAX_WIDTH || end > input.len() {
                    return Err(Error::InvalidMap(format!(
                        "field {offset}+{width} outside input of {} bytes",
                        input.len()
                    )));
                }
                let expected = field.token(input);
                Ok(Field { expected, ..field })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let preferred = (0..slots).map(|_| Part::from_bit(rng.gen())).collect();
        let pads = (0..slots.saturating_sub(fields.len()))
            .map(|_| rng.gen())
            .collect::<Vec<u32>>();
        let magic = fields
            .iter()
            .map(|f| f.expected)
            .chain(pads.iter().copied())
            .fold(0u32, u32::wrapping_add);
        Ok(Self {
            fields,
            preferred,
            pads,
            magic,
        })
    }

    /// Evaluate the trigger condition for one part of a round, calling `on_pass` if it holds.
    ///
    /// Both parts must call this concurrently: every interleave slot is a rendezvous. `yields`
    /// selects, per slot, which part gives up the processor before racing for the slot.
    ///
    /// Part `0` counts a dua-pass whenever every field holds its expected token, whether or not
    /// the interleaving matched.
    ///
    /// A map short of pads or of `slots` (one that would fail [InputMap::validate]) fails the
    /// check before any rendezvous, so both parts return `false` without counting anything.
    #[allow(clippy::too_many_arguments)]
    pub fn check<F>(
        &self,
        slots: &[BeforeSlot],
        input: &[u8],
        yields: u32,
        stats: &Stats,
        bug: BugId,
        part: Part,
        on_pass: F,
    ) -> bool
    where
        F: FnOnce(Part) -> bool,
    {
        let pads = self.terms() - self.fields.len();
        if self.pads.len() < pads || slots.len() < self.slots() {
            trace!(
                bug,
                ?part,
                pads = self.pads.len(),
                slots = slots.len(),
                "malformed input map"
            );
            return false;
        }

        let mut correct = true;
        let mut sum = 0u32;
        for i in 0..self.terms() {
            let value = match self.fields.get(i) {
                Some(field) => {
                    let token = field.token(input);
                    correct &= token == field.expected;
                    token
                }
                None => self.pads[i - self.fields.len()],
            };
            let before = match self.preferred.get(i) {
                Some(&preferred) => {
                    let yielder = Part::from_bit(yields >> (i % 32));
                    slots[i].resolve(part, preferred, yielder)
                }
                None => true,
            };
            sum = sum.wrapping_add(value.wrapping_mul(before as u32));
        }

        if part == Part::Zero && correct {
            stats.record_dua_pass(bug);
        }
        if sum != self.magic {
            trace!(bug, ?part, sum, magic = self.magic, "input check failed");
            return false;
        }
        on_pass(part)
    }
}
