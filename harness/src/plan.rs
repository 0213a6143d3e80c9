//! Add a bug to a manifest, gated on a known-good input.

use crate::Error;
use racebench_engine::{Entry, InputMap, Manifest};
use racebench_patterns::NAMES;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, path::Path};
use tracing::info;

pub const CMD: &str = "plan";

/// Default number of interleave slots per bug.
pub const DEFAULT_INTERLEAVE: &str = "1";

/// Parse a field given as `<offset>:<width>`.
pub fn parse_field(raw: &str) -> Result<(u32, u8), Error> {
    let invalid = || Error::InvalidField(raw.to_string());
    let (offset, width) = raw.split_once(':').ok_or_else(invalid)?;
    let offset = offset.trim().parse().map_err(|_| invalid())?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    Ok((offset, width))
}

/// What to plan.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: usize,
    /// Pattern name (drawn at random when absent).
    pub pattern: Option<String>,
    pub fields: Vec<(u32, u8)>,
    pub interleave: usize,
    pub seed: u64,
}

/// Add the bug described by `request` to `manifest`, gated on the bytes of `input`.
pub fn plan(manifest: &mut Manifest, input: &[u8], request: &Request) -> Result<(), Error> {
    if manifest.bugs.iter().any(|entry| entry.id == request.id) {
        return Err(Error::DuplicateBug(request.id));
    }
    let mut rng = StdRng::seed_from_u64(request.seed);
    let pattern = match &request.pattern {
        Some(pattern) => pattern.clone(),
        None => NAMES[rng.gen_range(0..NAMES.len())].to_string(),
    };
    if racebench_patterns::by_name(&pattern).is_none() {
        return Err(racebench_engine::Error::UnknownPattern(pattern).into());
    }
    let map = InputMap::plan(&mut rng, input, &request.fields, request.interleave)?;
    info!(
        id = request.id,
        pattern = pattern.as_str(),
        fields = map.fields.len(),
        slots = map.slots(),
        magic = map.magic,
        "planned bug"
    );
    manifest.bugs.push(Entry {
        id: request.id,
        pattern,
        map,
    });
    manifest.bugs.sort_by_key(|entry| entry.id);
    manifest.max_bugs = manifest.max_bugs.max(request.id + 1);
    Ok(())
}

/// Plan a bug against the input file at `input`.
///
/// With a manifest path, the bug is added to that manifest (created if absent) and the result is
/// written back. Returns the JSON of the updated manifest.
pub fn plan_file(
    input: &Path,
    manifest: Option<&Path>,
    request: &Request,
) -> Result<String, Error> {
    let bytes = fs::read(input)?;
    let mut current = match manifest {
        Some(path) if path.exists() => Manifest::load(path)?,
        _ => Manifest::new(),
    };
    plan(&mut current, &bytes, request)?;
    if let Some(path) = manifest {
        current.save(path)?;
    }
    Ok(current.to_json()?)
}
