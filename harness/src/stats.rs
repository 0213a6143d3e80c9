//! Print the counters of a statistics file.

use crate::Error;
use racebench_engine::Record;
use std::{fmt::Write, fs, path::Path};

pub const CMD: &str = "stats";

/// Read the record in `path`, inferring the number of bugs from its length.
pub fn load(path: &Path) -> Result<Record, Error> {
    let raw = fs::read(path)?;
    let bugs = Record::bugs_for_len(raw.len()).ok_or(Error::InvalidStatFile(raw.len()))?;
    Ok(Record::decode(raw.as_slice(), bugs)?)
}

/// Format one counter: its total, the number of bugs it is non-zero for, and every value.
fn line(out: &mut String, name: &str, values: &[u32]) {
    let total: u64 = values.iter().map(|&v| v as u64).sum();
    let nonzero = values.iter().filter(|&&v| v != 0).count();
    let _ = write!(out, "{name} ({total}, {nonzero}): {{");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "[{i}]={value}");
    }
    out.push_str("}\n");
}

/// Render `record` for display.
pub fn render(record: &Record) -> String {
    let mut out = format!("total_run: {}\n", record.total_run);
    line(&mut out, "tried", &record.tried);
    line(&mut out, "dua_pass", &record.dua_pass);
    line(&mut out, "check_pass", &record.check_pass);
    line(&mut out, "trigger", &record.trigger);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use racebench_macros::test_traced;
    use rand::{rngs::OsRng, Rng};
    use std::env;

    #[test_traced]
    fn test_render() {
        let mut record = Record::zeroed(3);
        record.total_run = 12;
        record.tried = vec![5, 0, 100];
        record.dua_pass = vec![5, 0, 1];
        record.check_pass = vec![1, 0, 1];
        record.trigger = vec![0, 0, 1];
        let expected = "\
total_run: 12
tried (105, 2): {[0]=5, [1]=0, [2]=100}
dua_pass (6, 2): {[0]=5, [1]=0, [2]=1}
check_pass (2, 2): {[0]=1, [1]=0, [2]=1}
trigger (1, 1): {[0]=0, [1]=0, [2]=1}
";
        assert_eq!(render(&record), expected);
    }

    #[test_traced]
    fn test_render_large_totals() {
        let mut record = Record::zeroed(2);
        record.trigger = vec![u32::MAX, u32::MAX];
        assert!(render(&record).contains("trigger (8589934590, 2)"));
    }

    #[test_traced]
    fn test_load() {
        let path = env::temp_dir().join(format!("rb_harness_stats_{}", OsRng.gen::<u64>()));
        let mut record = Record::zeroed(5);
        record.total_run = 3;
        record.trigger[4] = 2;
        fs::write(&path, record.encode()).unwrap();
        assert_eq!(load(&path).unwrap(), record);

        // Not a whole record
        fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(load(&path), Err(Error::InvalidStatFile(10))));
        fs::remove_file(&path).unwrap();
    }
}
