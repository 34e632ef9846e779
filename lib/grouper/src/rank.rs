use crate::key::CountEntry;
use crate::run::SortedRun;
use rayon::prelude::*;
use std::io::{self, Write};

/// Final report order: count descending, then key ascending.
pub fn rank(run: SortedRun) -> Vec<CountEntry> {
    let mut entries = run.into_entries();
    entries.par_sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

/// `<N>` then one `<key> <count>` line per entry. Keys are written as raw bytes.
pub fn write_report<W: Write>(w: &mut W, ranked: &[CountEntry]) -> io::Result<()> {
    writeln!(w, "{}", ranked.len())?;
    for e in ranked {
        w.write_all(e.key.as_bytes())?;
        writeln!(w, " {}", e.count)?;
    }
    Ok(())
}
