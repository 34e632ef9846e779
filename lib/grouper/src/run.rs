use crate::error::{Error, Result};
use crate::key::CountEntry;
use rayon::prelude::*;

/// Count entries in strictly increasing key order: no key appears twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortedRun {
    entries: Vec<CountEntry>,
}

impl SortedRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable sort by key, then fold equal neighbours into one entry.
    pub fn from_unsorted(mut entries: Vec<CountEntry>) -> Self {
        entries.par_sort_by(|a, b| a.key.cmp(&b.key));
        dedup_adjacent(&mut entries);
        Self::checked(entries)
    }

    /// Accepts entries that claim to already be a run, e.g. ones decoded off the wire.
    pub fn try_from_sorted(entries: Vec<CountEntry>) -> Result<Self> {
        if !is_strictly_sorted(&entries) {
            return Err(Error::Decode("run is not strictly increasing by key".into()));
        }
        if entries.iter().any(|e| e.count == 0) {
            return Err(Error::Decode("run contains a zero count".into()));
        }
        Ok(Self { entries })
    }

    /// Linear key-ordered interleave of two runs, equal keys summed.
    /// The result is written into a fresh buffer owned by the caller.
    pub fn merge(self, other: SortedRun) -> SortedRun {
        let (a, b) = (self.entries, other.entries);
        if a.is_empty() {
            return SortedRun { entries: b };
        }
        if b.is_empty() {
            return SortedRun { entries: a };
        }
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let mut left = a.into_iter().peekable();
        let mut right = b.into_iter().peekable();
        loop {
            let take_left = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => l.key <= r.key,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_left { left.next() } else { right.next() };
            merged.extend(next);
        }
        dedup_adjacent(&mut merged);
        Self::checked(merged)
    }

    pub fn entries(&self) -> &[CountEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CountEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts: the number of records this run represents.
    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    fn checked(entries: Vec<CountEntry>) -> Self {
        debug_assert!(is_strictly_sorted(&entries));
        Self { entries }
    }
}

/// Sum the counts of equal adjacent keys in place.
pub fn dedup_adjacent(entries: &mut Vec<CountEntry>) {
    entries.dedup_by(|next, kept| {
        if next.key == kept.key {
            kept.count += next.count;
            true
        } else {
            false
        }
    });
}

pub fn is_strictly_sorted(entries: &[CountEntry]) -> bool {
    entries.windows(2).all(|w| w[0].key < w[1].key)
}
