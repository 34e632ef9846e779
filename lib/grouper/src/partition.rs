//! Record-aligned byte ranges, one per worker.
//!
//! The buffer is split evenly by bytes, then every worker but the first moves its
//! start back to just after the nearest preceding newline, so the record its
//! candidate start landed in becomes its own. Each worker ends where the next one
//! starts and the last ends at the buffer length.
//!
//! If a worker's backward scan finds no newline at all, its start collapses to
//! offset 0. Starts never decrease, so several workers can end up sharing a start;
//! the lowest-index one owns that span and the rest get an empty range. A single
//! record covering the whole buffer therefore belongs to worker 0.

use memchr::{memchr, memrchr};
use std::ops::Range;
use tracing::debug;

/// The even byte split for worker `index` of `workers`, before boundary correction.
/// The first `len % workers` workers take one extra byte.
pub fn candidate_range(len: usize, index: usize, workers: usize) -> Range<usize> {
    let chunk = len / workers;
    let remainder = len % workers;
    let start = index * chunk + index.min(remainder);
    let end = start + chunk + usize::from(index < remainder);
    start..end
}

/// Start of the record containing byte `pos`: one past the nearest newline before it.
pub fn record_start(bytes: &[u8], pos: usize) -> usize {
    memrchr(b'\n', &bytes[..pos]).map(|nl| nl + 1).unwrap_or(0)
}

/// Record-aligned, disjoint ranges whose concatenation is exactly `bytes`.
pub fn partition(bytes: &[u8], workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let len = bytes.len();
    let starts: Vec<usize> = (0..workers)
        .map(|i| {
            if i == 0 {
                return 0;
            }
            let candidate = candidate_range(len, i, workers).start;
            let start = record_start(bytes, candidate);
            if start == 0 && candidate > 0 {
                debug!(worker = i, candidate, "no newline before candidate start; collapsing to offset 0");
            }
            start
        })
        .collect();

    (0..workers)
        .map(|i| {
            let start = starts[i];
            if i > 0 && starts[i - 1] == start {
                return start..start;
            }
            let end = starts[i + 1..].iter().copied().find(|&s| s > start).unwrap_or(len);
            start..end
        })
        .collect()
}

/// Iterator over the records of a record-aligned slice.
///
/// Every `\n` terminates one record, so a blank line is a record with the empty
/// key. Bytes are kept as they are, `\r` included. Whatever follows the last
/// `\n` is a record only if it is non-empty.
pub struct Records<'a> {
    bytes: &'a [u8],
    pos: usize,
}

pub fn records(bytes: &[u8]) -> Records<'_> {
    Records { bytes, pos: 0 }
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let (line, advance) = match memchr(b'\n', rest) {
            Some(nl) => (&rest[..nl], nl + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(line)
    }
}
