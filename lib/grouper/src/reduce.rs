//! Logarithmic-depth combination of per-worker runs.
//!
//! At step `s = 1, 2, 4, …` a worker whose index is a multiple of `2s` receives
//! the run of `index + s` (when that worker exists) and merges it into its own;
//! any other still-active worker sends its run to `index - s` and drops out.
//! After `ceil(log2 W)` steps worker 0 holds the global run.

use crate::error::Result;
use crate::run::SortedRun;
use tracing::debug;

/// Point-to-point delivery of runs between workers.
///
/// Each exchange is a rendezvous: `send` returns only once the peer has taken the
/// run, and `recv` blocks until a run arrives. A peer that disappears must turn
/// into an error on the other side, never into a silently missing run.
pub trait Transport {
    fn send(&self, to: usize, run: SortedRun) -> Result<()>;
    fn recv(&self, from: usize) -> Result<SortedRun>;
}

/// One `(from, to, step)` triple per exchange the tree performs for `workers`.
pub fn tree_edges(workers: usize) -> Vec<(usize, usize, usize)> {
    let mut edges = Vec::new();
    let mut step = 1;
    while step < workers {
        for to in (0..workers).step_by(2 * step) {
            let from = to + step;
            if from < workers {
                edges.push((from, to, step));
            }
        }
        step *= 2;
    }
    edges
}

/// Number of sequential merge stages for `workers`: `ceil(log2 workers)`.
pub fn reduction_steps(workers: usize) -> u32 {
    workers.max(1).next_power_of_two().trailing_zeros()
}

/// Runs this worker's side of the tree. Returns the global run on worker 0 and
/// `None` on every worker that handed its run off.
pub fn reduce_tree<T: Transport + ?Sized>(
    rank: usize,
    workers: usize,
    mut run: SortedRun,
    transport: &T,
) -> Result<Option<SortedRun>> {
    let mut step = 1;
    while step < workers {
        if rank % (2 * step) == 0 {
            let from = rank + step;
            if from < workers {
                let incoming = transport.recv(from)?;
                debug!(rank, from, step, local = run.len(), incoming = incoming.len(), "merging run");
                run = run.merge(incoming);
            }
        } else {
            let to = rank - step;
            debug!(rank, to, step, entries = run.len(), "sending run");
            transport.send(to, run)?;
            return Ok(None);
        }
        step *= 2;
    }
    Ok(Some(run))
}

/// The same tree shape for runs already in one address space, halves merged in parallel.
pub fn fan_in(mut runs: Vec<SortedRun>) -> SortedRun {
    match runs.len() {
        0 => SortedRun::new(),
        1 => runs.pop().unwrap_or_default(),
        n => {
            let right = runs.split_off(n / 2);
            let (l, r) = rayon::join(|| fan_in(runs), || fan_in(right));
            l.merge(r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{CountEntry, Key};

    fn run_of(keys: &[&str]) -> SortedRun {
        SortedRun::from_unsorted(keys.iter().map(|k| CountEntry::new(Key::new(k.as_bytes(), 33), 1)).collect())
    }

    #[test]
    fn edges_follow_doubling_pattern() {
        assert!(tree_edges(1).is_empty());
        assert_eq!(tree_edges(2), vec![(1, 0, 1)]);
        assert_eq!(tree_edges(5), vec![(1, 0, 1), (3, 2, 1), (2, 0, 2), (4, 0, 4)]);
        // every worker but 0 sends exactly once
        for w in 1..40 {
            let mut senders: Vec<_> = tree_edges(w).iter().map(|e| e.0).collect();
            senders.sort_unstable();
            assert_eq!(senders, (1..w).collect::<Vec<_>>());
        }
    }

    #[test]
    fn steps_are_ceil_log2() {
        assert_eq!(reduction_steps(1), 0);
        assert_eq!(reduction_steps(2), 1);
        assert_eq!(reduction_steps(3), 2);
        assert_eq!(reduction_steps(8), 3);
        assert_eq!(reduction_steps(9), 4);
    }

    #[test]
    fn single_worker_keeps_its_run() {
        struct Unused;
        impl Transport for Unused {
            fn send(&self, _: usize, _: SortedRun) -> Result<()> {
                panic!("no peers")
            }
            fn recv(&self, _: usize) -> Result<SortedRun> {
                panic!("no peers")
            }
        }
        let r = run_of(&["a", "b"]);
        assert_eq!(reduce_tree(0, 1, r.clone(), &Unused).unwrap(), Some(r));
    }

    #[test]
    fn fan_in_matches_sequential_fold() {
        let runs: Vec<_> = (0..7).map(|i| run_of(&["shared", &format!("only{}", i)])).collect();
        let folded = runs.iter().cloned().fold(SortedRun::new(), |acc, r| acc.merge(r));
        let tree = fan_in(runs);
        assert_eq!(tree, folded);
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.entries().iter().find(|e| e.key.as_bytes() == b"shared").map(|e| e.count), Some(7));
        assert!(fan_in(Vec::new()).is_empty());
    }
}
