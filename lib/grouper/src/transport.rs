use crate::error::{Error, Result};
use crate::key::CountEntry;
use crate::reduce::{tree_edges, Transport};
use crate::run::SortedRun;
use crossbeam_channel as channel;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Rendezvous channels between isolated workers of one process, one per tree edge.
///
/// Channels have zero capacity, so a send completes only when the receiving worker
/// takes the run. When a worker fails it drops its endpoints and its partner's
/// pending `send`/`recv` fails instead of waiting forever.
pub struct ChannelTransport {
    rank: usize,
    outbound: HashMap<usize, channel::Sender<SortedRun>>,
    inbound: HashMap<usize, channel::Receiver<SortedRun>>,
}

impl ChannelTransport {
    /// One transport per worker, wired for the reduction tree of `workers`.
    pub fn mesh(workers: usize) -> Vec<ChannelTransport> {
        let mut transports: Vec<ChannelTransport> = (0..workers)
            .map(|rank| ChannelTransport { rank, outbound: HashMap::new(), inbound: HashMap::new() })
            .collect();
        for (from, to, _step) in tree_edges(workers) {
            let (tx, rx) = channel::bounded::<SortedRun>(0);
            transports[from].outbound.insert(to, tx);
            transports[to].inbound.insert(from, rx);
        }
        transports
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: usize, run: SortedRun) -> Result<()> {
        let tx = self
            .outbound
            .get(&to)
            .ok_or_else(|| Error::Transport(format!("worker {} has no link to worker {}", self.rank, to)))?;
        tx.send(run)
            .map_err(|_| Error::Transport(format!("worker {} is gone; worker {} cannot hand off its run", to, self.rank)))
    }

    fn recv(&self, from: usize) -> Result<SortedRun> {
        let rx = self
            .inbound
            .get(&from)
            .ok_or_else(|| Error::Transport(format!("worker {} has no link from worker {}", self.rank, from)))?;
        rx.recv()
            .map_err(|_| Error::Transport(format!("worker {} exited without sending its run to worker {}", from, self.rank)))
    }
}

const ABORT_MARKER: &str = "ABORT";

/// Rendezvous through a directory every rank can see, for one process per rank.
///
/// The sender writes `run_<from>_to_<to>.bin` (via a temp file and rename) and
/// waits for `ack_<from>_to_<to>`; the receiver waits for the run file, decodes
/// and deletes it, then writes the ack.
pub struct FsTransport {
    root: PathBuf,
    rank: usize,
    poll: Duration,
    limit: Duration,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>, rank: usize, poll: Duration, limit: Duration) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, rank, poll, limit })
    }

    fn run_path(&self, from: usize, to: usize) -> PathBuf {
        self.root.join(format!("run_{}_to_{}.bin", from, to))
    }

    fn ack_path(&self, from: usize, to: usize) -> PathBuf {
        self.root.join(format!("ack_{}_to_{}", from, to))
    }

    /// Marks this rank finished and, on the coordinator, waits for everyone else.
    pub fn barrier(&self, phase: &str, expected: usize) -> Result<()> {
        let mine = self.root.join(format!("barrier_{}_{}", phase, self.rank));
        fs::write(&mine, b"ok").map_err(|e| Error::io(&mine, e))?;
        if self.rank == 0 {
            for i in 0..expected {
                self.wait_for(&self.root.join(format!("barrier_{}_{}", phase, i)))?;
            }
        }
        Ok(())
    }

    /// Tells every rank still waiting on this directory that the run is over.
    pub fn abort(&self, reason: &str) {
        let path = self.root.join(ABORT_MARKER);
        let body = format!("rank {}: {}", self.rank, reason);
        if let Err(e) = fs::write(&path, body) {
            error!("write abort marker {}: {}", path.display(), e);
        }
    }

    fn wait_for(&self, path: &Path) -> Result<()> {
        let abort = self.root.join(ABORT_MARKER);
        let start = Instant::now();
        loop {
            if path.exists() {
                return Ok(());
            }
            if abort.exists() {
                let reason = fs::read_to_string(&abort).unwrap_or_default();
                return Err(Error::Transport(format!("run aborted by {}", reason.trim())));
            }
            if start.elapsed() > self.limit {
                error!("waited {:?} for {}", self.limit, path.display());
                return Err(Error::Transport(format!(
                    "timed out after {:?} waiting for {}",
                    self.limit,
                    path.display()
                )));
            }
            thread::sleep(self.poll);
        }
    }
}

impl Transport for FsTransport {
    fn send(&self, to: usize, run: SortedRun) -> Result<()> {
        let bytes = bincode::serialize(run.entries()).map_err(|e| Error::Transport(format!("encode run: {}", e)))?;
        let path = self.run_path(self.rank, to);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        debug!(rank = self.rank, to, bytes = bytes.len(), "run published, waiting for ack");

        let ack = self.ack_path(self.rank, to);
        self.wait_for(&ack)?;
        let _ = fs::remove_file(&ack);
        Ok(())
    }

    fn recv(&self, from: usize) -> Result<SortedRun> {
        let path = self.run_path(from, self.rank);
        self.wait_for(&path)?;
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let entries: Vec<CountEntry> =
            bincode::deserialize(&bytes).map_err(|e| Error::Decode(format!("run from rank {}: {}", from, e)))?;
        let run = SortedRun::try_from_sorted(entries)?;
        let _ = fs::remove_file(&path);

        let ack = self.ack_path(from, self.rank);
        fs::write(&ack, b"ok").map_err(|e| Error::io(&ack, e))?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::reduce::reduce_tree;

    fn run_of(keys: &[&str]) -> SortedRun {
        SortedRun::from_unsorted(keys.iter().map(|k| CountEntry::new(Key::new(k.as_bytes(), 33), 1)).collect())
    }

    #[test]
    fn channel_mesh_reduces_to_worker_zero() {
        let workers = 6;
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = ChannelTransport::mesh(workers)
                .into_iter()
                .map(|t| s.spawn(move || reduce_tree(t.rank(), workers, run_of(&["all", &format!("w{}", t.rank())]), &t)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });
        let root = results[0].clone().unwrap();
        assert!(results[1..].iter().all(|r| r.is_none()));
        assert_eq!(root.len(), workers + 1);
        assert_eq!(root.total_count(), 2 * workers as u64);
    }

    #[test]
    fn channel_peer_failure_is_an_error() {
        let mut mesh = ChannelTransport::mesh(2);
        let worker1 = mesh.pop().unwrap();
        drop(worker1);
        let worker0 = mesh.pop().unwrap();
        let err = reduce_tree(0, 2, run_of(&["a"]), &worker0).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn fs_transport_round_trips_between_ranks() {
        let dir = tempfile::tempdir().unwrap();
        let poll = Duration::from_millis(5);
        let limit = Duration::from_secs(30);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .map(|rank| {
                    let root = dir.path().to_path_buf();
                    s.spawn(move || {
                        let t = FsTransport::new(root, rank, poll, limit).unwrap();
                        let out = reduce_tree(rank, 3, run_of(&["x", &format!("r{}", rank)]), &t).unwrap();
                        t.barrier("reduce_done", 3).unwrap();
                        out
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let root = results[0].clone().unwrap();
        assert_eq!(root.len(), 4);
        assert_eq!(root.entries()[3].count, 3);
        assert!(!dir.path().join("run_1_to_0.bin").exists());
    }

    #[test]
    fn fs_transport_times_out_without_peer() {
        let dir = tempfile::tempdir().unwrap();
        let t = FsTransport::new(dir.path(), 0, Duration::from_millis(1), Duration::from_millis(20)).unwrap();
        assert!(matches!(t.recv(1), Err(Error::Transport(_))));
    }

    #[test]
    fn fs_transport_stops_waiting_on_abort() {
        let dir = tempfile::tempdir().unwrap();
        let waiting = FsTransport::new(dir.path(), 0, Duration::from_millis(1), Duration::from_secs(30)).unwrap();
        let failing = FsTransport::new(dir.path(), 1, Duration::from_millis(1), Duration::from_secs(30)).unwrap();
        failing.abort("input unreadable");
        let err = waiting.recv(1).unwrap_err();
        assert!(err.to_string().contains("rank 1: input unreadable"), "{}", err);
    }

    #[test]
    fn fs_transport_rejects_unsorted_payload() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![CountEntry::new(Key::new(b"b", 33), 1), CountEntry::new(Key::new(b"a", 33), 1)];
        fs::write(dir.path().join("run_1_to_0.bin"), bincode::serialize(&entries).unwrap()).unwrap();
        let t = FsTransport::new(dir.path(), 0, Duration::from_millis(1), Duration::from_secs(1)).unwrap();
        assert!(matches!(t.recv(1), Err(Error::Decode(_))));
    }
}
