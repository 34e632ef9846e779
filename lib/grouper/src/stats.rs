use crate::config::Mode;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Per-job counters and phase timings. Only the coordinating worker has the full picture.
#[derive(Clone, Debug, Serialize)]
pub struct RunStats {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
    pub workers: usize,
    pub reduction_steps: u32,
    pub bytes_in: u64,
    pub records: u64,
    pub distinct_keys: u64,
    pub count_ms: u64,
    pub reduce_ms: u64,
    pub rank_ms: u64,
    pub write_ms: u64,
    pub wall_ms: u64,
    /// False on cluster ranks other than 0: they never see the final run.
    pub coordinator: bool,
}

impl RunStats {
    pub fn new(input: PathBuf, output: PathBuf, mode: Mode, workers: usize) -> Self {
        Self {
            input,
            output,
            mode,
            workers,
            reduction_steps: 0,
            bytes_in: 0,
            records: 0,
            distinct_keys: 0,
            count_ms: 0,
            reduce_ms: 0,
            rank_ms: 0,
            write_ms: 0,
            wall_ms: 0,
            coordinator: true,
        }
    }
}

/// Wall-clock milliseconds since `start`.
pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Collects the stats of every job a pipeline ran.
#[derive(Debug, Default)]
pub struct StatsCollector {
    pub jobs: Vec<RunStats>,
}

impl StatsCollector {
    pub fn new() -> Self { Self::default() }

    pub fn record(&mut self, stats: RunStats) {
        self.jobs.push(stats);
    }

    pub fn total_wall_ms(&self) -> u64 {
        self.jobs.iter().map(|j| j.wall_ms).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.jobs)
    }
}
