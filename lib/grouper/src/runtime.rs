use crate::config::{CountConfig, Mode, RunConfig};
use crate::constants::ENV_RAYON_THREADS;
use crate::error::{self, Error};
use crate::io::{map_input, write_report_file};
use crate::partition::{partition, records};
use crate::rank::rank;
use crate::reduce::{fan_in, reduce_tree, reduction_steps};
use crate::run::SortedRun;
use crate::slurm::SlurmEnv;
use crate::stats::{elapsed_ms, RunStats, StatsCollector};
use crate::table::{LocalTable, ShardedTable};
use crate::transport::{ChannelTransport, FsTransport};
use crate::utils::{configure_rayon_threads, detect_env_or_local};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One input file counted into one report.
#[derive(Clone, Debug)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Runs jobs one after another. Any failure aborts the pipeline; a job's report
/// is only written after its reduction has fully completed.
pub struct RuntimePipeline {
    jobs: Vec<Job>,
    config: RunConfig,
}

impl RuntimePipeline {
    pub fn new(config: RunConfig) -> Self { Self { jobs: vec![], config } }

    pub fn add_job(&mut self, input: impl Into<PathBuf>, output: impl Into<PathBuf>) {
        self.jobs.push(Job { input: input.into(), output: output.into() });
    }

    pub fn config(&self) -> &RunConfig { &self.config }

    pub fn run(&self) -> Result<StatsCollector> {
        self.config.validate()?;
        let mode = resolve_mode(self.config.mode);
        configure_rayon_threads(ENV_RAYON_THREADS);
        let slurm = detect_env_or_local()?;
        info!(
            mode = %mode, slurm = %SlurmEnv::is_slurm(), job_id = %slurm.job_id, rank = slurm.rank,
            ntasks = slurm.ntasks, workers = self.config.workers, jobs = self.jobs.len(),
            "grouper starting"
        );

        let mut collector = StatsCollector::new();
        for (idx, job) in self.jobs.iter().enumerate() {
            let stats = match mode {
                Mode::Cluster => self.run_cluster_job(idx, job, &slurm),
                local => self.run_local_job(job, local),
            }
            .with_context(|| format!("job {} ({} -> {})", idx, job.input.display(), job.output.display()))?;
            if stats.coordinator {
                info!(
                    input = %job.input.display(), records = stats.records, distinct_keys = stats.distinct_keys,
                    count_ms = stats.count_ms, reduce_ms = stats.reduce_ms, rank_ms = stats.rank_ms,
                    write_ms = stats.write_ms, wall_ms = stats.wall_ms,
                    "Job complete"
                );
            }
            collector.record(stats);
        }
        Ok(collector)
    }

    fn run_local_job(&self, job: &Job, mode: Mode) -> Result<RunStats> {
        let wall = Instant::now();
        let workers = self.config.workers;
        let mut stats = RunStats::new(job.input.clone(), job.output.clone(), mode, workers);
        let input = map_input(&job.input)?;
        stats.bytes_in = input.len() as u64;

        let aggregate = aggregate(&input, mode, workers, &self.config.count)?;
        stats.count_ms = aggregate.count_ms;
        stats.reduce_ms = aggregate.reduce_ms;
        stats.reduction_steps = reduction_steps(workers);
        self.finish(aggregate.run, &mut stats)?;
        stats.wall_ms = elapsed_ms(wall);
        Ok(stats)
    }

    fn run_cluster_job(&self, idx: usize, job: &Job, slurm: &SlurmEnv) -> Result<RunStats> {
        let wall = Instant::now();
        let (rank, workers) = (slurm.rank, slurm.ntasks);
        let mut stats = RunStats::new(job.input.clone(), job.output.clone(), Mode::Cluster, workers);
        stats.coordinator = slurm.is_coordinator();
        stats.reduction_steps = reduction_steps(workers);

        let root = self.config.scratch_dir.join(&slurm.job_id).join(format!("job{}", idx));
        let transport =
            FsTransport::new(&root, rank, self.config.poll_interval, self.config.wait_limit).context("cluster scratch dir")?;

        let outcome = (|| -> Result<Option<SortedRun>> {
            let input = map_input(&job.input)?;
            stats.bytes_in = input.len() as u64;
            let range = partition(&input, workers).swap_remove(rank);

            let t0 = Instant::now();
            let run = count_records(&input[range.clone()], &self.config.count)?.into_run();
            stats.count_ms = elapsed_ms(t0);
            debug!(rank, start = range.start, end = range.end, distinct = run.len(), "local count done");

            let t1 = Instant::now();
            let global = reduce_tree(rank, workers, run, &transport)?;
            stats.reduce_ms = elapsed_ms(t1);
            Ok(global)
        })();

        let outcome = outcome.and_then(|global| match global {
            Some(run) => self.finish(run, &mut stats),
            None => Ok(()),
        });
        if let Err(e) = outcome {
            error!(rank, "aborting cluster run: {:#}", e);
            transport.abort(&format!("{:#}", e));
            // Peers still polling need the ABORT marker, so the directory outlives a failed run.
            warn!(rank, scratch = %root.display(), "scratch dir kept after abort");
            return Err(e);
        }

        let t0 = Instant::now();
        transport.barrier("done", workers)?;
        if slurm.is_coordinator() {
            info!(phase = "barrier_done_wait", wait_ms = elapsed_ms(t0), "Barrier wait for reduction completed");
            if !self.config.keep_intermediates {
                let _ = fs::remove_dir_all(&root);
            }
        }
        stats.wall_ms = elapsed_ms(wall);
        Ok(stats)
    }

    /// Rank and write the global run. Only the coordinating worker gets here.
    fn finish(&self, run: SortedRun, stats: &mut RunStats) -> Result<()> {
        stats.records = run.total_count();
        stats.distinct_keys = run.len() as u64;

        let t0 = Instant::now();
        let ranked = rank(run);
        stats.rank_ms = elapsed_ms(t0);
        info!(phase = "rank", distinct_keys = ranked.len(), rank_ms = stats.rank_ms, "Rank phase complete");

        let t1 = Instant::now();
        write_report_file(&stats.output, &ranked)?;
        stats.write_ms = elapsed_ms(t1);
        info!(phase = "write", output = %stats.output.display(), write_ms = stats.write_ms, "Report written");
        Ok(())
    }
}

pub fn default_pipeline() -> RuntimePipeline { RuntimePipeline::new(RunConfig::default()) }

/// `Auto` becomes `Cluster` under Slurm and `Channels` otherwise.
pub fn resolve_mode(mode: Mode) -> Mode {
    match mode {
        Mode::Auto if SlurmEnv::is_slurm() => Mode::Cluster,
        Mode::Auto => Mode::Channels,
        other => other,
    }
}

/// Count every record of a record-aligned slice into a fresh table.
pub fn count_records(bytes: &[u8], config: &CountConfig) -> error::Result<LocalTable> {
    let mut table = LocalTable::new(config)?;
    for record in records(bytes) {
        table.insert(record)?;
    }
    Ok(table)
}

/// The global run of an in-memory buffer plus how long its two phases took.
pub struct Aggregate {
    pub run: SortedRun,
    pub count_ms: u64,
    pub reduce_ms: u64,
}

/// Partition `bytes` over `workers`, count locally and reduce, scheduled per `mode`.
/// `Cluster` and `Auto` are process-level choices and are rejected here.
pub fn aggregate(bytes: &[u8], mode: Mode, workers: usize, config: &CountConfig) -> error::Result<Aggregate> {
    config.validate()?;
    if workers == 0 {
        return Err(Error::Config("workers must be at least 1".into()));
    }
    let ranges = partition(bytes, workers);
    match mode {
        Mode::Channels => aggregate_channels(bytes, ranges, config),
        Mode::Threads => aggregate_threads(bytes, ranges, config),
        Mode::Sharded => aggregate_sharded(bytes, ranges, config),
        Mode::Cluster | Mode::Auto => Err(Error::Config(format!("mode {} cannot run in-process", mode))),
    }
}

struct WorkerReport {
    run: Option<SortedRun>,
    count_ms: u64,
}

fn aggregate_channels(bytes: &[u8], ranges: Vec<std::ops::Range<usize>>, config: &CountConfig) -> error::Result<Aggregate> {
    let workers = ranges.len();
    let wall = Instant::now();
    let reports: Vec<error::Result<WorkerReport>> = thread::scope(|s| {
        let handles: Vec<_> = ChannelTransport::mesh(workers)
            .into_iter()
            .zip(ranges)
            .map(|(transport, range)| {
                let slice = &bytes[range];
                s.spawn(move || -> error::Result<WorkerReport> {
                    let rank = transport.rank();
                    let t0 = Instant::now();
                    let run = count_records(slice, config)?.into_run();
                    let count_ms = elapsed_ms(t0);
                    debug!(rank, bytes = slice.len(), distinct = run.len(), count_ms, "local count done");
                    let run = reduce_tree(rank, workers, run, &transport)?;
                    Ok(WorkerReport { run, count_ms })
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| Err(Error::Transport(format!("worker {} panicked", rank))))
            })
            .collect()
    });

    let mut count_ms = 0;
    let mut root = None;
    let mut failures = Vec::new();
    for (rank, report) in reports.into_iter().enumerate() {
        match report {
            Ok(r) => {
                count_ms = count_ms.max(r.count_ms);
                if r.run.is_some() {
                    root = r.run;
                }
            }
            Err(e) => {
                error!(rank, "worker failed: {}", e);
                failures.push(e);
            }
        }
    }
    if !failures.is_empty() {
        return Err(root_cause(failures));
    }
    let run = root.ok_or_else(|| Error::Transport("worker 0 finished without the global run".into()))?;
    let wall_ms = elapsed_ms(wall);
    info!(phase = "count", workers, max_worker_ms = count_ms, "Count phase complete");
    info!(phase = "reduce", steps = reduction_steps(workers), distinct_keys = run.len(), "Reduce phase complete");
    Ok(Aggregate { run, count_ms, reduce_ms: wall_ms.saturating_sub(count_ms) })
}

fn aggregate_threads(bytes: &[u8], ranges: Vec<std::ops::Range<usize>>, config: &CountConfig) -> error::Result<Aggregate> {
    let t0 = Instant::now();
    let runs = ranges
        .into_par_iter()
        .map(|range| count_records(&bytes[range], config).map(LocalTable::into_run))
        .collect::<error::Result<Vec<_>>>()?;
    let count_ms = elapsed_ms(t0);
    info!(phase = "count", workers = runs.len(), count_ms, "Count phase complete");

    let t1 = Instant::now();
    let run = fan_in(runs);
    let reduce_ms = elapsed_ms(t1);
    info!(phase = "reduce", distinct_keys = run.len(), reduce_ms, "Reduce phase complete");
    Ok(Aggregate { run, count_ms, reduce_ms })
}

fn aggregate_sharded(bytes: &[u8], ranges: Vec<std::ops::Range<usize>>, config: &CountConfig) -> error::Result<Aggregate> {
    let t0 = Instant::now();
    let table = ShardedTable::new(config)?;
    ranges
        .into_par_iter()
        .try_for_each(|range| records(&bytes[range]).try_for_each(|record| table.insert(record)))?;
    let count_ms = elapsed_ms(t0);
    info!(phase = "count", shards = table.shard_count(), distinct_keys = table.len(), count_ms, "Count phase complete");

    let t1 = Instant::now();
    let run = fan_in(table.into_runs());
    let reduce_ms = elapsed_ms(t1);
    info!(phase = "reduce", distinct_keys = run.len(), reduce_ms, "Reduce phase complete");
    Ok(Aggregate { run, count_ms, reduce_ms })
}

// A failed worker makes its partners fail with transport errors; report the failure that started it.
fn root_cause(failures: Vec<Error>) -> Error {
    let mut transport = None;
    for e in failures {
        match e {
            Error::Transport(_) => {
                transport.get_or_insert(e);
            }
            other => return other,
        }
    }
    transport.unwrap_or_else(|| Error::Transport("unknown worker failure".into()))
}
