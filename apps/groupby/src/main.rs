use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use grouper::io::{compare_reports, open_writer};
use grouper::{Mode, RunConfig, RuntimePipeline};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "groupby", about = "Exact key counts of line-oriented files, ranked by frequency")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count one or more input files; the n-th --input is written to the n-th --output
    Run(RunArgs),
    /// Check two reports line by line and print the first difference
    Compare {
        left: PathBuf,
        right: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Input file (repeatable)
    #[arg(long, required = true)]
    input: Vec<PathBuf>,
    /// Output report (repeatable, one per input)
    #[arg(long, required = true)]
    output: Vec<PathBuf>,
    /// auto | channels | cluster | threads | sharded
    #[arg(long)]
    mode: Option<Mode>,
    /// Worker count for in-process modes
    #[arg(long)]
    workers: Option<usize>,
    /// Hash buckets per table (power of two)
    #[arg(long)]
    buckets: Option<usize>,
    /// Lock stripes of the shared table (power of two)
    #[arg(long)]
    shards: Option<usize>,
    /// Keys keep at most this many bytes minus one
    #[arg(long)]
    max_key_len: Option<usize>,
    /// Directory shared by all ranks of a cluster run
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Write per-job stats as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> Result<RunConfig> {
        let mut config = RunConfig::from_env()?;
        if let Some(mode) = self.mode { config.mode = mode; }
        if let Some(workers) = self.workers { config.workers = workers; }
        if let Some(buckets) = self.buckets { config.count.buckets = buckets; }
        if let Some(shards) = self.shards { config.count.shards = shards; }
        if let Some(len) = self.max_key_len { config.count.max_key_len = len; }
        if let Some(dir) = &self.scratch_dir { config.scratch_dir = dir.clone(); }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run(args) => {
            run(args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Compare { left, right } => match compare_reports(&left, &right)? {
            None => {
                println!("identical: {} == {}", left.display(), right.display());
                Ok(ExitCode::SUCCESS)
            }
            Some(m) => {
                println!("reports differ at line {}:", m.line);
                println!("  {}: {}", left.display(), m.left.as_deref().unwrap_or("<end of file>"));
                println!("  {}: {}", right.display(), m.right.as_deref().unwrap_or("<end of file>"));
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn run(args: RunArgs) -> Result<()> {
    if args.input.len() != args.output.len() {
        bail!("{} --input but {} --output; they pair up in order", args.input.len(), args.output.len());
    }
    let config = args.config()?;
    let mut pipeline = RuntimePipeline::new(config);
    for (input, output) in args.input.iter().zip(&args.output) {
        pipeline.add_job(input, output);
    }
    let stats = pipeline.run()?;
    info!(jobs = stats.jobs.len(), total_wall_ms = stats.total_wall_ms(), "All jobs complete");

    // cluster ranks other than 0 never saw the final run
    let coordinator = stats.jobs.iter().all(|j| j.coordinator);
    if let (Some(path), true) = (&args.stats_json, coordinator) {
        let json = stats.to_json().context("serialize stats")?;
        let mut w = open_writer(path)?;
        w.write_all(json.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        w.flush()?;
    }
    Ok(())
}
