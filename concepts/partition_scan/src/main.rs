use anyhow::Result;
use clap::Parser;
use grouper::io::map_input;
use grouper::partition::{candidate_range, partition, records};
use std::time::Instant;

/// How far each worker's start moves back from its even split, and how many
/// records each range ends up with.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    input: String,
    #[arg(long, default_value_t = 8)]
    workers: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let workers = args.workers.max(1);

    let t0 = Instant::now();
    let bytes = map_input(&args.input)?;
    let t_map = t0.elapsed();

    let t_part0 = Instant::now();
    let ranges = partition(&bytes, workers);
    let t_part = t_part0.elapsed();

    let mut total_records = 0usize;
    for (i, range) in ranges.iter().enumerate() {
        let candidate = candidate_range(bytes.len(), i, workers);
        let n = records(&bytes[range.clone()]).count();
        total_records += n;
        eprintln!(
            "worker={} candidate={}..{} range={}..{} shift={} records={}",
            i,
            candidate.start,
            candidate.end,
            range.start,
            range.end,
            candidate.start - range.start.min(candidate.start),
            n
        );
    }

    eprintln!(
        "partition_scan: bytes={} workers={} records={} map_ms={} partition_us={}",
        bytes.len(),
        workers,
        total_records,
        t_map.as_millis(),
        t_part.as_micros()
    );
    Ok(())
}
