use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Single-threaded reference: one HashMap, one sort. Its report must be
/// byte-identical to `groupby run` on the same input.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Keys keep at most this many bytes minus one
    #[arg(long, default_value_t = 33)]
    max_key_len: usize,
}

// split(b'\n') yields blank lines as empty records and nothing after a final newline
fn count_lines<R: BufRead>(reader: R, keep: usize) -> Result<HashMap<Vec<u8>, u64>> {
    let mut counts: HashMap<Vec<u8>, u64> = HashMap::new();
    for line in reader.split(b'\n') {
        let mut line = line?;
        line.truncate(keep);
        *counts.entry(line).or_insert(0) += 1;
    }
    Ok(counts)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();
    let t0 = Instant::now();
    let keep = args.max_key_len.saturating_sub(1).min(32);

    let reader = BufReader::new(File::open(&args.input).with_context(|| format!("open {}", args.input.display()))?);
    let counts = count_lines(reader, keep)?;

    let mut ordered: Vec<(Vec<u8>, u64)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut w = BufWriter::new(File::create(&args.output).with_context(|| format!("create {}", args.output.display()))?);
    writeln!(w, "{}", ordered.len())?;
    for (key, count) in &ordered {
        w.write_all(key)?;
        writeln!(w, " {}", count)?;
    }
    w.flush()?;
    info!(distinct_keys = ordered.len(), wall_ms = t0.elapsed().as_millis() as u64, "naive groupby complete");
    Ok(())
}
