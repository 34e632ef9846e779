use crate::constants::*;
use crate::error::{Error, Result};
use crate::utils::{env_parse, env_var_truthy};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Sizing for one counting table. Passed to every table and arena at construction.
#[derive(Clone, Debug, Serialize)]
pub struct CountConfig {
    /// Keys keep at most `max_key_len - 1` bytes.
    pub max_key_len: usize,
    /// Buckets per table (power of two). In the sharded table this is the total across shards.
    pub buckets: usize,
    /// Lock stripes of the shared table (power of two).
    pub shards: usize,
    /// Nodes per arena block.
    pub arena_block: usize,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            max_key_len: DEFAULT_MAX_KEY_LEN,
            buckets: DEFAULT_BUCKETS,
            shards: DEFAULT_SHARDS,
            arena_block: DEFAULT_ARENA_BLOCK,
        }
    }
}

impl CountConfig {
    pub fn validate(&self) -> Result<()> {
        if !(2..=KEY_CAPACITY + 1).contains(&self.max_key_len) {
            return Err(Error::Config(format!(
                "max_key_len must be in 2..={}, got {}",
                KEY_CAPACITY + 1,
                self.max_key_len
            )));
        }
        if !self.buckets.is_power_of_two() {
            return Err(Error::Config(format!("buckets must be a power of two, got {}", self.buckets)));
        }
        if !self.shards.is_power_of_two() || self.shards > self.buckets {
            return Err(Error::Config(format!(
                "shards must be a power of two no larger than buckets, got {}",
                self.shards
            )));
        }
        if self.arena_block == 0 {
            return Err(Error::Config("arena_block must be positive".into()));
        }
        Ok(())
    }
}

/// How workers are scheduled. The counting and merge logic is the same in every mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// `Cluster` under Slurm, `Channels` otherwise.
    Auto,
    /// Isolated worker threads reducing over rendezvous channels.
    Channels,
    /// One process per Slurm rank reducing over a shared directory.
    Cluster,
    /// Rayon tasks with private tables, merged by an in-memory fan-in.
    Threads,
    /// Rayon tasks sharing one lock-sharded table.
    Sharded,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Mode::Auto),
            "channels" => Ok(Mode::Channels),
            "cluster" => Ok(Mode::Cluster),
            "threads" => Ok(Mode::Threads),
            "sharded" => Ok(Mode::Sharded),
            other => Err(Error::Config(format!("unknown mode '{}'", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Auto => "auto",
            Mode::Channels => "channels",
            Mode::Cluster => "cluster",
            Mode::Threads => "threads",
            Mode::Sharded => "sharded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub mode: Mode,
    /// Worker count for local modes. Cluster runs take it from the Slurm topology.
    pub workers: usize,
    pub count: CountConfig,
    /// Shared directory for cluster rendezvous files.
    pub scratch_dir: PathBuf,
    pub keep_intermediates: bool,
    pub poll_interval: Duration,
    pub wait_limit: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            workers: num_cpus::get().max(1),
            count: CountConfig::default(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            keep_intermediates: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            wait_limit: Duration::from_secs(DEFAULT_WAIT_LIMIT_SECS),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `GROUPER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mode = match std::env::var(ENV_MODE) {
            Ok(v) => v.parse()?,
            Err(_) => defaults.mode,
        };
        Ok(Self {
            mode,
            workers: env_parse(ENV_WORKERS).unwrap_or(defaults.workers),
            count: CountConfig {
                max_key_len: env_parse(ENV_MAX_KEY_LEN).unwrap_or(defaults.count.max_key_len),
                buckets: env_parse(ENV_BUCKETS).unwrap_or(defaults.count.buckets),
                shards: env_parse(ENV_SHARDS).unwrap_or(defaults.count.shards),
                arena_block: env_parse(ENV_ARENA_BLOCK).unwrap_or(defaults.count.arena_block),
            },
            scratch_dir: std::env::var(ENV_SCRATCH_DIR).map(PathBuf::from).unwrap_or(defaults.scratch_dir),
            keep_intermediates: env_var_truthy(ENV_KEEP_INTERMEDIATES),
            poll_interval: env_parse(ENV_POLL_MS).map(Duration::from_millis).unwrap_or(defaults.poll_interval),
            wait_limit: env_parse(ENV_WAIT_LIMIT_SECS).map(Duration::from_secs).unwrap_or(defaults.wait_limit),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        self.count.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_sizes() {
        let mut cfg = CountConfig::default();
        cfg.buckets = 1000;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = CountConfig::default();
        cfg.max_key_len = 34;
        assert!(cfg.validate().is_err());
        cfg.max_key_len = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = CountConfig { buckets: 16, shards: 32, ..CountConfig::default() };
        assert!(cfg.validate().is_err());
        cfg.shards = 16;
        cfg.validate().unwrap();

        let run = RunConfig { workers: 0, ..RunConfig::default() };
        assert!(run.validate().is_err());
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Sharded".parse::<Mode>().unwrap(), Mode::Sharded);
        assert_eq!("channels".parse::<Mode>().unwrap(), Mode::Channels);
        assert!("mpi".parse::<Mode>().is_err());
        assert_eq!(Mode::Cluster.to_string(), "cluster");
    }
}
