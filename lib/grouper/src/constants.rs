//! Centralized environment variable names and default values for grouper runtime tuning.

// Environment variable names
pub const ENV_WORKERS: &str = "GROUPER_WORKERS";
pub const ENV_MODE: &str = "GROUPER_MODE";
pub const ENV_BUCKETS: &str = "GROUPER_BUCKETS";
pub const ENV_SHARDS: &str = "GROUPER_SHARDS";
pub const ENV_ARENA_BLOCK: &str = "GROUPER_ARENA_BLOCK";
pub const ENV_MAX_KEY_LEN: &str = "GROUPER_MAX_KEY_LEN";
pub const ENV_RAYON_THREADS: &str = "GROUPER_RAYON_THREADS";
pub const ENV_KEEP_INTERMEDIATES: &str = "GROUPER_KEEP_INTERMEDIATES";
pub const ENV_WAIT_LIMIT_SECS: &str = "GROUPER_WAIT_LIMIT_SECS";
pub const ENV_POLL_MS: &str = "GROUPER_POLL_MS";
pub const ENV_SCRATCH_DIR: &str = "GROUPER_SCRATCH_DIR";

/// Storage bound for a canonical key, in bytes.
pub const KEY_CAPACITY: usize = 32;

// Defaults
// Keys keep at most DEFAULT_MAX_KEY_LEN - 1 bytes
pub const DEFAULT_MAX_KEY_LEN: usize = KEY_CAPACITY + 1;
// Per-worker bucket count; well above the distinct keys of the datasets we run on
pub const DEFAULT_BUCKETS: usize = 1 << 20;
// Lock stripes for the shared table (must be a power of two)
pub const DEFAULT_SHARDS: usize = 1024;
// Nodes per arena block
pub const DEFAULT_ARENA_BLOCK: usize = 1 << 16;
// Rendezvous polling for the cluster transport
pub const DEFAULT_POLL_MS: u64 = 50;
// Give up on a silent peer after a day
pub const DEFAULT_WAIT_LIMIT_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SCRATCH_DIR: &str = ".grouper_runs";
