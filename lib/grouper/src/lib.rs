pub mod arena;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod key;
pub mod partition;
pub mod rank;
pub mod reduce;
pub mod run;
pub mod runtime;
pub mod slurm;
pub mod stats;
pub mod table;
pub mod transport;
pub mod utils;

pub use config::{CountConfig, Mode, RunConfig};
pub use error::{Error, Result};
pub use key::{CountEntry, Key};
pub use reduce::Transport;
pub use run::SortedRun;
pub use runtime::{aggregate, default_pipeline, RuntimePipeline};
pub use stats::{RunStats, StatsCollector};
