use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every variant is fatal for the run it occurs in. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("allocation failed: could not reserve {requested} more {what}")]
    Allocation { what: &'static str, requested: usize },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
