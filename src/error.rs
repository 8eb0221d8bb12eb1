//! Error taxonomy shared by the reader, the batcher and the bounded pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    /// A source file could not be opened or read. Fatal for the stream.
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Rejected before any work starts (batch size, width, missing inputs).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A unit of work failed; `seq` is the submission number of the failed batch.
    #[error("unit of work #{seq} in slot {slot} failed: {source:#}")]
    Work {
        slot: usize,
        seq: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl LoadError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn is_work(&self) -> bool {
        matches!(self, Self::Work { .. })
    }
}
