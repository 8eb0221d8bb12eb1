//! Per-run accounting: statements and batches per file, wall time, committed totals.

use crate::config::FileSchedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileReport {
    pub label: String,
    pub paths: Vec<PathBuf>,
    /// Records read from the file(s) and submitted.
    pub statements: u64,
    pub batches: u64,
    /// Time from opening the first file until its last batch was accounted for.
    pub elapsed_secs: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadReport {
    pub database: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub schedule: FileSchedule,
    pub files: Vec<FileReport>,
    /// Statements in batches whose transaction committed.
    pub committed: u64,
    pub elapsed_secs: f64,
}

impl LoadReport {
    pub fn total_statements(&self) -> u64 {
        self.files.iter().map(|f| f.statements).sum()
    }

    pub fn total_batches(&self) -> u64 {
        self.files.iter().map(|f| f.batches).sum()
    }

    pub fn file(&self, label: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.label == label)
    }

    /// Wall time per statement, the figure the sweep results are compared on.
    pub fn secs_per_statement(&self) -> Option<f64> {
        match self.total_statements() {
            0 => None,
            n => Some(self.elapsed_secs / n as f64),
        }
    }
}
