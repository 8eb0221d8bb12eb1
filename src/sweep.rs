//! Benchmark sweep: one full load per (batch size, concurrency) pair, each into a freshly
//! recreated database, with per-file counts and timings collected into a CSV.

use crate::config::LoadOptions;
use crate::error::LoadError;
use crate::loader::BulkLoader;
use crate::report::LoadReport;
use crate::store::Driver;
use crate::util::{available_parallelism, create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    pub batch_sizes: Vec<usize>,
    pub concurrencies: Vec<usize>,
    /// Attempts per grid point before the sweep gives up.
    pub max_attempts: usize,
    pub reattempt_wait_secs: f64,
    pub results_dir: PathBuf,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            batch_sizes: vec![10, 100, 1000],
            concurrencies: vec![1, 2, 4, 8],
            max_attempts: 3,
            reattempt_wait_secs: 5.0,
            results_dir: PathBuf::from("./results"),
        }
    }
}

impl SweepOptions {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.batch_sizes.is_empty() || self.concurrencies.is_empty() {
            return Err(LoadError::config("sweep needs at least one batch size and one concurrency"));
        }
        if self.batch_sizes.contains(&0) || self.concurrencies.contains(&0) {
            return Err(LoadError::config("sweep batch sizes and concurrencies must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(LoadError::config("max_attempts must be at least 1"));
        }
        if !self.reattempt_wait_secs.is_finite() || self.reattempt_wait_secs < 0.0 {
            return Err(LoadError::config("reattempt_wait_secs must be a non-negative number"));
        }
        Ok(())
    }
}

pub struct LoadSweep {
    base: LoadOptions,
    opts: SweepOptions,
}

impl LoadSweep {
    /// `base` supplies everything but batch size and concurrency. Every run recreates the database.
    pub fn new(base: LoadOptions, opts: SweepOptions) -> Self {
        Self { base: base.with_recreate_database(true), opts }
    }

    pub fn options(&self) -> &SweepOptions {
        &self.opts
    }

    /// Run the whole grid, batch sizes outermost. Stops at the first grid point that
    /// exhausts its attempts.
    pub fn run<D: Driver>(&self, driver: &D) -> Result<Vec<LoadReport>> {
        self.opts.validate()?;
        let hw = available_parallelism();
        let mut reports = Vec::with_capacity(self.opts.batch_sizes.len() * self.opts.concurrencies.len());
        for &batch_size in &self.opts.batch_sizes {
            for &concurrency in &self.opts.concurrencies {
                if concurrency > hw {
                    tracing::warn!("concurrency {} exceeds available parallelism ({})", concurrency, hw);
                }
                reports.push(self.run_point(driver, batch_size, concurrency)?);
            }
        }
        Ok(reports)
    }

    /// Run the grid and write the results CSV. Returns the reports and the CSV path.
    pub fn run_and_record<D: Driver>(&self, driver: &D) -> Result<(Vec<LoadReport>, PathBuf)> {
        let reports = self.run(driver)?;
        fs::create_dir_all(&self.opts.results_dir)
            .with_context(|| format!("creating {}", self.opts.results_dir.display()))?;
        let dest = self.opts.results_dir.join(results_file_name(OffsetDateTime::now_utc())?);
        write_results_csv(&reports, &dest)?;
        tracing::info!("sweep results written to {}", dest.display());
        Ok((reports, dest))
    }

    fn run_point<D: Driver>(&self, driver: &D, batch_size: usize, concurrency: usize) -> Result<LoadReport> {
        let loader = BulkLoader::from_options(
            self.base.clone().with_batch_size(batch_size).with_concurrency(concurrency),
        );
        let wait = Duration::from_secs_f64(self.opts.reattempt_wait_secs);
        let mut attempt = 1;
        loop {
            tracing::info!("sweep: batch size {}, concurrency {}, attempt {}", batch_size, concurrency, attempt);
            match loader.load(driver) {
                Ok(report) => return Ok(report),
                Err(e) if !is_retriable(&e) => return Err(e),
                Err(e) if attempt >= self.opts.max_attempts => {
                    tracing::error!("maximum attempts reached ({})", self.opts.max_attempts);
                    return Err(e.context(format!(
                        "batch size {batch_size}, concurrency {concurrency}: gave up after {attempt} attempts"
                    )));
                }
                Err(e) => {
                    tracing::warn!("run failed: {e:#}; retrying in {:.1}s", wait.as_secs_f64());
                    sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}

/// Store failures are retried; bad configuration and unreadable inputs are not.
fn is_retriable(err: &anyhow::Error) -> bool {
    !err.chain().any(|c| {
        matches!(c.downcast_ref::<LoadError>(), Some(LoadError::Config(_) | LoadError::Io { .. }))
    })
}

/// `yy-mm-dd_HH-MM-SS.csv`
pub fn results_file_name(at: OffsetDateTime) -> Result<String> {
    let fmt = format_description!("[year repr:last_two]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!("{}.csv", at.format(&fmt)?))
}

/// Columns: `batch_size,concurrency`, then `<label>_count,<label>_time` per file in the
/// order of the first report. Missing files leave empty cells.
pub fn write_results_csv(reports: &[LoadReport], dest: &Path) -> Result<()> {
    let labels: Vec<&str> = reports
        .first()
        .map(|r| r.files.iter().map(|f| f.label.as_str()).collect())
        .unwrap_or_default();

    let tmp = dest.with_extension("csv.tmp");
    {
        let f = create_with_backoff(&tmp, 20, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        write!(w, "batch_size,concurrency")?;
        for label in &labels {
            write!(w, ",{label}_count,{label}_time")?;
        }
        writeln!(w)?;
        for r in reports {
            write!(w, "{},{}", r.batch_size, r.concurrency)?;
            for label in &labels {
                match r.file(label) {
                    Some(f) => write!(w, ",{},{}", f.statements, f.elapsed_secs)?,
                    None => write!(w, ",,")?,
                }
            }
            writeln!(w)?;
        }
        w.flush()?;
    }
    replace_file_atomic_backoff(&tmp, dest)
}
