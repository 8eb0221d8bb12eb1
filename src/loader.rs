use crate::batcher::{Batch, Batcher};
use crate::concurrency::{BoundedPipeline, WorkFn};
use crate::config::{FileSchedule, LoadOptions};
use crate::error::LoadError;
use crate::lines::LineStream;
use crate::paths::{discover_data_files, resolve_data_files, DataFile};
use crate::progress::{make_progress_bar_labeled, total_source_bytes, ByteTicker};
use crate::report::{FileReport, LoadReport};
use crate::store::{load_batch, run_script, Closing, Connection, Credential, Driver, Session, SessionMode};
use crate::util::init_tracing_once;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

type BatchPipeline = BoundedPipeline<Batch, usize>;

/// Streams statement files into a store through a bounded pipeline of write transactions.
#[derive(Clone, Debug, Default)]
pub struct BulkLoader {
    pub(crate) opts: LoadOptions,
}

impl BulkLoader {
    pub fn new() -> Self {
        Self { opts: LoadOptions::default() }
    }

    pub fn from_options(opts: LoadOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn addresses<I, S>(mut self, addresses: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_addresses(addresses); self }
    pub fn credential(mut self, credential: Credential) -> Self { self.opts = self.opts.with_credential(credential); self }
    pub fn database(mut self, name: impl Into<String>) -> Self { self.opts = self.opts.with_database(name); self }
    pub fn dataset_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_dataset_dir(dir); self }
    pub fn data_files<I, P>(mut self, files: I) -> Self where I: IntoIterator<Item = P>, P: Into<std::path::PathBuf> { self.opts = self.opts.with_data_files(files); self }
    pub fn schema_file(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_schema_file(path); self }
    pub fn recreate_database(mut self, yes: bool) -> Self { self.opts = self.opts.with_recreate_database(yes); self }
    pub fn batch_size(mut self, n: usize) -> Self { self.opts = self.opts.with_batch_size(n); self }
    pub fn concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_concurrency(n); self }
    pub fn schedule(mut self, schedule: FileSchedule) -> Self { self.opts = self.opts.with_schedule(schedule); self }
    pub fn skip_blank_lines(mut self, yes: bool) -> Self { self.opts = self.opts.with_skip_blank_lines(yes); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }

    /// Files this loader will read, in load order. Discovery skips the schema file.
    pub fn plan_files(&self) -> Vec<DataFile> {
        if self.opts.data_files.is_empty() {
            let Some(dir) = &self.opts.dataset_dir else {
                return Vec::new();
            };
            let schema = self.opts.schema_file.as_ref().and_then(|p| fs::canonicalize(p).ok());
            discover_data_files(dir)
                .into_iter()
                .filter(|f| schema.is_none() || fs::canonicalize(&f.path).ok() != schema)
                .collect()
        } else {
            resolve_data_files(self.opts.dataset_dir.as_deref(), &self.opts.data_files)
        }
    }

    /// Connect, prepare the database, and load every planned file.
    ///
    /// The first failure (unreadable file, failed batch) stops the run: no further
    /// batches are issued, batches already in flight are waited for, and all store
    /// handles are closed before the error is returned.
    pub fn load<D: Driver>(&self, driver: &D) -> Result<LoadReport> {
        init_tracing_once();
        self.opts.validate()?;
        let width = self.opts.resolved_concurrency();
        let files = self.plan_files();
        if files.is_empty() {
            return Err(LoadError::config("no statement files found").into());
        }
        tracing::info!(
            "loading {} file(s) into '{}' (batch size {}, concurrency {}, schedule {:?})",
            files.len(), self.opts.database, self.opts.batch_size, width, self.opts.schedule
        );

        let conn = Closing::new(
            driver
                .connect(&self.opts.addresses, &self.opts.credential)
                .with_context(|| format!("connecting to {}", self.opts.addresses.join(",")))?,
        );
        self.prepare_database(&*conn)?;

        let session = Arc::new(
            conn.open_session(&self.opts.database, SessionMode::Data)
                .with_context(|| format!("opening data session on '{}'", self.opts.database))?,
        );
        // Declared after `conn`: the session closes first.
        let _session_guard = Closing::new(Arc::clone(&session));

        self.load_files(session, &files, width)
    }

    fn prepare_database<C: Connection>(&self, conn: &C) -> Result<()> {
        let db = &self.opts.database;
        if self.opts.recreate_database {
            if conn.database_exists(db)? {
                tracing::info!("deleting existing database '{}'", db);
                conn.delete_database(db)?;
            }
            conn.create_database(db).with_context(|| format!("creating database '{db}'"))?;
        }
        if let Some(schema_path) = &self.opts.schema_file {
            let script = fs::read_to_string(schema_path)
                .map_err(|e| LoadError::io(schema_path, e))?;
            let session = Closing::new(conn.open_session(db, SessionMode::Schema)?);
            run_script(&*session, &script).with_context(|| format!("defining schema from {}", schema_path.display()))?;
            tracing::info!("schema defined from {}", schema_path.display());
        }
        Ok(())
    }

    fn load_files<S: Session>(&self, session: Arc<S>, files: &[DataFile], width: usize) -> Result<LoadReport> {
        let work: WorkFn<Batch, usize> = Arc::new(move |batch: Batch| load_batch(&*session, &batch));
        let pb = if self.opts.progress {
            Some(make_progress_bar_labeled(total_source_bytes(files), self.opts.progress_label.as_deref()))
        } else {
            None
        };
        let mut ticker = ByteTicker::new(pb);
        let started = Instant::now();
        let mut committed = 0u64;
        let mut reports = Vec::with_capacity(files.len());

        match self.opts.schedule {
            FileSchedule::Sequential => {
                for file in files {
                    let mut pipeline = BatchPipeline::with_work(width, Arc::clone(&work))?;
                    let file_started = Instant::now();
                    let mut report = self.feed(&mut pipeline, std::slice::from_ref(file), &mut ticker, &mut committed)?;
                    committed += drain_or_abort(&mut pipeline, &report.label)?;
                    report.elapsed_secs = file_started.elapsed().as_secs_f64();
                    log_file_done(&report);
                    reports.push(report);
                }
            }
            FileSchedule::Overlapped => {
                // A file's time runs until the next file starts feeding; the last file
                // also owns the final drain.
                let mut pipeline = BatchPipeline::with_work(width, Arc::clone(&work))?;
                let mut last_started = started;
                for (i, file) in files.iter().enumerate() {
                    last_started = Instant::now();
                    let mut report = self.feed(&mut pipeline, std::slice::from_ref(file), &mut ticker, &mut committed)?;
                    if i + 1 < files.len() {
                        report.elapsed_secs = last_started.elapsed().as_secs_f64();
                        log_file_done(&report);
                    }
                    reports.push(report);
                }
                committed += drain_or_abort(&mut pipeline, "final drain")?;
                if let Some(last) = reports.last_mut() {
                    last.elapsed_secs = last_started.elapsed().as_secs_f64();
                    log_file_done(last);
                }
            }
            FileSchedule::Combined => {
                let mut pipeline = BatchPipeline::with_work(width, Arc::clone(&work))?;
                let mut report = self.feed(&mut pipeline, files, &mut ticker, &mut committed)?;
                committed += drain_or_abort(&mut pipeline, &report.label)?;
                report.elapsed_secs = started.elapsed().as_secs_f64();
                log_file_done(&report);
                reports.push(report);
            }
        }
        ticker.finish("done");

        let report = LoadReport {
            database: self.opts.database.clone(),
            batch_size: self.opts.batch_size,
            concurrency: width,
            schedule: self.opts.schedule,
            files: reports,
            committed,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            "load complete: {} statements in {} batches, {:.3}s",
            report.total_statements(), report.total_batches(), report.elapsed_secs
        );
        Ok(report)
    }

    /// Push every batch of `files` (one stream) into the pipeline. Does not drain.
    fn feed(
        &self,
        pipeline: &mut BatchPipeline,
        files: &[DataFile],
        ticker: &mut ByteTicker,
        committed: &mut u64,
    ) -> Result<FileReport> {
        let label = files.iter().map(|f| f.label.as_str()).collect::<Vec<_>>().join("+");
        tracing::info!("loading data from {}", label);
        let stream = LineStream::new(files.iter().map(|f| f.path.clone()))
            .with_read_buffer(self.opts.read_buffer_bytes)
            .skip_blank_lines(self.opts.skip_blank_lines);
        let mut batches = Batcher::new(stream, self.opts.batch_size)?;
        ticker.restart();

        let mut report = FileReport {
            label,
            paths: files.iter().map(|f| f.path.clone()).collect(),
            ..Default::default()
        };
        while let Some(next) = batches.next() {
            let submitted = next.and_then(|batch| {
                report.statements += batch.len() as u64;
                report.batches += 1;
                pipeline.submit(batch)
            });
            match submitted {
                Ok(sub) => {
                    if let Some(freed) = sub.freed {
                        *committed += freed.output as u64;
                    }
                }
                Err(e) => {
                    abandon(pipeline);
                    return Err(anyhow::Error::new(e).context(format!("loading {}", report.label)));
                }
            }
            ticker.update(batches.source().bytes_read());
        }
        ticker.update(batches.source().bytes_read());
        Ok(report)
    }
}

/// Drain after a clean feed; returns the statements committed by the drained units.
fn drain_or_abort(pipeline: &mut BatchPipeline, label: &str) -> Result<u64> {
    let done = pipeline.drain().with_context(|| format!("draining {label}"))?;
    Ok(done.iter().map(|c| c.output as u64).sum())
}

/// Stop after a failure: wait for in-flight units, log anything else that fails.
fn abandon(pipeline: &mut BatchPipeline) {
    if pipeline.outstanding() > 0 {
        tracing::warn!("waiting for {} in-flight batch(es) before stopping", pipeline.outstanding());
    }
    if let Err(e) = pipeline.drain() {
        tracing::warn!("in-flight batch also failed: {e}");
    }
}

fn log_file_done(report: &FileReport) {
    tracing::info!(
        "{}: {} statements in {} batches, {:.3}s",
        report.label, report.statements, report.batches, report.elapsed_secs
    );
}
