use crate::error::LoadError;
use crate::generate::GenerationOptions;
use crate::store::Credential;
use crate::sweep::SweepOptions;
use crate::util::available_parallelism;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment fallback for the store password when the config file omits it.
pub const PASSWORD_ENV: &str = "TQLOAD_PASSWORD";

/// How data files are mapped onto batchers and pipelines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSchedule {
    /// One batcher and one pipeline per file, drained before the next file starts.
    #[default]
    Sequential,
    /// One batcher per file, all feeding a single pipeline drained once at the end.
    /// Batches never span files but a file's tail overlaps the next file's head.
    Overlapped,
    /// One stream over all files; batches may span file boundaries.
    Combined,
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub addresses: Vec<String>,
    pub credential: Credential,
    pub database: String,
    pub dataset_dir: Option<PathBuf>,   // base for bare data file names
    pub data_files: Vec<PathBuf>,       // empty: every *.tql(.zst) under dataset_dir
    pub schema_file: Option<PathBuf>,   // run once in a schema session before loading
    pub recreate_database: bool,        // delete (if present) and create before loading
    pub batch_size: usize,
    pub concurrency: Option<usize>,     // None: available parallelism, resolved once per run
    pub schedule: FileSchedule,
    pub skip_blank_lines: bool,

    // IO tuning
    pub read_buffer_bytes: usize,

    pub progress: bool,
    pub progress_label: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            addresses: vec!["localhost:1729".to_string()],
            credential: Credential { username: "admin".to_string(), password: None },
            database: "bulk-load".to_string(),
            dataset_dir: None,
            data_files: Vec::new(),
            schema_file: None,
            recreate_database: false,
            batch_size: 100,
            concurrency: None,
            schedule: FileSchedule::Sequential,
            skip_blank_lines: false,
            read_buffer_bytes: 256 * 1024,
            progress: true,
            progress_label: None,
        }
    }
}

impl LoadOptions {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let opts: LoadOptions = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(opts.with_password_from_env())
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }
    pub fn with_dataset_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dataset_dir = Some(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_data_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.data_files = files.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_schema_file(mut self, path: impl AsRef<Path>) -> Self {
        self.schema_file = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_recreate_database(mut self, yes: bool) -> Self {
        self.recreate_database = yes;
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }
    pub fn with_schedule(mut self, schedule: FileSchedule) -> Self {
        self.schedule = schedule;
        self
    }
    pub fn with_skip_blank_lines(mut self, yes: bool) -> Self {
        self.skip_blank_lines = yes;
        self
    }
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    /// Fill a missing password from `TQLOAD_PASSWORD`.
    pub fn with_password_from_env(mut self) -> Self {
        if self.credential.password.is_none() {
            if let Ok(pw) = std::env::var(PASSWORD_ENV) {
                self.credential.password = Some(pw);
            }
        }
        self
    }

    /// Reject settings no run can succeed with, before anything is opened.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.batch_size == 0 {
            return Err(LoadError::config("batch_size must be at least 1"));
        }
        if self.concurrency == Some(0) {
            return Err(LoadError::config("concurrency must be at least 1"));
        }
        if self.database.trim().is_empty() {
            return Err(LoadError::config("database name is empty"));
        }
        if self.data_files.is_empty() && self.dataset_dir.is_none() {
            return Err(LoadError::config("no data files or dataset_dir configured"));
        }
        Ok(())
    }

    /// Pipeline width for a run: the configured value, else hardware parallelism.
    pub fn resolved_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(available_parallelism)
    }
}

/// Which store the binary loads into.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Discard-after-exit store, for dry runs.
    Memory,
    /// Append-only journal under `root`.
    File { root: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File { root: PathBuf::from("./store") }
    }
}

/// Top-level file consumed by the `tqload` binary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub load: LoadOptions,
    pub store: StoreConfig,
    /// Regenerate the benchmark dataset into `load.dataset_dir` before loading.
    pub generation: Option<GenerationOptions>,
    pub sweep: Option<SweepOptions>,
}

impl AppConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut cfg: AppConfig = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        cfg.load = cfg.load.with_password_from_env();
        Ok(cfg)
    }
}
