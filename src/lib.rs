mod error;
mod util;
mod lines;
mod batcher;
mod concurrency;

mod store;
mod memory_store;
mod file_store;

mod config;
mod paths;
mod progress;
mod report;
mod loader;
mod sweep;
mod generate;

pub use crate::error::LoadError;
pub use crate::lines::LineStream;
pub use crate::batcher::{Batch, Batcher};
pub use crate::concurrency::{BoundedPipeline, Completion, Submission, WorkFn};

// Store surface, plus the two bundled stores.
pub use crate::store::{
    load_batch, run_script, Close, Closing, Connection, Credential, Driver, Session, SessionMode, Transaction,
    TransactionGuard, TransactionKind,
};
pub use crate::memory_store::{MemoryConnection, MemorySession, MemoryStore, MemoryTransaction};
pub use crate::file_store::{FileConnection, FileSession, FileStore, FileTransaction};

pub use crate::config::{AppConfig, FileSchedule, LoadOptions, StoreConfig, PASSWORD_ENV};
pub use crate::paths::{discover_data_files, file_label, resolve_data_files, DataFile};
pub use crate::report::{FileReport, LoadReport};
pub use crate::loader::BulkLoader;
pub use crate::sweep::{results_file_name, write_results_csv, LoadSweep, SweepOptions};
pub use crate::generate::{generate_dataset, GeneratedDataset, GenerationOptions, ENTITIES_FILE, RELATIONS_FILE, SCHEMA_FILE};

// Expose multiprogress and progress helpers.
pub use crate::progress::{make_progress_bar_labeled, set_global_multiprogress, total_source_bytes};

//export robust file ops and tracing setup so binaries can import from crate root.
pub use crate::util::{
    available_parallelism, create_with_backoff, init_tracing_once, open_with_backoff, remove_with_backoff,
    replace_file_atomic_backoff,
};
