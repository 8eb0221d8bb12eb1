use anyhow::Result;
use std::path::PathBuf;
use tqload::{
    generate_dataset, init_tracing_once, AppConfig, BulkLoader, Driver, FileStore, LoadError, LoadSweep, MemoryStore,
    StoreConfig,
};

const DEFAULT_CONFIG: &str = "./tqload.json";

fn main() -> Result<()> {
    init_tracing_once();
    let config_path = std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let cfg = AppConfig::from_json_file(&config_path)?;
    tracing::info!("using config {}", config_path.display());

    if let Some(generation) = &cfg.generation {
        let Some(dir) = &cfg.load.dataset_dir else {
            return Err(LoadError::config("dataset generation needs load.dataset_dir").into());
        };
        generate_dataset(dir, generation)?;
    }

    match &cfg.store {
        StoreConfig::Memory => run(&cfg, &MemoryStore::new()),
        StoreConfig::File { root } => run(&cfg, &FileStore::new(root)),
    }
}

fn run<D: Driver>(cfg: &AppConfig, driver: &D) -> Result<()> {
    match &cfg.sweep {
        Some(sweep) => {
            let (reports, csv) = LoadSweep::new(cfg.load.clone(), sweep.clone()).run_and_record(driver)?;
            println!("{} sweep runs recorded in {}", reports.len(), csv.display());
        }
        None => {
            let report = BulkLoader::from_options(cfg.load.clone()).load(driver)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
