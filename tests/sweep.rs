#[path = "common/mod.rs"]
mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::macros::datetime;
use tqload::{
    results_file_name, Credential, Driver, LoadOptions, LoadSweep, MemoryConnection, MemoryStore, SweepOptions,
};

/// Refuses the first `failures` connections, then behaves like the wrapped store.
struct FlakyStore {
    inner: MemoryStore,
    failures: usize,
    attempts: AtomicUsize,
}

impl Driver for FlakyStore {
    type Connection = MemoryConnection;

    fn connect(&self, addresses: &[String], credential: &Credential) -> anyhow::Result<MemoryConnection> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            anyhow::bail!("server unavailable (attempt {})", n + 1);
        }
        self.inner.connect(addresses, credential)
    }
}

fn base_options(dataset: &std::path::Path) -> LoadOptions {
    LoadOptions::default()
        .with_database("social")
        .with_dataset_dir(dataset)
        .with_data_files(["person", "company"])
        .with_schema_file(dataset.join("schema.tql"))
        .with_progress(false)
}

fn sweep_options(results_dir: &std::path::Path) -> SweepOptions {
    SweepOptions {
        batch_sizes: vec![5, 10],
        concurrencies: vec![1, 2],
        max_attempts: 3,
        reattempt_wait_secs: 0.0,
        results_dir: results_dir.to_path_buf(),
    }
}

/// Four grid points, each a full load into a fresh database, recorded as one CSV row.
#[test]
fn sweep_writes_one_row_per_grid_point() {
    let (tmp, dataset) = make_dataset();
    let results = tmp.path().join("results");
    let store = MemoryStore::new();

    let (reports, csv) = LoadSweep::new(base_options(&dataset), sweep_options(&results))
        .run_and_record(&store)
        .unwrap();

    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.committed == 32));
    let grid: Vec<(usize, usize)> = reports.iter().map(|r| (r.batch_size, r.concurrency)).collect();
    assert_eq!(grid, vec![(5, 1), (5, 2), (10, 1), (10, 2)]);
    // Each run recreated the database, so only the last run's data remains.
    assert_eq!(store.data_statements("social").len(), 32);

    assert!(csv.starts_with(&results));
    assert_eq!(csv.extension().unwrap(), "csv");
    let lines = read_lines(&csv);
    assert_eq!(lines[0], "batch_size,concurrency,person_count,person_time,company_count,company_time");
    assert_eq!(lines.len(), 5);
    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(&first[..3], ["5", "1", "25"]);
    assert_eq!(first[4], "7");
    assert!(first[3].parse::<f64>().unwrap() >= 0.0);

    let leftovers: Vec<_> = std::fs::read_dir(&results).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "temp file was promoted, not left behind");
}

/// Store failures are retried up to `max_attempts`.
#[test]
fn retries_transient_failures() {
    let (tmp, dataset) = make_dataset();
    let mut opts = sweep_options(&tmp.path().join("results"));
    opts.batch_sizes = vec![8];
    opts.concurrencies = vec![2];

    let flaky = FlakyStore { inner: MemoryStore::new(), failures: 2, attempts: AtomicUsize::new(0) };
    let reports = LoadSweep::new(base_options(&dataset), opts.clone()).run(&flaky).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);

    opts.max_attempts = 2;
    let flaky = FlakyStore { inner: MemoryStore::new(), failures: 2, attempts: AtomicUsize::new(0) };
    let err = LoadSweep::new(base_options(&dataset), opts).run(&flaky).unwrap_err();
    assert!(format!("{err:#}").contains("gave up after 2 attempts"), "{err:#}");
}

/// Unreadable inputs are not worth retrying.
#[test]
fn does_not_retry_missing_files() {
    let (tmp, dataset) = make_dataset();
    let flaky = FlakyStore { inner: MemoryStore::new(), failures: 0, attempts: AtomicUsize::new(0) };
    let base = base_options(&dataset).with_data_files(["ghost"]);
    assert!(LoadSweep::new(base, sweep_options(&tmp.path().join("results"))).run(&flaky).is_err());
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn rejects_empty_grid() {
    let (tmp, dataset) = make_dataset();
    let mut opts = sweep_options(&tmp.path().join("results"));
    opts.concurrencies.clear();
    assert!(LoadSweep::new(base_options(&dataset), opts).run(&MemoryStore::new()).is_err());
}

#[test]
fn results_are_named_by_timestamp() {
    let name = results_file_name(datetime!(2024-03-05 07:08:09 UTC)).unwrap();
    assert_eq!(name, "24-03-05_07-08-09.csv");
}
