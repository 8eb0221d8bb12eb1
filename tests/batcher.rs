#[path = "common/mod.rs"]
mod common;

use common::*;
use tqload::{Batch, Batcher, LineStream, LoadError};

fn ok_records(items: &[&str]) -> Vec<Result<String, LoadError>> {
    items.iter().map(|s| Ok(s.to_string())).collect()
}

fn collect(batcher: Batcher<impl Iterator<Item = Result<String, LoadError>>>) -> Vec<Batch> {
    batcher.map(|b| b.unwrap()).collect()
}

/// Three records with batch size 2: `[e1, e2]` then the short tail `[e3]`.
#[test]
fn short_tail_batch() {
    let batches = collect(Batcher::new(ok_records(&["e1", "e2", "e3"]).into_iter(), 2).unwrap());
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].records(), ["e1", "e2"]);
    assert_eq!(batches[1].records(), ["e3"]);
    assert_eq!(batches[0].index(), 0);
    assert_eq!(batches[1].index(), 1);
}

/// Six records with batch size 3 split exactly; no empty trailing batch.
#[test]
fn exact_multiple_has_no_empty_batch() {
    let records = ok_records(&["1", "2", "3", "4", "5", "6"]);
    let mut batcher = Batcher::new(records.into_iter(), 3).unwrap();
    let batches: Vec<Batch> = batcher.by_ref().map(|b| b.unwrap()).collect();
    assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3]);
    assert_eq!(batcher.batches_emitted(), 2);
    assert!(batcher.next().is_none());
}

/// Batch count is ceil(N / B) and concatenating the batches gives back the input.
#[test]
fn batches_cover_input_in_order() {
    for (n, b) in [(1usize, 1usize), (10, 3), (25, 10), (100, 7), (5, 100)] {
        let input = statements("person", n);
        let batches = collect(Batcher::new(input.clone().into_iter().map(Ok), b).unwrap());
        assert_eq!(batches.len(), (n + b - 1) / b, "n={n} b={b}");
        assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= b));
        let flat: Vec<String> = batches.into_iter().flat_map(Batch::into_records).collect();
        assert_eq!(flat, input);
    }
}

#[test]
fn empty_source_yields_no_batches() {
    let mut batcher = Batcher::new(std::iter::empty::<Result<String, LoadError>>(), 4).unwrap();
    assert!(batcher.next().is_none());
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = Batcher::new(std::iter::empty::<Result<String, LoadError>>(), 0).err().unwrap();
    assert!(matches!(err, LoadError::Config(_)));
}

/// A read error mid-stream: full batches before it are delivered, then the error,
/// then nothing. Records buffered for the interrupted batch are not emitted.
#[test]
fn source_error_ends_batches() {
    let tmp = tempfile::tempdir().unwrap();
    let good = tmp.path().join("good.tql");
    write_lines(&good, &statements("person", 5));
    let missing = tmp.path().join("missing.tql");

    let mut batcher = Batcher::new(LineStream::new([&good, &missing]), 2).unwrap();
    assert_eq!(batcher.next().unwrap().unwrap().len(), 2);
    assert_eq!(batcher.next().unwrap().unwrap().len(), 2);
    assert!(matches!(batcher.next(), Some(Err(LoadError::Io { .. }))));
    assert!(batcher.next().is_none());
    assert_eq!(batcher.source().records_read(), 5);
}
