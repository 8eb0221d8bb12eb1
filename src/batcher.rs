//! Fixed-size grouping of records into batches.

use crate::error::LoadError;
use std::iter::FusedIterator;

/// Ordered, non-empty group of records submitted as one unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    index: u64,
    records: Vec<String>,
}

impl Batch {
    /// Position of this batch in the sequence produced by its batcher (0-based).
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<String> {
        self.records
    }
}

impl IntoIterator for Batch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Lazily cuts a record stream into batches of `batch_size`, the last one possibly short.
///
/// The batcher knows nothing about files: wrap one file's stream to keep batches
/// within that file, or a multi-file stream to let them span file boundaries.
/// A source error is yielded as-is (any records buffered for the current batch are
/// dropped) and ends the sequence.
pub struct Batcher<I> {
    source: I,
    batch_size: usize,
    emitted: u64,
    done: bool,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = Result<String, LoadError>>,
{
    pub fn new(source: I, batch_size: usize) -> Result<Self, LoadError> {
        if batch_size == 0 {
            return Err(LoadError::config("batch size must be at least 1"));
        }
        Ok(Self { source, batch_size, emitted: 0, done: false })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batches_emitted(&self) -> u64 {
        self.emitted
    }

    /// The wrapped record stream (e.g. to read `LineStream` counters mid-run).
    pub fn source(&self) -> &I {
        &self.source
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<String, LoadError>>,
{
    type Item = Result<Batch, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut records = Vec::with_capacity(self.batch_size.min(4096));
        while records.len() < self.batch_size {
            match self.source.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if records.is_empty() {
            return None;
        }
        let batch = Batch { index: self.emitted, records };
        self.emitted += 1;
        Some(Ok(batch))
    }
}

impl<I> FusedIterator for Batcher<I> where I: Iterator<Item = Result<String, LoadError>> {}
