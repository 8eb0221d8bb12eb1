//! Bounded-concurrency scheduler: at most `width` units of work in flight, and a full
//! pipeline refills whichever slot finishes first.
//!
//! Each unit runs on a dedicated rayon pool with one thread per slot. Finished units
//! report `(slot, seq, result)` on a channel, so the channel's arrival order *is* the
//! completion order and a blocking `recv` is the race across all outstanding slots.

use crate::error::LoadError;
use anyhow::anyhow;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// The unit of work: consumes one item, succeeds with an output or fails.
pub type WorkFn<T, R> = Arc<dyn Fn(T) -> anyhow::Result<R> + Send + Sync>;

/// A resolved unit of work.
#[derive(Debug)]
pub struct Completion<R> {
    pub slot: usize,
    /// Submission number, counting from 0 over the pipeline's lifetime.
    pub seq: u64,
    pub output: R,
}

/// What `submit` did: where the new unit was started, and which unit it had to wait for.
#[derive(Debug)]
pub struct Submission<R> {
    pub slot: usize,
    pub seq: u64,
    /// The unit that vacated `slot`, when the pipeline was full.
    pub freed: Option<Completion<R>>,
}

struct Finished<R> {
    slot: usize,
    seq: u64,
    result: anyhow::Result<R>,
}

/// Runs up to `width` units of work concurrently.
///
/// `submit` starts work immediately while a slot is free and otherwise blocks until
/// the earliest-finishing unit resolves, then reuses that unit's slot. `drain` waits
/// for everything outstanding. A failed unit is reported by whichever of the two calls
/// observes it; other units are never cancelled.
///
/// Both calls take `&mut self`: one controlling thread drives a pipeline.
pub struct BoundedPipeline<T, R> {
    width: usize,
    work: WorkFn<T, R>,
    pool: rayon::ThreadPool,
    // seq of the unit occupying each slot
    slots: Vec<Option<u64>>,
    outstanding: usize,
    started: u64,
    completed: u64,
    done_tx: Sender<Finished<R>>,
    done_rx: Receiver<Finished<R>>,
}

impl<T, R> BoundedPipeline<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(width: usize, work: F) -> Result<Self, LoadError>
    where
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self::with_work(width, Arc::new(work))
    }

    pub fn with_work(width: usize, work: WorkFn<T, R>) -> Result<Self, LoadError> {
        if width == 0 {
            return Err(LoadError::config("concurrency width must be at least 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("tqload-slot-{i}"))
            .build()?;
        let (done_tx, done_rx) = mpsc::channel();
        Ok(Self {
            width,
            work,
            pool,
            slots: vec![None; width],
            outstanding: 0,
            started: 0,
            completed: 0,
            done_tx,
            done_rx,
        })
    }

    /// Start `item` in the lowest free slot, waiting for the first unit to finish when
    /// all slots are busy.
    ///
    /// If the unit waited on failed, `item` is still started in the vacated slot and
    /// then that failure is returned. The new unit is observed by a later `submit` or
    /// `drain` like any other.
    pub fn submit(&mut self, item: T) -> Result<Submission<R>, LoadError> {
        let freed = if self.outstanding >= self.width {
            Some(self.await_next())
        } else {
            None
        };
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => unreachable!("fewer than width units outstanding but no free slot"),
        };
        let seq = self.start(slot, item);
        let freed = freed.transpose()?;
        Ok(Submission { slot, seq, freed })
    }

    fn start(&mut self, slot: usize, item: T) -> u64 {
        let seq = self.started;
        self.started += 1;
        self.slots[slot] = Some(seq);
        self.outstanding += 1;

        let work = Arc::clone(&self.work);
        let tx = self.done_tx.clone();
        tracing::debug!(slot, seq, outstanding = self.outstanding, "starting unit of work");
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                .unwrap_or_else(|payload| Err(anyhow!("unit of work panicked: {}", panic_message(&payload))));
            // The receiver lives as long as the pipeline, which waits for us on drop.
            let _ = tx.send(Finished { slot, seq, result });
        });
        seq
    }
}

impl<T, R> BoundedPipeline<T, R> {
    /// Wait for every outstanding unit. On success returns their outputs in completion
    /// order. On failure every unit is still waited for, then the first failure is returned.
    pub fn drain(&mut self) -> Result<Vec<Completion<R>>, LoadError> {
        let mut done = Vec::with_capacity(self.outstanding);
        let mut first_err = None;
        while self.outstanding > 0 {
            match self.await_next() {
                Ok(c) => done.push(c),
                Err(e) if first_err.is_none() => first_err = Some(e),
                Err(e) => tracing::warn!("further failure while draining: {e}"),
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Units started and not yet observed by `submit`/`drain`.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Submission number of the unit occupying `slot`.
    pub fn slot_seq(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot).copied().flatten()
    }

    fn await_next(&mut self) -> Result<Completion<R>, LoadError> {
        let finished = match self.done_rx.recv() {
            Ok(f) => f,
            Err(_) => {
                // Unreachable while `done_tx` is alive; keep the bookkeeping consistent anyway.
                let lost = self.outstanding;
                self.outstanding = 0;
                self.slots.iter_mut().for_each(|s| *s = None);
                return Err(LoadError::Work {
                    slot: 0,
                    seq: self.completed,
                    source: anyhow!("worker pool disconnected with {lost} units outstanding"),
                });
            }
        };
        let Finished { slot, seq, result } = finished;
        self.slots[slot] = None;
        self.outstanding -= 1;
        self.completed += 1;
        match result {
            Ok(output) => {
                tracing::debug!(slot, seq, "unit of work finished");
                Ok(Completion { slot, seq, output })
            }
            Err(source) => Err(LoadError::Work { slot, seq, source }),
        }
    }
}

impl<T, R> Drop for BoundedPipeline<T, R> {
    fn drop(&mut self) {
        // Outstanding units hold clones of the caller's handles; wait them out.
        while self.outstanding > 0 {
            if let Err(e) = self.await_next() {
                tracing::warn!("unit of work failed after its pipeline was abandoned: {e}");
            }
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
