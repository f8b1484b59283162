// src/utils/threads.rs

//! Bounded worker scheduling for block encoding.
//!
//! Every unit of work (one block of one plane) is independent, so the only
//! ordering constraint is applied when results are collected: the returned
//! vector always matches the input order, whatever order the workers finish in.
//! The first failing unit raises a cancellation flag; units that have not
//! started yet see it and skip, and the whole batch fails. Batches of one
//! encode call share the flag, so a failure in one stops the others too.

use crate::utils::error::{EncodeError, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

/// Resolves a requested thread count. `None` and `Some(0)` fall back to the
/// available hardware parallelism.
pub fn resolve_thread_count(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1),
    }
}

/// Outcome of a single unit inside a batch.
enum Slot<R> {
    Done(R),
    Failed(EncodeError),
    Panicked(String),
    Skipped,
}

/// A fixed-size worker pool that runs batches of independent units.
pub struct WorkScheduler {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkScheduler {
    /// Creates a scheduler with `threads` workers (see [`resolve_thread_count`]).
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let threads = resolve_thread_count(threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("avif-block-{i}"))
            .build()
            .map_err(|e| EncodeError::InvalidArgument(format!("worker pool: {e}")))?;
        debug!("WorkScheduler started with {} workers", threads);
        Ok(Self { pool, threads })
    }

    /// Number of workers in the pool.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `f` over every item on the pool and returns the results in input order.
    ///
    /// If any unit returns an error or panics, units that have not started yet are
    /// skipped, in-flight units finish but their results are dropped, and the call
    /// fails with [`EncodeError::WorkerPanic`] for the lowest failing index.
    pub fn run_parallel<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        self.run_parallel_with(&AtomicBool::new(false), items, f)
    }

    /// Like [`run_parallel`](Self::run_parallel), with a cancellation flag shared
    /// between batches.
    ///
    /// A failure in this batch raises `cancelled`, and a raised flag stops this
    /// batch from starting further units. A batch that lost units to another
    /// batch's failure, without failing itself, returns [`EncodeError::Cancelled`].
    pub fn run_parallel_with<T, R, F>(
        &self,
        cancelled: &AtomicBool,
        items: &[T],
        f: F,
    ) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let slots: Vec<Slot<R>> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if cancelled.load(Ordering::Acquire) {
                        return Slot::Skipped;
                    }
                    match panic::catch_unwind(AssertUnwindSafe(|| f(item))) {
                        Ok(Ok(result)) => Slot::Done(result),
                        Ok(Err(err)) => {
                            cancelled.store(true, Ordering::Release);
                            Slot::Failed(err)
                        }
                        Err(payload) => {
                            cancelled.store(true, Ordering::Release);
                            Slot::Panicked(panic_message(payload.as_ref()))
                        }
                    }
                })
                .collect()
        });

        if slots.iter().all(|s| matches!(s, Slot::Done(_))) {
            let results = slots
                .into_iter()
                .filter_map(|slot| match slot {
                    Slot::Done(result) => Some(result),
                    _ => None,
                })
                .collect();
            return Ok(results);
        }

        let skipped = slots.iter().filter(|s| matches!(s, Slot::Skipped)).count();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Slot::Failed(err) => {
                    warn!("unit {} failed, {} pending units cancelled", index, skipped);
                    return Err(EncodeError::WorkerPanic {
                        index,
                        message: err.to_string(),
                        source: Some(Box::new(err)),
                    });
                }
                Slot::Panicked(message) => {
                    warn!("unit {} panicked, {} pending units cancelled", index, skipped);
                    return Err(EncodeError::WorkerPanic {
                        index,
                        message,
                        source: None,
                    });
                }
                Slot::Done(_) | Slot::Skipped => {}
            }
        }

        debug!("batch cancelled from outside, {} units skipped", skipped);
        Err(EncodeError::Cancelled { skipped })
    }

    /// Runs two closures concurrently on the pool and waits for both.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.install(|| rayon::join(a, b))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
