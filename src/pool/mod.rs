//! Bounded worker pool for batched per-item work.
//!
//! Items are processed in fixed-size batches with a barrier after each batch. Before every
//! batch the host memory is checked; above the threshold the pool backs off for a short pause
//! and then continues. A failing or panicking item yields `None` in its slot and never stops
//! the batch. Results always come back in input order.

mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::foundation::error::{TileslideError, TileslideResult};
use crate::host::HostProbe;

/// Default back-off when memory use is above the threshold.
pub const DEFAULT_PRESSURE_PAUSE: Duration = Duration::from_secs(1);

/// Per-call batching options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOpts {
    /// Work dominated by file IO: run on plain scoped threads instead of the rayon pool.
    pub io_bound: bool,
    /// Items per batch (`0` is treated as 1).
    pub batch_size: usize,
    /// Memory utilization (percent) above which the pool pauses before a batch.
    pub memory_threshold_pct: u8,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            io_bound: false,
            batch_size: 30,
            memory_threshold_pct: 85,
        }
    }
}

/// Progress after one completed batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEvent {
    /// 0-based batch number.
    pub batch: usize,
    /// Items finished so far (all batches).
    pub done: usize,
    /// Items in the whole call.
    pub total: usize,
    /// Successes in this batch.
    pub succeeded: usize,
    /// Failures in this batch.
    pub failed: usize,
}

/// One failed item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    /// Index into the input slice.
    pub index: usize,
    /// Printable cause.
    pub message: String,
}

/// Aggregate result of [`WorkerPool::run_batch`].
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// One slot per input item, `None` where the item failed.
    pub results: Vec<Option<R>>,
    /// Number of successful items.
    pub succeeded: usize,
    /// Number of failed items.
    pub failed: usize,
    /// Failure details in input order.
    pub failures: Vec<ItemFailure>,
    /// One event per completed batch.
    pub events: Vec<BatchEvent>,
    /// How many times the pool paused for memory pressure.
    pub pressure_pauses: usize,
}

/// Fixed set of workers shared by every batch of a run.
pub struct WorkerPool {
    workers: usize,
    pool: rayon::ThreadPool,
    host: Arc<dyn HostProbe>,
    pressure_pause: Duration,
}

impl WorkerPool {
    /// Build a pool with exactly `workers` threads (must be >= 1).
    pub fn new(workers: usize, host: Arc<dyn HostProbe>) -> TileslideResult<Self> {
        if workers == 0 {
            return Err(TileslideError::validation("worker pool needs at least one worker"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tileslide-worker-{i}"))
            .build()
            .map_err(|e| {
                TileslideError::resource_acquisition(format!("failed to build thread pool: {e}"))
            })?;
        Ok(Self {
            workers,
            pool,
            host,
            pressure_pause: DEFAULT_PRESSURE_PAUSE,
        })
    }

    /// Override the memory-pressure back-off.
    pub fn with_pressure_pause(mut self, pause: Duration) -> Self {
        self.pressure_pause = pause;
        self
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every item, batch by batch.
    ///
    /// `f` receives only the item, so it cannot depend on completion order.
    pub fn run_batch<T, R, F>(&self, items: &[T], f: F, opts: &BatchOpts) -> BatchOutcome<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> TileslideResult<R> + Sync,
    {
        let batch_size = opts.batch_size.max(1);
        let total = items.len();
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(total),
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            events: Vec::with_capacity(total.div_ceil(batch_size)),
            pressure_pauses: 0,
        };

        for (batch, chunk) in items.chunks(batch_size).enumerate() {
            if self.under_pressure(opts.memory_threshold_pct) {
                outcome.pressure_pauses += 1;
                std::thread::sleep(self.pressure_pause);
            }

            let offset = batch * batch_size;
            let results = if opts.io_bound {
                worker::run_on_threads(self.workers, chunk, &f)
            } else {
                worker::run_on_pool(&self.pool, chunk, &f)
            };

            let (mut ok, mut bad) = (0, 0);
            for (i, res) in results.into_iter().enumerate() {
                match res {
                    Ok(v) => {
                        ok += 1;
                        outcome.results.push(Some(v));
                    }
                    Err(message) => {
                        bad += 1;
                        outcome.failures.push(ItemFailure {
                            index: offset + i,
                            message,
                        });
                        outcome.results.push(None);
                    }
                }
            }
            outcome.succeeded += ok;
            outcome.failed += bad;
            outcome.events.push(BatchEvent {
                batch,
                done: outcome.results.len(),
                total,
                succeeded: ok,
                failed: bad,
            });
            tracing::debug!(batch, done = outcome.results.len(), total, ok, bad, "batch complete");
        }

        outcome
    }

    fn under_pressure(&self, threshold_pct: u8) -> bool {
        let mem = self.host.memory();
        let used = mem.used_percent();
        if used > f64::from(threshold_pct) {
            tracing::warn!(
                used_pct = format!("{used:.1}"),
                threshold_pct,
                pause_ms = self.pressure_pause.as_millis() as u64,
                "memory pressure, pausing before next batch"
            );
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pool.rs"]
mod tests;
