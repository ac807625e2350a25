//! Bounded pool of dispatch threads, each driving one unit at a time.
//!
//! With [`crate::worker::ProcessExecutor`] every unit runs in a fresh child process
//! that exits when the unit is done, so whatever a model leaks is reclaimed per unit.
//! Outcomes are delivered in completion order and carry their [`WorkUnit`], so
//! callers attribute them by unit index rather than by arrival.

use crate::adapter::{UnitExecutor, WorkUnit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tb_core::{Error, Result, ToyBatch};

/// Hard upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 256;

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    deadline: Option<(Instant, Duration)>,
}

/// Shared cancellation flag, optionally armed with a deadline.
///
/// The deadline is checked whenever the token is polled; no timer thread is involved.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that reports cancellation once `after` has elapsed from now.
    pub fn with_deadline(after: Duration) -> Self {
        let deadline = Instant::now().checked_add(after).map(|at| (at, after));
        Self(Arc::new(CancelState { flag: AtomicBool::new(false), deadline }))
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        if self.0.flag.load(Ordering::SeqCst) {
            return true;
        }
        match self.0.deadline {
            Some((at, after)) if Instant::now() >= at => {
                if !self.0.flag.swap(true, Ordering::SeqCst) {
                    log::warn!("deadline of {:?} reached; cancelling outstanding work", after);
                }
                true
            }
            _ => false,
        }
    }
}

/// What happened to one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// The unit delivered a batch.
    Completed(ToyBatch),
    /// The unit failed; siblings are unaffected.
    Failed(String),
    /// The unit never ran (or was killed) because of cancellation.
    Skipped,
}

/// A unit together with its outcome.
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// The unit.
    pub unit: WorkUnit,
    /// Its outcome.
    pub outcome: UnitOutcome,
}

/// Counts of unit outcomes for one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Units that delivered a batch.
    pub completed: usize,
    /// Units that failed.
    pub failed: usize,
    /// Units skipped because of cancellation.
    pub skipped: usize,
}

impl PoolSummary {
    /// Tally a list of reports.
    pub fn from_reports(reports: &[UnitReport]) -> Self {
        let mut s = Self::default();
        for r in reports {
            match r.outcome {
                UnitOutcome::Completed(_) => s.completed += 1,
                UnitOutcome::Failed(_) => s.failed += 1,
                UnitOutcome::Skipped => s.skipped += 1,
            }
        }
        s
    }

    /// Accumulate another summary.
    pub fn absorb(&mut self, other: PoolSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Resolve the worker count: `0` means auto, and the result is capped by the
/// available parallelism and [`MAX_WORKERS`].
pub fn effective_workers(requested: usize) -> usize {
    let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let wanted = if requested == 0 { available } else { requested };
    wanted.min(available).min(MAX_WORKERS).max(1)
}

/// Bounded scheduler for independent units.
#[derive(Debug, Clone)]
pub struct ProcessPool {
    workers: usize,
}

impl ProcessPool {
    /// Pool with [`effective_workers`]`(requested)` workers.
    pub fn new(requested: usize) -> Self {
        Self { workers: effective_workers(requested) }
    }

    /// Number of concurrent workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every unit, at most `workers()` at a time.
    ///
    /// `on_report` sees each outcome as it arrives. Once `cancel` fires no further
    /// units start; the remaining ones are reported as skipped.
    pub fn run<F>(
        &self,
        units: &[WorkUnit],
        executor: &dyn UnitExecutor,
        cancel: &CancelToken,
        mut on_report: F,
    ) -> Result<Vec<UnitReport>>
    where
        F: FnMut(&UnitReport),
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("toybail-dispatch-{}", i))
            .build()
            .map_err(|e| Error::Worker(format!("failed to start dispatch threads: {}", e)))?;

        let mut reports = Vec::with_capacity(units.len());
        pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel::<UnitReport>();
            for unit in units {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = if cancel.is_cancelled() {
                        UnitOutcome::Skipped
                    } else {
                        match executor.execute(unit, cancel) {
                            Ok(batch) => UnitOutcome::Completed(batch),
                            Err(Error::Cancelled(_)) => UnitOutcome::Skipped,
                            Err(e) => UnitOutcome::Failed(e.to_string()),
                        }
                    };
                    // The receiver lives until every sender is gone.
                    let _ = tx.send(UnitReport { unit: unit.clone(), outcome });
                });
            }
            drop(tx);
            for report in rx.iter() {
                if let UnitOutcome::Failed(msg) = &report.outcome {
                    log::warn!(
                        "unit {} (POI {}, seed {}) failed: {}",
                        report.unit.index,
                        report.unit.point,
                        report.unit.seed,
                        msg
                    );
                }
                on_report(&report);
                reports.push(report);
            }
        });
        Ok(reports)
    }
}
