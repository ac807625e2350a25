//! Boundary between the engine and a model capability.
//!
//! A [`WorkUnit`] is the smallest piece of toy work: one batch of toys at one point
//! under one unit seed. Units are executed by a [`UnitExecutor`], either inside the
//! current process ([`InProcessExecutor`], serialized behind a mutex) or in a
//! disposable child process ([`crate::worker::ProcessExecutor`]), whose side of the
//! protocol is [`serve_worker`].

use crate::pool::CancelToken;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Mutex;
use tb_core::{Error, ModelRef, Result, TestSpec, ToyBatch, ToyGenerator, points_match};

/// One batch of toys at one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Dispatch index; also the offset used to derive `seed`.
    pub index: usize,
    /// Tested POI value.
    pub point: f64,
    /// Unit seed.
    pub seed: u32,
    /// Toys to generate per ensemble.
    pub n_toys: usize,
}

/// Request sent to a worker process on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Model the worker must load.
    pub model: ModelRef,
    /// Test configuration.
    pub spec: TestSpec,
    /// Work to do.
    pub unit: WorkUnit,
}

/// Executes units of toy work.
pub trait UnitExecutor: Send + Sync {
    /// Run one unit to completion. Returns [`Error::Cancelled`] if `cancel` fired first.
    fn execute(&self, unit: &WorkUnit, cancel: &CancelToken) -> Result<ToyBatch>;
}

/// Check a batch returned for `unit` before accepting it.
pub fn validate_batch(unit: &WorkUnit, batch: &ToyBatch) -> Result<()> {
    if !points_match(batch.point, unit.point)
        || batch.seed != u64::from(unit.seed)
        || batch.requested != unit.n_toys
    {
        return Err(Error::Worker(format!(
            "unit {} (POI {}, seed {}) answered for POI {}, seed {}, {} toys",
            unit.index, unit.point, unit.seed, batch.point, batch.seed, batch.requested
        )));
    }
    batch.check_accounting()
}

/// Runs units in the current process.
///
/// Generators are not assumed thread-safe, so every call is serialized; parallelism
/// comes only from worker processes.
pub struct InProcessExecutor<G> {
    generator: Mutex<G>,
    spec: TestSpec,
}

impl<G: ToyGenerator + Send> InProcessExecutor<G> {
    /// Wrap a generator.
    pub fn new(generator: G, spec: TestSpec) -> Self {
        Self { generator: Mutex::new(generator), spec }
    }
}

impl<G: ToyGenerator + Send> UnitExecutor for InProcessExecutor<G> {
    fn execute(&self, unit: &WorkUnit, cancel: &CancelToken) -> Result<ToyBatch> {
        let generator = self
            .generator
            .lock()
            .map_err(|_| Error::Worker("in-process generator lock poisoned".to_string()))?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("unit {} not started", unit.index)));
        }
        let batch = generator.generate(&self.spec, unit.point, u64::from(unit.seed), unit.n_toys)?;
        validate_batch(unit, &batch)?;
        Ok(batch)
    }
}

/// Worker side of the process protocol: read one [`WorkerRequest`], answer one [`ToyBatch`].
pub fn serve_worker<G, R, W, F>(mut input: R, mut output: W, load: F) -> Result<()>
where
    G: ToyGenerator,
    R: Read,
    W: Write,
    F: FnOnce(&ModelRef) -> Result<G>,
{
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    let request: WorkerRequest = serde_json::from_str(&text)?;
    let generator = load(&request.model)?;
    let unit = &request.unit;
    log::debug!(
        "worker: {} toys at POI {} (seed {}) with {}",
        unit.n_toys,
        unit.point,
        unit.seed,
        generator.name()
    );
    let batch =
        generator.generate(&request.spec, unit.point, u64::from(unit.seed), unit.n_toys)?;
    serde_json::to_writer(&mut output, &batch)?;
    output.flush()?;
    Ok(())
}
