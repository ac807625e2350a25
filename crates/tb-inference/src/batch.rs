//! Splitting toy requests into units and reassembling their results.

use crate::adapter::WorkUnit;
use crate::pool::{UnitOutcome, UnitReport};
use serde::{Deserialize, Serialize};
use tb_core::{Error, Result, SeedAllocator};

/// Split `total` toys into `ceil(total / batch)` batches of at most `batch` toys.
///
/// Every batch is non-empty and the sizes sum to `total`.
pub fn split_batches(total: usize, batch: usize) -> Result<Vec<usize>> {
    if batch == 0 {
        return Err(Error::Validation("batch size must be > 0".to_string()));
    }
    let n = total.div_ceil(batch);
    Ok((0..n).map(|i| batch.min(total - i * batch)).collect())
}

/// Enumerate units in (point, batch) order with seeds from `seeds`.
pub fn plan_units(
    points: &[f64],
    n_toys: usize,
    n_batch: usize,
    seeds: &SeedAllocator,
) -> Result<Vec<WorkUnit>> {
    let sizes = split_batches(n_toys, n_batch)?;
    let mut units = Vec::with_capacity(points.len() * sizes.len());
    for &point in points {
        for &n in &sizes {
            let index = units.len();
            let offset = u32::try_from(index)
                .map_err(|_| Error::Validation(format!("too many units: {}", index)))?;
            units.push(WorkUnit { index, point, seed: seeds.unit_seed(offset)?, n_toys: n });
        }
    }
    Ok(units)
}

/// A unit that did not deliver its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Dispatch index.
    pub unit: usize,
    /// Tested POI value.
    pub point: f64,
    /// Unit seed.
    pub seed: u32,
    /// Cause.
    pub message: String,
}

/// Samples gathered for one point, concatenated in batch order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSamples {
    /// Tested POI value.
    pub point: f64,
    /// Null-hypothesis samples.
    pub null: Vec<f64>,
    /// Alternate-hypothesis samples.
    pub alt: Vec<f64>,
    /// Toys requested per ensemble.
    pub requested: usize,
    /// Units that failed or were skipped.
    pub failures: Vec<UnitFailure>,
}

impl PointSamples {
    /// Missing null samples.
    pub fn null_shortfall(&self) -> usize {
        self.requested.saturating_sub(self.null.len())
    }

    /// Missing alternate samples.
    pub fn alt_shortfall(&self) -> usize {
        self.requested.saturating_sub(self.alt.len())
    }
}

/// Reassemble reports (any order) into per-point samples, in unit order.
///
/// `units` must be the list [`plan_units`] produced for `points`: point-major with
/// the same number of units for every point.
pub fn assemble(points: &[f64], units: &[WorkUnit], reports: Vec<UnitReport>) -> Vec<PointSamples> {
    let mut outcomes: Vec<Option<UnitOutcome>> = vec![None; units.len()];
    for report in reports {
        if let Some(slot) = outcomes.get_mut(report.unit.index) {
            *slot = Some(report.outcome);
        }
    }

    let per_point = if points.is_empty() { 0 } else { units.len() / points.len() };
    let mut outcomes = outcomes.into_iter();
    let mut out = Vec::with_capacity(points.len());
    for (p, &point) in points.iter().enumerate() {
        let mut samples = PointSamples {
            point,
            null: Vec::new(),
            alt: Vec::new(),
            requested: 0,
            failures: Vec::new(),
        };
        let planned = units.get(p * per_point..(p + 1) * per_point).unwrap_or(&[]);
        for (unit, outcome) in planned.iter().zip(outcomes.by_ref()) {
            samples.requested += unit.n_toys;
            let failure = |message: String| UnitFailure {
                unit: unit.index,
                point: unit.point,
                seed: unit.seed,
                message,
            };
            match outcome {
                Some(UnitOutcome::Completed(batch)) => {
                    samples.null.extend(batch.null);
                    samples.alt.extend(batch.alt);
                }
                Some(UnitOutcome::Failed(msg)) => samples.failures.push(failure(msg)),
                Some(UnitOutcome::Skipped) => {
                    samples.failures.push(failure("skipped (cancelled)".to_string()))
                }
                None => samples.failures.push(failure("no outcome reported".to_string())),
            }
        }
        out.push(samples);
    }
    out
}
