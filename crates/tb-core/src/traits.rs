//! Core traits for toybail
//!
//! The inference layer never looks inside a model. It only needs something that can
//! evaluate the observed test statistic at a POI value, sample statistic distributions
//! for a given unit seed, and (for asymptotic calculators) produce analytic p-values.

use crate::{AsymptoticPoint, ObservedPoint, Result, TestSpec, ToyBatch};

/// Model-side capability used by scanners, discovery tests, and workers.
pub trait ToyGenerator {
    /// Evaluate the test statistic on observed data at `point`.
    fn observe(&self, spec: &TestSpec, point: f64) -> Result<ObservedPoint>;

    /// Sample `n_toys` statistics under the null and alternate hypotheses at `point`.
    ///
    /// The result must be a pure function of `(spec, point, seed, n_toys)`.
    /// Toys on which the model fails are counted in `null_failed` / `alt_failed`
    /// rather than returned as errors.
    fn generate(&self, spec: &TestSpec, point: f64, seed: u64, n_toys: usize) -> Result<ToyBatch>;

    /// Analytic p-values at `point` for asymptotic calculators.
    fn asymptotic(&self, spec: &TestSpec, point: f64) -> Result<AsymptoticPoint>;

    /// Human-readable identifier for logs.
    fn name(&self) -> &str;

    /// Reject a POI value the model cannot be evaluated at.
    ///
    /// Called for every point before any work is dispatched.
    fn check_point(&self, point: f64) -> Result<()> {
        if point.is_finite() {
            Ok(())
        } else {
            Err(crate::Error::Validation(format!("POI {} is not finite", point)))
        }
    }
}
