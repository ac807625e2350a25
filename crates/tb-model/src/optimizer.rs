//! Bounded L-BFGS wrapper around argmin.
//!
//! Bounds are enforced by clamping every evaluation point and projecting the
//! gradient at active bounds, which is enough for the low-dimensional POI fits
//! done by [`crate::fit`].

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::fmt;
use tb_core::{Error, Result};

/// Configuration for the bounded L-BFGS optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm
    pub tol: f64,
    /// Number of stored corrections
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 200, tol: 1e-8, m: 5 }
    }
}

/// Result of one minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters (inside the bounds)
    pub parameters: Vec<f64>,
    /// Objective value at the best fit
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Whether the solver reported convergence
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, converged={})",
            self.fval, self.n_iter, self.converged
        )
    }
}

/// Objective with an analytic gradient.
pub trait ObjectiveFunction {
    /// Evaluate at `params`.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>>;
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

struct Problem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
}

impl CostFunction for Problem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for Problem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // Zero components that push outward at an active bound.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
            if (x <= lo + EPS && g[i] > 0.0) || (x >= hi - EPS && g[i] < 0.0) {
                g[i] = 0.0;
            }
        }
        Ok(g)
    }
}

/// L-BFGS with box constraints.
#[derive(Debug, Clone, Default)]
pub struct BoundedLbfgs {
    config: OptimizerConfig,
}

impl BoundedLbfgs {
    /// Create an optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` from `init` within `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter and bounds length mismatch: {} != {}",
                init.len(),
                bounds.len()
            )));
        }

        let init_clamped = clamp_params(init, bounds);
        let problem = Problem { objective, bounds };

        let tol_cost = (0.1 * self.config.tol).max(1e-12);
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("invalid optimizer configuration: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init_clamped).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("optimization failed: {}", e)))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("no best parameters found".to_string()))?;
        let parameters = clamp_params(best, bounds);
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            converged,
            message: termination.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Shifted(f64);

    impl ObjectiveFunction for Shifted {
        fn eval(&self, p: &[f64]) -> Result<f64> {
            Ok((p[0] - self.0).powi(2))
        }

        fn gradient(&self, p: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![2.0 * (p[0] - self.0)])
        }
    }

    #[test]
    fn test_interior_minimum() {
        let r = BoundedLbfgs::default().minimize(&Shifted(3.0), &[0.5], &[(0.0, 10.0)]).unwrap();
        assert!(r.converged, "{}", r.message);
        assert_relative_eq!(r.parameters[0], 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_pinned_at_lower_bound() {
        let r = BoundedLbfgs::default().minimize(&Shifted(-1.0), &[5.0], &[(0.0, 10.0)]).unwrap();
        assert_relative_eq!(r.parameters[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(r.fval, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(BoundedLbfgs::default().minimize(&Shifted(0.0), &[0.0, 1.0], &[(0.0, 1.0)]).is_err());
    }
}
