//! POI fits and test statistics.
//!
//! Every statistic is oriented so that larger values are less compatible with the
//! null hypothesis. For exclusion the null is signal-plus-background at the tested
//! point and the alternate is background only; for discovery the null is
//! background only and the alternate is the nominal signal.

use crate::model::{CountingModel, Dataset};
use crate::optimizer::{BoundedLbfgs, ObjectiveFunction, OptimizerConfig};
use tb_core::{Error, FitType, ObservedPoint, Result, TestSpec, TestStatistic};

const BISECTION_STEPS: usize = 80;
const GRAD_TOL: f64 = 1e-6;

/// Unconditional POI fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoiFit {
    /// Best-fit POI within the model bounds.
    pub mu_hat: f64,
    /// Profile NLL at `mu_hat`.
    pub nll: f64,
}

struct ProfileObjective<'a> {
    model: &'a CountingModel,
    data: &'a Dataset,
}

impl ObjectiveFunction for ProfileObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        Ok(self.model.profile_nll(self.data, params[0]))
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![self.model.profile_nll_grad(self.data, params[0])])
    }
}

/// Profile-likelihood fitter for [`CountingModel`].
#[derive(Debug, Clone, Default)]
pub struct ProfileFitter {
    optimizer: BoundedLbfgs,
}

impl ProfileFitter {
    /// Create a fitter with the given optimizer configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { optimizer: BoundedLbfgs::new(config) }
    }

    /// Fit the POI with the background profiled out.
    ///
    /// The profile NLL is convex in `mu`, so a non-negative slope at the lower bound
    /// (or non-positive at the upper) pins the fit there. Interior minima go through
    /// L-BFGS; if that does not land on a stationary point the gradient root is
    /// bracketed and bisected instead.
    pub fn fit_poi(&self, model: &CountingModel, data: &Dataset) -> Result<PoiFit> {
        model.check_dataset(data)?;
        let (lo, hi) = model.poi_bounds();

        let g_lo = model.profile_nll_grad(data, lo);
        let g_hi = model.profile_nll_grad(data, hi);
        let mu_hat = if g_lo >= 0.0 {
            lo
        } else if g_hi <= 0.0 {
            hi
        } else {
            self.interior_minimum(model, data, lo, hi)
        };

        let nll = model.profile_nll(data, mu_hat);
        if !nll.is_finite() {
            return Err(Error::Computation(format!("non-finite NLL at mu_hat = {}", mu_hat)));
        }
        Ok(PoiFit { mu_hat, nll })
    }

    fn interior_minimum(&self, model: &CountingModel, data: &Dataset, lo: f64, hi: f64) -> f64 {
        let start = moment_estimate(model, data).clamp(lo, hi);
        let objective = ProfileObjective { model, data };
        match self.optimizer.minimize(&objective, &[start], &[(lo, hi)]) {
            Ok(r) => {
                let mu = r.parameters[0];
                let g = model.profile_nll_grad(data, mu);
                if r.converged && g.abs() <= GRAD_TOL * (1.0 + r.fval.abs()) {
                    return mu;
                }
                log::debug!("POI fit: L-BFGS stopped at mu={} (|grad|={}), bisecting", mu, g.abs());
            }
            Err(e) => log::debug!("POI fit: L-BFGS failed ({}), bisecting", e),
        }
        bisect_gradient(model, data, lo, hi)
    }

    /// Evaluate the test statistic of `spec` on `data` with the null at `point`.
    pub fn statistic(
        &self,
        model: &CountingModel,
        data: &Dataset,
        spec: &TestSpec,
        point: f64,
    ) -> Result<ObservedPoint> {
        let fit = self.fit_poi(model, data)?;
        let alt = spec.alternate_point();
        let profiled = |mu: f64| model.profile_nll(data, mu);
        let nominal = |mu: f64| model.nll(data, mu, model.nominal_background());

        let q = match (spec.fit_type, spec.statistic) {
            (_, TestStatistic::SimpleLikelihoodRatio) => 2.0 * (nominal(point) - nominal(alt)),
            (_, TestStatistic::ProfileLikelihoodRatio) => 2.0 * (profiled(point) - profiled(alt)),
            (FitType::Exclusion, TestStatistic::ProfileLikelihood) => {
                (2.0 * (profiled(point) - fit.nll)).max(0.0)
            }
            (FitType::Exclusion, TestStatistic::ProfileLikelihoodOneSided) => {
                if fit.mu_hat > point {
                    0.0
                } else {
                    (2.0 * (profiled(point) - fit.nll)).max(0.0)
                }
            }
            // q0: mu_hat is bounded below by the null, so only excesses contribute.
            (
                FitType::Discovery,
                TestStatistic::ProfileLikelihood | TestStatistic::ProfileLikelihoodOneSided,
            ) => {
                if fit.mu_hat <= point {
                    0.0
                } else {
                    (2.0 * (profiled(point) - fit.nll)).max(0.0)
                }
            }
            (FitType::Exclusion, TestStatistic::MaxLikelihood) => point - fit.mu_hat,
            (FitType::Discovery, TestStatistic::MaxLikelihood) => fit.mu_hat - point,
        };

        if !q.is_finite() {
            return Err(Error::Computation(format!(
                "non-finite {} statistic at POI {}",
                spec.statistic, point
            )));
        }
        Ok(ObservedPoint { statistic: q, poi_hat: fit.mu_hat })
    }
}

fn moment_estimate(model: &CountingModel, data: &Dataset) -> f64 {
    let mut excess = 0.0;
    let mut signal = 0.0;
    for i in 0..model.n_bins() {
        excess += data.main[i] - data.aux[i] / model.tau()[i];
        signal += model.signal()[i];
    }
    if signal > 0.0 { excess / signal } else { 0.0 }
}

fn bisect_gradient(model: &CountingModel, data: &Dataset, mut lo: f64, mut hi: f64) -> f64 {
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if model.profile_nll_grad(data, mid) > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-12 * (1.0 + hi.abs()) {
            break;
        }
    }
    0.5 * (lo + hi)
}
