//! On/off counting model.

use crate::workspace::CountingModelSpec;
use tb_core::{Error, Result};
use tb_prob::poisson::ln_pois_kernel;

/// Observed counts for every bin: signal region (`main`) and control region (`aux`).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Signal-region counts.
    pub main: Vec<f64>,
    /// Control-region counts.
    pub aux: Vec<f64>,
}

/// Multi-bin on/off counting model with a bounded POI.
#[derive(Debug, Clone)]
pub struct CountingModel {
    poi_name: String,
    poi_max: f64,
    signal: Vec<f64>,
    background: Vec<f64>,
    tau: Vec<f64>,
    observed: Dataset,
}

impl CountingModel {
    /// Build and validate a model from its serialized form.
    pub fn from_spec(spec: &CountingModelSpec) -> Result<Self> {
        if spec.bins.is_empty() {
            return Err(Error::Validation("counting model has no bins".to_string()));
        }
        if !(spec.poi_max.is_finite() && spec.poi_max > 0.0) {
            return Err(Error::Validation(format!(
                "poi_max must be finite and > 0, got {}",
                spec.poi_max
            )));
        }

        let n = spec.bins.len();
        let mut signal = Vec::with_capacity(n);
        let mut background = Vec::with_capacity(n);
        let mut tau = Vec::with_capacity(n);
        let mut main = Vec::with_capacity(n);
        let mut aux = Vec::with_capacity(n);

        for (i, bin) in spec.bins.iter().enumerate() {
            let label = if bin.name.is_empty() { format!("#{}", i) } else { bin.name.clone() };
            let check = |what: &str, v: f64, strict: bool| -> Result<()> {
                let ok = v.is_finite() && if strict { v > 0.0 } else { v >= 0.0 };
                if ok {
                    Ok(())
                } else {
                    Err(Error::Validation(format!(
                        "bin {}: {} must be finite and {} 0, got {}",
                        label,
                        what,
                        if strict { ">" } else { ">=" },
                        v
                    )))
                }
            };
            check("observed", bin.observed, false)?;
            check("signal", bin.signal, false)?;
            check("background", bin.background, false)?;
            check("tau", bin.tau, true)?;
            let m = bin.aux_observed.unwrap_or(bin.tau * bin.background);
            check("aux_observed", m, false)?;

            signal.push(bin.signal);
            background.push(bin.background);
            tau.push(bin.tau);
            main.push(bin.observed);
            aux.push(m);
        }

        if signal.iter().all(|&s| s == 0.0) {
            return Err(Error::Validation("counting model has zero signal in every bin".to_string()));
        }

        Ok(Self {
            poi_name: spec.poi.clone(),
            poi_max: spec.poi_max,
            signal,
            background,
            tau,
            observed: Dataset { main, aux },
        })
    }

    /// POI name.
    pub fn poi_name(&self) -> &str {
        &self.poi_name
    }

    /// POI bounds `(0, poi_max)`.
    pub fn poi_bounds(&self) -> (f64, f64) {
        (0.0, self.poi_max)
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.signal.len()
    }

    /// Signal yields at `mu = 1`.
    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// Nominal background yields.
    pub fn nominal_background(&self) -> &[f64] {
        &self.background
    }

    /// Control-region ratios.
    pub fn tau(&self) -> &[f64] {
        &self.tau
    }

    /// Observed dataset.
    pub fn observed(&self) -> &Dataset {
        &self.observed
    }

    /// Check that a dataset has one main and one aux count per bin.
    pub fn check_dataset(&self, data: &Dataset) -> Result<()> {
        if data.main.len() != self.n_bins() || data.aux.len() != self.n_bins() {
            return Err(Error::Validation(format!(
                "dataset shape ({}, {}) does not match {} bins",
                data.main.len(),
                data.aux.len(),
                self.n_bins()
            )));
        }
        Ok(())
    }

    /// Background values maximizing the likelihood at fixed `mu` (conditional MLE).
    pub fn conditional_background(&self, data: &Dataset, mu: f64) -> Vec<f64> {
        (0..self.n_bins())
            .map(|i| {
                conditional_beta(mu * self.signal[i], data.main[i], data.aux[i], self.tau[i])
            })
            .collect()
    }

    /// Negative log-likelihood (without count factorials) at `(mu, beta)`.
    pub fn nll(&self, data: &Dataset, mu: f64, beta: &[f64]) -> f64 {
        let mut ll = 0.0;
        for i in 0..self.n_bins() {
            ll += ln_pois_kernel(data.main[i], mu * self.signal[i] + beta[i]);
            ll += ln_pois_kernel(data.aux[i], self.tau[i] * beta[i]);
        }
        -ll
    }

    /// Profile NLL: [`Self::nll`] with the background at its conditional MLE.
    pub fn profile_nll(&self, data: &Dataset, mu: f64) -> f64 {
        let beta = self.conditional_background(data, mu);
        self.nll(data, mu, &beta)
    }

    /// Derivative of the profile NLL with respect to `mu`.
    pub fn profile_nll_grad(&self, data: &Dataset, mu: f64) -> f64 {
        let beta = self.conditional_background(data, mu);
        let mut g = 0.0;
        for i in 0..self.n_bins() {
            let s = self.signal[i];
            if s == 0.0 {
                continue;
            }
            let lam = mu * s + beta[i];
            g += if data.main[i] == 0.0 { s } else { s * (1.0 - data.main[i] / lam) };
        }
        g
    }

    /// Expected dataset `(mu * s + beta, tau * beta)`.
    pub fn expected(&self, mu: f64, beta: &[f64]) -> Dataset {
        Dataset {
            main: (0..self.n_bins()).map(|i| mu * self.signal[i] + beta[i]).collect(),
            aux: (0..self.n_bins()).map(|i| self.tau[i] * beta[i]).collect(),
        }
    }
}

/// Closed-form conditional MLE of one bin's background.
///
/// Solves `(1+tau) b^2 + ((1+tau) a - n - m) b - m a = 0` for its non-negative
/// root, where `a = mu * s` is the signal expectation.
fn conditional_beta(a: f64, n: f64, m: f64, tau: f64) -> f64 {
    let k = 1.0 + tau;
    if a <= 0.0 {
        return (n + m) / k;
    }
    let b = k * a - n - m;
    let disc = (b * b + 4.0 * k * m * a).max(0.0);
    let root = disc.sqrt();
    let beta = if b > 0.0 { 2.0 * m * a / (b + root) } else { (root - b) / (2.0 * k) };
    beta.max(0.0)
}
