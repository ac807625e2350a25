//! Toy dataset sampling.
//!
//! Frequentist toys fluctuate both regions around fixed background values.
//! Hybrid toys draw the background of every bin from its posterior given the
//! observed control-region count (flat prior, `Gamma(m + 1, 1 / tau)`) and keep
//! the control-region counts fixed.

use crate::model::{CountingModel, Dataset};
use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};
use tb_core::{Error, Result};

/// Draw one Poisson count. Non-positive or non-finite means yield 0.
pub fn poisson_count<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> Result<f64> {
    if !lambda.is_finite() || lambda <= 0.0 {
        return Ok(0.0);
    }
    let pois = Poisson::new(lambda)
        .map_err(|e| Error::Computation(format!("Poisson({}) invalid: {}", lambda, e)))?;
    Ok(pois.sample(rng))
}

/// Toy with both regions fluctuated around `(mu * s + beta, tau * beta)`.
pub fn sample_frequentist<R: Rng + ?Sized>(
    model: &CountingModel,
    mu: f64,
    beta: &[f64],
    rng: &mut R,
) -> Result<Dataset> {
    let expected = model.expected(mu, beta);
    let mut main = Vec::with_capacity(model.n_bins());
    let mut aux = Vec::with_capacity(model.n_bins());
    for i in 0..model.n_bins() {
        main.push(poisson_count(expected.main[i], rng)?);
        aux.push(poisson_count(expected.aux[i], rng)?);
    }
    Ok(Dataset { main, aux })
}

/// Toy with the background drawn from its posterior and the control region fixed.
pub fn sample_hybrid<R: Rng + ?Sized>(
    model: &CountingModel,
    mu: f64,
    rng: &mut R,
) -> Result<Dataset> {
    let observed = model.observed();
    let mut main = Vec::with_capacity(model.n_bins());
    for i in 0..model.n_bins() {
        let tau = model.tau()[i];
        let posterior = Gamma::new(observed.aux[i] + 1.0, 1.0 / tau)
            .map_err(|e| Error::Computation(format!("background posterior invalid: {}", e)))?;
        let beta = posterior.sample(rng);
        main.push(poisson_count(mu * model.signal()[i] + beta, rng)?);
    }
    Ok(Dataset { main, aux: observed.aux.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::one_bin;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_poisson_zero_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(poisson_count(0.0, &mut rng).unwrap(), 0.0);
        assert_eq!(poisson_count(f64::NAN, &mut rng).unwrap(), 0.0);
    }

    #[test]
    fn test_frequentist_reproducible() {
        let model = one_bin(5.0, 1.0, 4.0, 2.0);
        let a = sample_frequentist(&model, 1.0, &[4.0], &mut StdRng::seed_from_u64(7)).unwrap();
        let b = sample_frequentist(&model, 1.0, &[4.0], &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert!(a.main[0] >= 0.0 && a.main[0].fract() == 0.0);
    }

    #[test]
    fn test_frequentist_mean() {
        let model = one_bin(5.0, 1.0, 4.0, 2.0);
        let mut rng = StdRng::seed_from_u64(11);
        let n = 4000;
        let mut sum_main = 0.0;
        let mut sum_aux = 0.0;
        for _ in 0..n {
            let d = sample_frequentist(&model, 2.0, &[4.0], &mut rng).unwrap();
            sum_main += d.main[0];
            sum_aux += d.aux[0];
        }
        assert!((sum_main / n as f64 - 6.0).abs() < 0.2);
        assert!((sum_aux / n as f64 - 8.0).abs() < 0.25);
    }

    #[test]
    fn test_hybrid_keeps_aux_fixed() {
        let model = one_bin(5.0, 1.0, 4.0, 2.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let d = sample_hybrid(&model, 1.0, &mut rng).unwrap();
            assert_eq!(d.aux, model.observed().aux);
        }
    }
}
