//! Poisson log-likelihood terms.

use statrs::function::gamma::ln_gamma;

/// `ln Pois(k; λ)` without the `ln k!` constant: `k ln λ - λ`.
///
/// `k == 0` gives `-λ` even for `λ == 0`. A positive count at `λ <= 0` is `-inf`.
#[inline]
pub fn ln_pois_kernel(k: f64, lambda: f64) -> f64 {
    if k == 0.0 {
        return -lambda;
    }
    if lambda <= 0.0 {
        return f64::NEG_INFINITY;
    }
    k * lambda.ln() - lambda
}

/// Full `ln Pois(k; λ)` including the `-ln Γ(k+1)` normalization.
pub fn logpmf(k: f64, lambda: f64) -> f64 {
    ln_pois_kernel(k, lambda) - ln_gamma(k + 1.0)
}

/// Saturated kernel `k ln k - k`, the supremum of [`ln_pois_kernel`] over `λ`.
#[inline]
pub fn ln_pois_saturated(k: f64) -> f64 {
    ln_pois_kernel(k, k)
}
