//! Empirical tail probabilities and quantiles over toy ensembles.

/// Tail probability from counts with add-one smoothing: `(k + 1) / (n + 1)`.
///
/// Never returns exactly 0 for a non-empty ensemble. An empty ensemble yields 0.
pub fn tail_prob_counts(n_ge: usize, n_valid: usize) -> f64 {
    if n_valid == 0 {
        return 0.0;
    }
    (n_ge as f64 + 1.0) / (n_valid as f64 + 1.0)
}

/// Smoothed fraction of `sorted` (ascending) that is `>= threshold`.
pub fn tail_prob_sorted(sorted: &[f64], threshold: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let idx = sorted.partition_point(|v| *v < threshold);
    tail_prob_counts(n - idx, n)
}

/// Linear-interpolated quantile of an ascending slice. NaN when empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 1.0 {
        return sorted[n - 1];
    }
    let idx = p * ((n - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - (lo as f64);
    sorted[lo] + w * (sorted[hi] - sorted[lo])
}

/// Binomial standard error `sqrt(p (1 - p) / n)` of an estimated fraction.
pub fn binomial_error(p: f64, n: usize) -> f64 {
    if n == 0 || !p.is_finite() {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    (p * (1.0 - p) / n as f64).sqrt()
}
