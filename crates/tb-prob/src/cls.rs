//! CLs ratios and expected bands.

use crate::normal::normal_cdf;
use crate::tail::{quantile_sorted, tail_prob_sorted};

/// Canonical expected-band ordering in `-muhat/sigma` space: `n_sigma = [2, 1, 0, -1, -2]`.
pub const NSIGMA_ORDER: [f64; 5] = [2.0, 1.0, 0.0, -1.0, -2.0];

const CLB_MIN: f64 = 1e-300;

/// `CLs = CLs+b / CLb`, clamped to `[0, 1]`.
///
/// When CLb underflows the ratio is 0 if CLs+b underflowed as well, else 1.
#[inline]
pub fn safe_cls(clsb: f64, clb: f64) -> f64 {
    if !(clsb.is_finite() && clb.is_finite()) {
        return 0.0;
    }
    if clb <= CLB_MIN {
        return if clsb <= CLB_MIN { 0.0 } else { 1.0 };
    }
    (clsb / clb).clamp(0.0, 1.0)
}

/// Asymptotic `(CLs+b, CLb)` for an observed `q` and Asimov `q_A` of the one-sided
/// profile likelihood.
pub fn asymptotic_exclusion_pvalues(q: f64, q_a: f64) -> (f64, f64) {
    let sqrtq = q.max(0.0).sqrt();
    let sqrtq_a = q_a.max(0.0).sqrt();
    let teststat = if sqrtq <= sqrtq_a || sqrtq_a <= 0.0 {
        sqrtq - sqrtq_a
    } else {
        (q - q_a) / (2.0 * sqrtq_a)
    };
    let clsb = normal_cdf(-(teststat + sqrtq_a));
    let clb = normal_cdf(-teststat);
    (clsb, clb)
}

/// Expected CLs band for a given Asimov `sqrt(q_mu,A)`, ordered as [`NSIGMA_ORDER`].
pub fn expected_cls_band_from_sqrtq_a(sqrtq_a: f64) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
        let clsb = normal_cdf(-(t + sqrtq_a));
        let clb = normal_cdf(-t);
        out[i] = safe_cls(clsb, clb);
    }
    out
}

/// Expected discovery p-values for a given Asimov `sqrt(q_0,A)`, ordered as [`NSIGMA_ORDER`].
pub fn expected_p0_band_from_sqrtq0_a(sqrtq0_a: f64) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
        out[i] = normal_cdf(-(sqrtq0_a + t).max(0.0));
    }
    out
}

/// Quantiles of an ascending slice at `Φ(-n_sigma)`, ordered as [`NSIGMA_ORDER`].
pub fn band_quantiles(sorted: &[f64]) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
        out[i] = quantile_sorted(sorted, normal_cdf(-t));
    }
    out
}

/// Expected CLs band from toy ensembles (both ascending).
///
/// CLs is evaluated with every alternate-hypothesis statistic as the threshold;
/// the band is the set of quantiles of those values.
pub fn expected_cls_band_from_toys(null_sorted: &[f64], alt_sorted: &[f64]) -> [f64; 5] {
    let mut cls_vals: Vec<f64> = alt_sorted
        .iter()
        .map(|&q| safe_cls(tail_prob_sorted(null_sorted, q), tail_prob_sorted(alt_sorted, q)))
        .collect();
    cls_vals.sort_by(|a, b| a.total_cmp(b));
    band_quantiles(&cls_vals)
}

/// Expected null-hypothesis p-value band from toy ensembles (both ascending).
pub fn expected_pvalue_band_from_toys(null_sorted: &[f64], alt_sorted: &[f64]) -> [f64; 5] {
    let mut p_vals: Vec<f64> =
        alt_sorted.iter().map(|&q| tail_prob_sorted(null_sorted, q)).collect();
    p_vals.sort_by(|a, b| a.total_cmp(b));
    band_quantiles(&p_vals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_safe_cls_underflow_is_finite() {
        let clb = normal_cdf(-1e6);
        let clsb = normal_cdf(-1e6 - 1.0);
        assert_eq!(clb, 0.0);
        assert_eq!(safe_cls(clsb, clb), 0.0);
        assert_eq!(safe_cls(0.3, 0.0), 1.0);
        assert_eq!(safe_cls(f64::NAN, 0.5), 0.0);
        assert_relative_eq!(safe_cls(0.02, 0.4), 0.05);
    }

    #[test]
    fn test_asymptotic_pvalues_at_asimov_point() {
        // Observing exactly the Asimov statistic gives CLb = 0.5.
        let (clsb, clb) = asymptotic_exclusion_pvalues(4.0, 4.0);
        assert_relative_eq!(clb, 0.5, epsilon = 1e-12);
        assert_relative_eq!(clsb, normal_cdf(-2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_expected_band_median_matches_asimov() {
        let band = expected_cls_band_from_sqrtq_a(2.0);
        let (clsb, clb) = asymptotic_exclusion_pvalues(4.0, 4.0);
        assert_relative_eq!(band[2], safe_cls(clsb, clb), epsilon = 1e-12);
        assert!(band.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_p0_band_ordering() {
        let band = expected_p0_band_from_sqrtq0_a(3.0);
        assert_relative_eq!(band[2], normal_cdf(-3.0), epsilon = 1e-12);
        assert!(band.windows(2).all(|w| w[0] <= w[1]));
        // Negative significance is floored at p = 0.5.
        assert_relative_eq!(expected_p0_band_from_sqrtq0_a(0.5)[4], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_toy_band_monotone() {
        let null: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let alt: Vec<f64> = (0..200).map(|i| 2.0 + i as f64 * 0.05).collect();
        let band = expected_cls_band_from_toys(&null, &alt);
        assert!(band.windows(2).all(|w| w[0] <= w[1]));
        assert!(band.iter().all(|v| (0.0..=1.0).contains(v)));
        let pband = expected_pvalue_band_from_toys(&null, &alt);
        assert!(pband.windows(2).all(|w| w[0] <= w[1]));
    }
}
