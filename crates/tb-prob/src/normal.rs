//! Standard normal utilities.

use statrs::distribution::{ContinuousCDF, Normal};
use tb_core::{Error, Result};

/// Standard normal CDF `Φ(x)`.
pub fn normal_cdf(x: f64) -> f64 {
    // Φ(x) = 0.5 * erfc(-x / sqrt(2)) keeps precision in the lower tail.
    0.5 * statrs::function::erf::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile `Φ⁻¹(p)` for `p` in `(0, 1)`.
pub fn normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(Error::Validation(format!("quantile probability must be in (0,1), got {}", p)));
    }
    let std = Normal::standard();
    Ok(std.inverse_cdf(p))
}

/// One-sided significance `Z = Φ⁻¹(1 - p)`.
///
/// Evaluated as `-Φ⁻¹(p)` so tiny p-values keep their precision. `p >= 1` maps to
/// `-inf` and `p <= 0` to `+inf`.
pub fn significance_from_pvalue(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::INFINITY;
    }
    if p >= 1.0 {
        return f64::NEG_INFINITY;
    }
    -Normal::standard().inverse_cdf(p)
}

/// One-sided p-value `Φ(-Z)` for a significance `Z`.
pub fn pvalue_from_significance(z: f64) -> f64 {
    normal_cdf(-z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cdf_reference_values() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(normal_cdf(1.0), 0.841_344_746_068_542_9, epsilon = 1e-12);
        assert_relative_eq!(normal_cdf(-2.0), 0.022_750_131_948_179_2, epsilon = 1e-12);
        assert!(normal_cdf(-40.0) > 0.0);
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        for p in [1e-8, 0.01, 0.16, 0.5, 0.84, 0.99] {
            let x = normal_quantile(p).unwrap();
            assert_relative_eq!(normal_cdf(x), p, max_relative = 1e-8);
        }
        assert!(normal_quantile(0.0).is_err());
        assert!(normal_quantile(1.0).is_err());
    }

    #[test]
    fn test_significance_conversion() {
        assert_relative_eq!(significance_from_pvalue(0.5), 0.0, epsilon = 1e-12);
        // 5 sigma discovery threshold.
        assert_relative_eq!(significance_from_pvalue(2.866_515_718_791_939e-7), 5.0, epsilon = 1e-6);
        assert_relative_eq!(pvalue_from_significance(3.0), 1.349_898_031_630_094_6e-3, max_relative = 1e-9);
        assert_eq!(significance_from_pvalue(0.0), f64::INFINITY);
        assert_eq!(significance_from_pvalue(1.0), f64::NEG_INFINITY);
    }
}
