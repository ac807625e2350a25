//! Probability building blocks for toybail.
//!
//! This crate hosts the small amount of probability math shared by the model and
//! inference crates:
//! - standard normal CDF / quantile and significance conversion
//! - Poisson log-likelihood terms
//! - empirical tail probabilities and quantiles over toy ensembles
//! - CLs ratios and the asymptotic expected band

pub mod cls;
pub mod normal;
pub mod poisson;
pub mod tail;

pub use cls::{
    NSIGMA_ORDER, asymptotic_exclusion_pvalues, band_quantiles, expected_cls_band_from_sqrtq_a,
    expected_cls_band_from_toys, expected_p0_band_from_sqrtq0_a, expected_pvalue_band_from_toys,
    safe_cls,
};
pub use normal::{normal_cdf, normal_quantile, pvalue_from_significance, significance_from_pvalue};
pub use tail::{binomial_error, quantile_sorted, tail_prob_counts, tail_prob_sorted};
