//! Common data types for toybail

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Relative tolerance under which two POI values denote the same point.
pub const POINT_TOLERANCE: f64 = 1e-9;

/// Whether two POI values identify the same parameter point.
pub fn points_match(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= POINT_TOLERANCE * scale
}

/// Inclusive linear spacing of `count` points from `start` to `stop`.
///
/// `count == 0` yields nothing and `count == 1` yields `[start]`.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let scale = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + scale * i as f64).collect()
        }
    }
}

/// Scan range `(start, stop, count)` for inclusive linear spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRange {
    /// First point.
    pub start: f64,
    /// Last point (inclusive).
    pub stop: f64,
    /// Number of points.
    pub count: usize,
}

impl PointRange {
    /// Create a validated range.
    pub fn new(start: f64, stop: f64, count: usize) -> Result<Self> {
        if !(start.is_finite() && stop.is_finite()) {
            return Err(Error::Validation(format!(
                "scan range must be finite, got ({}, {})",
                start, stop
            )));
        }
        if count == 0 {
            return Err(Error::Validation("scan count must be >= 1".to_string()));
        }
        Ok(Self { start, stop, count })
    }

    /// Enumerate the points in scan order.
    pub fn points(&self) -> Vec<f64> {
        linspace(self.start, self.stop, self.count)
    }
}

/// Method used to obtain the sampling distribution of the test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatorType {
    /// Toys with nuisance parameters at their conditional best-fit values.
    Frequentist,
    /// Toys with nuisance parameters drawn from their posterior.
    Hybrid,
    /// Asymptotic formulae with Asimov data from fitted nuisances.
    Asymptotic,
    /// Asymptotic formulae with Asimov data from nominal nuisances.
    Asimov,
}

impl CalculatorType {
    /// All variants in declaration order.
    pub const ALL: [CalculatorType; 4] =
        [Self::Frequentist, Self::Hybrid, Self::Asymptotic, Self::Asimov];

    /// Whether this calculator samples toys (and therefore needs seeds and batching).
    pub fn uses_toys(self) -> bool {
        matches!(self, Self::Frequentist | Self::Hybrid)
    }

    /// Stable string name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frequentist => "frequentist",
            Self::Hybrid => "hybrid",
            Self::Asymptotic => "asymptotic",
            Self::Asimov => "asimov",
        }
    }
}

impl fmt::Display for CalculatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculatorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s).ok_or_else(|| {
            Error::Validation(format!(
                "unknown calculator '{}'; expected one of frequentist, hybrid, asymptotic, asimov",
                s
            ))
        })
    }
}

/// Test statistic kind.
///
/// Every statistic is oriented so that larger values are less compatible with
/// the null hypothesis of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatistic {
    /// `-2 ln [L(null, nominal) / L(alt, nominal)]`, nuisances fixed at nominal.
    SimpleLikelihoodRatio,
    /// `-2 ln [L(null, profiled) / L(alt, profiled)]` (Tevatron style).
    ProfileLikelihoodRatio,
    /// Two-sided profile likelihood `-2 ln lambda(mu)`.
    ProfileLikelihood,
    /// One-sided profile likelihood (zero when the best fit exceeds the tested POI).
    ProfileLikelihoodOneSided,
    /// Maximum-likelihood estimate of the POI.
    MaxLikelihood,
}

impl TestStatistic {
    /// All variants in declaration order.
    pub const ALL: [TestStatistic; 5] = [
        Self::SimpleLikelihoodRatio,
        Self::ProfileLikelihoodRatio,
        Self::ProfileLikelihood,
        Self::ProfileLikelihoodOneSided,
        Self::MaxLikelihood,
    ];

    /// Stable string name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SimpleLikelihoodRatio => "simple_likelihood_ratio",
            Self::ProfileLikelihoodRatio => "profile_likelihood_ratio",
            Self::ProfileLikelihood => "profile_likelihood",
            Self::ProfileLikelihoodOneSided => "profile_likelihood_one_sided",
            Self::MaxLikelihood => "max_likelihood",
        }
    }
}

impl fmt::Display for TestStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or_else(|| {
            Error::Validation(format!(
                "unknown test statistic '{}'; expected one of simple_likelihood_ratio, \
                 profile_likelihood_ratio, profile_likelihood, profile_likelihood_one_sided, \
                 max_likelihood",
                s
            ))
        })
    }
}

/// Kind of hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitType {
    /// Background-only null, looking for an excess.
    Discovery,
    /// Signal-plus-background null at the tested POI, for upper limits.
    Exclusion,
}

impl FitType {
    /// Stable string name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Exclusion => "exclusion",
        }
    }
}

impl fmt::Display for FitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated test configuration shared by every unit of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Calculator kind.
    pub calculator: CalculatorType,
    /// Test statistic kind (after normalization for the fit type).
    pub statistic: TestStatistic,
    /// Discovery or exclusion.
    pub fit_type: FitType,
}

impl TestSpec {
    /// Build a spec, normalizing and validating the statistic for the fit type.
    ///
    /// Discovery tests replace the one-sided profile likelihood by the profile
    /// likelihood, which models evaluate as the one-sided discovery statistic `q0`.
    /// Asymptotic calculators only support the profile-likelihood family member
    /// appropriate to the fit type.
    pub fn new(
        calculator: CalculatorType,
        statistic: TestStatistic,
        fit_type: FitType,
    ) -> Result<Self> {
        let statistic = match (fit_type, statistic) {
            (FitType::Discovery, TestStatistic::ProfileLikelihoodOneSided) => {
                TestStatistic::ProfileLikelihood
            }
            (_, s) => s,
        };

        if !calculator.uses_toys() {
            let supported = match fit_type {
                FitType::Exclusion => TestStatistic::ProfileLikelihoodOneSided,
                FitType::Discovery => TestStatistic::ProfileLikelihood,
            };
            if statistic != supported {
                return Err(Error::Validation(format!(
                    "{} calculator supports only the {} statistic for {} tests, got {}",
                    calculator, supported, fit_type, statistic
                )));
            }
        }

        Ok(Self { calculator, statistic, fit_type })
    }

    /// POI value of the alternate hypothesis.
    ///
    /// Exclusion tests compare against background only; discovery tests compare
    /// the background-only null against the nominal signal.
    pub fn alternate_point(&self) -> f64 {
        match self.fit_type {
            FitType::Exclusion => 0.0,
            FitType::Discovery => DISCOVERY_ALT_POINT,
        }
    }
}

/// POI value of the nominal-signal alternate in discovery tests.
pub const DISCOVERY_ALT_POINT: f64 = 1.0;

/// Location of a model: workspace file, model name inside it, and POI name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Workspace file path.
    pub path: PathBuf,
    /// Name of the model inside the workspace.
    pub model: String,
    /// Parameter-of-interest name.
    pub poi: String,
}

/// Test-statistic samples produced by one unit of toy work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToyBatch {
    /// Tested POI value.
    pub point: f64,
    /// Unit seed the batch was generated with.
    pub seed: u64,
    /// Toys requested per ensemble.
    pub requested: usize,
    /// Statistic samples under the null hypothesis, in generation order.
    pub null: Vec<f64>,
    /// Statistic samples under the alternate hypothesis, in generation order.
    pub alt: Vec<f64>,
    /// Null toys dropped because the model failed on them.
    pub null_failed: usize,
    /// Alternate toys dropped because the model failed on them.
    pub alt_failed: usize,
}

impl ToyBatch {
    /// Missing null samples.
    pub fn null_shortfall(&self) -> usize {
        self.requested.saturating_sub(self.null.len())
    }

    /// Missing alternate samples.
    pub fn alt_shortfall(&self) -> usize {
        self.requested.saturating_sub(self.alt.len())
    }

    /// Check that sample and failure counts account for every requested toy.
    pub fn check_accounting(&self) -> Result<()> {
        if self.null.len() + self.null_failed != self.requested
            || self.alt.len() + self.alt_failed != self.requested
        {
            return Err(Error::Validation(format!(
                "toy batch at POI {} (seed {}) does not account for {} toys: null {}+{} alt {}+{}",
                self.point,
                self.seed,
                self.requested,
                self.null.len(),
                self.null_failed,
                self.alt.len(),
                self.alt_failed
            )));
        }
        if self.null.iter().chain(self.alt.iter()).any(|q| !q.is_finite()) {
            return Err(Error::Validation(format!(
                "toy batch at POI {} (seed {}) contains non-finite samples",
                self.point, self.seed
            )));
        }
        Ok(())
    }
}

/// Observed-data evaluation of the test statistic at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedPoint {
    /// Observed test statistic.
    pub statistic: f64,
    /// Unconditional best-fit POI on observed data.
    pub poi_hat: f64,
}

/// Analytic p-values from an asymptotic calculator at one point.
///
/// For exclusion tests `null_pvalue` is CLs+b and `alt_pvalue` is CLb; for
/// discovery tests `null_pvalue` is the background-only p-value `p0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsymptoticPoint {
    /// Observed test statistic.
    pub statistic: f64,
    /// Test statistic on the Asimov dataset.
    pub asimov_statistic: f64,
    /// Tail probability under the null hypothesis.
    pub null_pvalue: f64,
    /// Tail probability under the alternate hypothesis.
    pub alt_pvalue: f64,
    /// Expected band at `n_sigma = [2, 1, 0, -1, -2]`: CLs for exclusion, p0 for discovery.
    pub expected: [f64; 5],
}
