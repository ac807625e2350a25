//! Limit curves, interpolated limits, and discovery summaries.

use crate::store::{ResultRecord, ResultStore, StoreMeta};
use serde::{Deserialize, Serialize};
use tb_core::{Error, FitType, Result};
use tb_prob::{
    NSIGMA_ORDER, binomial_error, expected_cls_band_from_toys, expected_pvalue_band_from_toys,
    normal_cdf, safe_cls, significance_from_pvalue, tail_prob_sorted,
};

/// Discovery p-values above this are reported as this value.
pub const P0_CAP: f64 = 0.5;

/// Which end of the scan a limit fell off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSide {
    /// The curve is already below the threshold at the first point.
    Below,
    /// The curve never drops to the threshold.
    Above,
}

/// Interpolated limit, or the side of the scan range it lies beyond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LimitEstimate {
    /// Crossing found between two scan points.
    Bracketed {
        /// Interpolated POI value.
        value: f64,
        /// Scan point before the crossing.
        lower_point: f64,
        /// Scan point at or after the crossing.
        upper_point: f64,
    },
    /// The scan does not bracket the crossing.
    OutOfRange {
        /// Side of the miss.
        side: RangeSide,
    },
}

impl LimitEstimate {
    /// Interpolated value, if bracketed.
    pub fn value(&self) -> Option<f64> {
        match self {
            LimitEstimate::Bracketed { value, .. } => Some(*value),
            LimitEstimate::OutOfRange { .. } => None,
        }
    }
}

/// First downward crossing of `alpha` by `ys` over ascending `xs`.
///
/// Linear interpolation between the last point above `alpha` and the first point at
/// or below it. Never extrapolates.
pub fn find_crossing(alpha: f64, xs: &[f64], ys: &[f64]) -> Result<LimitEstimate> {
    if xs.len() != ys.len() {
        return Err(Error::Validation("interp input length mismatch".to_string()));
    }
    if xs.is_empty() {
        return Err(Error::Validation("limit curve has no points".to_string()));
    }
    let Some(j) = ys.iter().position(|&y| y <= alpha) else {
        return Ok(LimitEstimate::OutOfRange { side: RangeSide::Above });
    };
    if j == 0 {
        if ys[0] == alpha {
            return Ok(LimitEstimate::Bracketed { value: xs[0], lower_point: xs[0], upper_point: xs[0] });
        }
        return Ok(LimitEstimate::OutOfRange { side: RangeSide::Below });
    }
    let (x0, x1, y0, y1) = (xs[j - 1], xs[j], ys[j - 1], ys[j]);
    let value = if (y1 - y0).abs() < 1e-18 { x0 } else { x0 + (alpha - y0) / (y1 - y0) * (x1 - x0) };
    Ok(LimitEstimate::Bracketed { value, lower_point: x0, upper_point: x1 })
}

/// Whether `ys` never increases (up to rounding noise).
pub fn is_non_increasing(ys: &[f64]) -> bool {
    ys.windows(2).all(|w| w[1] <= w[0] + 1e-12)
}

fn interpolate_at(xs: &[f64], ys: &[f64], estimate: &LimitEstimate) -> Option<f64> {
    let LimitEstimate::Bracketed { value, lower_point, upper_point } = *estimate else {
        return None;
    };
    let i0 = xs.iter().position(|&x| x == lower_point)?;
    let i1 = xs.iter().position(|&x| x == upper_point)?;
    if i0 == i1 {
        return Some(ys[i0]);
    }
    let t = (value - xs[i0]) / (xs[i1] - xs[i0]);
    Some(ys[i0] + t * (ys[i1] - ys[i0]))
}

// Curve error at the limit divided by the local slope.
fn limit_error(xs: &[f64], ys: &[f64], errs: &[f64], estimate: &LimitEstimate) -> Option<f64> {
    let LimitEstimate::Bracketed { lower_point, upper_point, .. } = *estimate else {
        return None;
    };
    if upper_point <= lower_point {
        return None;
    }
    let i0 = xs.iter().position(|&x| x == lower_point)?;
    let slope = (ys.get(i0 + 1)? - ys[i0]) / (upper_point - lower_point);
    let err_y = interpolate_at(xs, errs, estimate)?;
    (slope != 0.0).then(|| err_y / slope.abs())
}

/// Per-point CL values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSummary {
    /// Tested POI value.
    pub point: f64,
    /// Observed test statistic.
    pub observed: f64,
    /// Null-hypothesis samples used.
    pub n_null: usize,
    /// Alternate-hypothesis samples used.
    pub n_alt: usize,
    /// CLs+b.
    pub clsb: f64,
    /// Binomial error on CLs+b.
    pub clsb_err: f64,
    /// CLb.
    pub clb: f64,
    /// Binomial error on CLb.
    pub clb_err: f64,
    /// CLs = CLs+b / CLb.
    pub cls: f64,
    /// Propagated error on CLs.
    pub cls_err: f64,
    /// Expected band of the curve value (CLs or CLs+b), ordered as `NSIGMA_ORDER`.
    pub expected: [f64; 5],
}

impl PointSummary {
    /// Summarize one record. `None` when a toy record has an empty ensemble.
    pub fn from_record(record: &ResultRecord, use_cls: bool) -> Option<Self> {
        if let Some(a) = &record.asymptotic {
            let expected = if use_cls {
                a.expected
            } else {
                let sqrtq_a = a.asimov_statistic.max(0.0).sqrt();
                NSIGMA_ORDER.map(|t| normal_cdf(-(t + sqrtq_a)))
            };
            return Some(Self {
                point: record.point,
                observed: record.observed,
                n_null: 0,
                n_alt: 0,
                clsb: a.null_pvalue,
                clsb_err: 0.0,
                clb: a.alt_pvalue,
                clb_err: 0.0,
                cls: safe_cls(a.null_pvalue, a.alt_pvalue),
                cls_err: 0.0,
                expected,
            });
        }
        if record.null.is_empty() || record.alt.is_empty() {
            return None;
        }

        let mut null = record.null.clone();
        null.sort_by(|a, b| a.total_cmp(b));
        let mut alt = record.alt.clone();
        alt.sort_by(|a, b| a.total_cmp(b));

        let clsb = tail_prob_sorted(&null, record.observed);
        let clb = tail_prob_sorted(&alt, record.observed);
        let cls = safe_cls(clsb, clb);
        let clsb_err = binomial_error(clsb, null.len());
        let clb_err = binomial_error(clb, alt.len());
        let cls_err = if clsb > 0.0 && clb > 0.0 {
            cls * ((clsb_err / clsb).powi(2) + (clb_err / clb).powi(2)).sqrt()
        } else {
            0.0
        };
        let expected = if use_cls {
            expected_cls_band_from_toys(&null, &alt)
        } else {
            expected_pvalue_band_from_toys(&null, &alt)
        };

        Some(Self {
            point: record.point,
            observed: record.observed,
            n_null: null.len(),
            n_alt: alt.len(),
            clsb,
            clsb_err,
            clb,
            clb_err,
            cls,
            cls_err,
            expected,
        })
    }

    fn value(&self, use_cls: bool) -> f64 {
        if use_cls { self.cls } else { self.clsb }
    }

    fn error(&self, use_cls: bool) -> f64 {
        if use_cls { self.cls_err } else { self.clsb_err }
    }
}

/// Discovery p-value and significance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    /// Observed `q0`.
    pub observed: f64,
    /// Background-only p-value.
    pub p0: f64,
    /// Binomial error on `p0` (0 for asymptotic results).
    pub p0_err: f64,
    /// `p0` capped at 0.5.
    pub p0_capped: f64,
    /// One-sided significance of `p0_capped`.
    pub significance: f64,
    /// Expected `p0` band under the nominal signal, ordered as `NSIGMA_ORDER`.
    pub expected_p0: [f64; 5],
    /// Null-hypothesis samples used.
    pub n_toys: usize,
}

impl DiscoverySummary {
    /// Summarize a discovery store.
    pub fn from_store(store: &ResultStore) -> Result<Self> {
        if store.meta.fit_type != FitType::Discovery {
            return Err(Error::Validation("store does not hold a discovery test".to_string()));
        }
        let record = store
            .records
            .first()
            .ok_or_else(|| Error::Validation("discovery store is empty".to_string()))?;

        let (p0, p0_err, expected_p0, n_toys) = match &record.asymptotic {
            Some(a) => (a.null_pvalue, 0.0, a.expected, 0),
            None => {
                if record.null.is_empty() {
                    return Err(Error::Computation(
                        "discovery test has no background-only toys".to_string(),
                    ));
                }
                let mut null = record.null.clone();
                null.sort_by(|a, b| a.total_cmp(b));
                let mut alt = record.alt.clone();
                alt.sort_by(|a, b| a.total_cmp(b));
                let p0 = tail_prob_sorted(&null, record.observed);
                let band = if alt.is_empty() {
                    [f64::NAN; 5]
                } else {
                    expected_pvalue_band_from_toys(&null, &alt)
                };
                (p0, binomial_error(p0, null.len()), band, null.len())
            }
        };

        if p0 > P0_CAP {
            log::warn!("discovery p-value {:.4} capped at {}", p0, P0_CAP);
        }
        let p0_capped = p0.min(P0_CAP);
        Ok(Self {
            observed: record.observed,
            p0,
            p0_err,
            p0_capped,
            significance: significance_from_pvalue(p0_capped),
            expected_p0,
            n_toys,
        })
    }
}

/// Limits translated into visible cross-section by dividing by the luminosity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleCrossSection {
    /// Integrated luminosity used.
    pub luminosity: f64,
    /// Observed visible cross-section limit.
    pub observed: Option<f64>,
    /// Expected limits, ordered as `NSIGMA_ORDER`.
    pub expected: Vec<Option<f64>>,
}

/// Full limit report for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitReport {
    /// Channel label.
    pub channel: String,
    /// POI name.
    pub poi: String,
    /// Confidence level.
    pub confidence_level: f64,
    /// Whether the curve is CLs (true) or CLs+b (false).
    pub use_cls: bool,
    /// Per-point values.
    pub points: Vec<PointSummary>,
    /// Observed limit.
    pub observed: LimitEstimate,
    /// Uncertainty of the observed limit from the curve's statistical error.
    pub observed_error: Option<f64>,
    /// Expected limits, ordered as `NSIGMA_ORDER`.
    pub expected: Vec<LimitEstimate>,
    /// CLb interpolated at the observed limit.
    pub clb_at_limit: Option<f64>,
    /// Whether the observed curve never increases.
    pub monotonic: bool,
    /// Discovery summary.
    pub discovery: DiscoverySummary,
    /// Visible cross-section limits, when a luminosity was given.
    pub visible_cross_section: Option<VisibleCrossSection>,
}

/// How the curve is turned into limits.
///
/// The stored samples do not depend on these, so a saved run can be reported at
/// any confidence level and with either curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportOptions {
    /// Confidence level of the limit, in (0, 1).
    pub confidence_level: f64,
    /// Invert CLs (true) or CLs+b (false).
    pub use_cls: bool,
    /// Integrated luminosity for visible cross-section limits.
    pub luminosity: Option<f64>,
}

impl ReportOptions {
    /// Options recorded with the run that produced `meta`.
    pub fn from_meta(meta: &StoreMeta) -> Self {
        Self { confidence_level: meta.confidence_level, use_cls: meta.use_cls, luminosity: None }
    }
}

impl LimitReport {
    /// Build a report from an inversion store and a discovery store.
    pub fn build(
        channel: &str,
        inversion: &ResultStore,
        discovery: &ResultStore,
        options: ReportOptions,
    ) -> Result<Self> {
        let meta = &inversion.meta;
        if meta.fit_type != FitType::Exclusion {
            return Err(Error::Validation("store does not hold an inversion scan".to_string()));
        }
        let ReportOptions { confidence_level, use_cls, luminosity } = options;
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(Error::Validation(format!(
                "confidence level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        if confidence_level != meta.confidence_level || use_cls != meta.use_cls {
            log::info!(
                "reporting at CL {} with {} (run recorded CL {} with {})",
                confidence_level,
                curve_name(use_cls),
                meta.confidence_level,
                curve_name(meta.use_cls)
            );
        }
        let alpha = 1.0 - confidence_level;

        let mut points = Vec::with_capacity(inversion.records.len());
        for record in &inversion.records {
            match PointSummary::from_record(record, use_cls) {
                Some(s) => points.push(s),
                None => log::warn!("POI {}: no toys survived; point left out of the curve", record.point),
            }
        }
        if points.is_empty() {
            return Err(Error::Computation("no scan point has usable toys".to_string()));
        }

        let xs: Vec<f64> = points.iter().map(|p| p.point).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.value(use_cls)).collect();
        let monotonic = is_non_increasing(&ys);
        if !monotonic {
            log::warn!("non-monotonic {} curve; using the first crossing", curve_name(use_cls));
        }

        let observed = find_crossing(alpha, &xs, &ys)?;
        if let LimitEstimate::OutOfRange { side } = observed {
            log::warn!("observed limit out of the scanned range ({:?}); extend the scan", side);
        }

        let errs: Vec<f64> = points.iter().map(|p| p.error(use_cls)).collect();
        let observed_error = limit_error(&xs, &ys, &errs, &observed);

        let clbs: Vec<f64> = points.iter().map(|p| p.clb).collect();
        let clb_at_limit = interpolate_at(&xs, &clbs, &observed);
        if clb_at_limit.is_none() {
            log::warn!("CLb at the observed limit is undefined: limit outside the scan range");
        }

        let mut expected = Vec::with_capacity(NSIGMA_ORDER.len());
        for i in 0..NSIGMA_ORDER.len() {
            let band: Vec<f64> = points.iter().map(|p| p.expected[i]).collect();
            expected.push(find_crossing(alpha, &xs, &band)?);
        }

        let discovery = DiscoverySummary::from_store(discovery)?;

        let visible_cross_section = match luminosity {
            Some(lumi) if lumi > 0.0 && lumi.is_finite() => Some(VisibleCrossSection {
                luminosity: lumi,
                observed: observed.value().map(|v| v / lumi),
                expected: expected.iter().map(|e| e.value().map(|v| v / lumi)).collect(),
            }),
            Some(lumi) => {
                return Err(Error::Validation(format!("luminosity must be finite and > 0, got {}", lumi)));
            }
            None => None,
        };

        Ok(Self {
            channel: channel.to_string(),
            poi: meta.poi.clone(),
            confidence_level,
            use_cls,
            points,
            observed,
            observed_error,
            expected,
            clb_at_limit,
            monotonic,
            discovery,
            visible_cross_section,
        })
    }
}

fn curve_name(use_cls: bool) -> &'static str {
    if use_cls { "CLs" } else { "CLs+b" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PointSamples;
    use approx::assert_relative_eq;
    use tb_core::{AsymptoticPoint, CalculatorType, JobSeed, TestStatistic};

    #[test]
    fn test_crossing_interpolates() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.5, 0.02, 0.01];
        match find_crossing(0.05, &xs, &ys).unwrap() {
            LimitEstimate::Bracketed { value, lower_point, upper_point } => {
                assert_eq!((lower_point, upper_point), (1.0, 2.0));
                assert_relative_eq!(value, 1.0 + 0.45 / 0.48, epsilon = 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_crossing_non_monotonic_first_wins() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.2, 0.8, 0.0];
        let est = find_crossing(0.5, &xs, &ys).unwrap();
        assert_relative_eq!(est.value().unwrap(), 0.625, epsilon = 1e-12);
        assert!(!is_non_increasing(&ys));
    }

    #[test]
    fn test_crossing_out_of_range() {
        let xs = [0.0, 6.0, 12.0];
        assert_eq!(
            find_crossing(0.05, &xs, &[0.9, 0.5, 0.2]).unwrap(),
            LimitEstimate::OutOfRange { side: RangeSide::Above }
        );
        assert_eq!(
            find_crossing(0.05, &xs, &[0.01, 0.005, 0.001]).unwrap(),
            LimitEstimate::OutOfRange { side: RangeSide::Below }
        );
        assert!(find_crossing(0.05, &[], &[]).is_err());
    }

    fn meta(fit_type: FitType, calculator: CalculatorType) -> StoreMeta {
        StoreMeta {
            poi: "mu_SIG".into(),
            model: "combined".into(),
            model_digest: "d".into(),
            calculator,
            statistic: TestStatistic::ProfileLikelihoodOneSided,
            fit_type,
            confidence_level: 0.95,
            use_cls: true,
        }
    }

    fn asym_store(cls_at: impl Fn(f64) -> f64) -> ResultStore {
        let records = [0.0, 1.0, 2.0, 3.0, 4.0]
            .iter()
            .map(|&p| {
                let cls = cls_at(p);
                let a = AsymptoticPoint {
                    statistic: p,
                    asimov_statistic: p,
                    null_pvalue: 0.5 * cls,
                    alt_pvalue: 0.5,
                    expected: [cls * 0.5, cls * 0.8, cls, cls.sqrt(), cls.sqrt()],
                };
                ResultRecord::from_asymptotic(p, 0.0, a)
            })
            .collect();
        ResultStore::new(meta(FitType::Exclusion, CalculatorType::Asymptotic), records)
    }

    fn discovery_store(observed: f64) -> ResultStore {
        let samples = PointSamples {
            point: 0.0,
            null: (0..999).map(|i| i as f64 / 100.0).collect(),
            alt: (0..999).map(|i| 2.0 + i as f64 / 100.0).collect(),
            requested: 999,
            failures: vec![],
        };
        let rec = ResultRecord::from_samples(samples, JobSeed::new(1).unwrap(), observed, 0.0);
        ResultStore::new(meta(FitType::Discovery, CalculatorType::Frequentist), vec![rec])
    }

    fn opts(confidence_level: f64, use_cls: bool, luminosity: Option<f64>) -> ReportOptions {
        ReportOptions { confidence_level, use_cls, luminosity }
    }

    /// Toy store with null samples in `[0, 1)`, alternate samples in `[50, 150)`.
    fn toy_store(observed: f64) -> ResultStore {
        let records = [0.0, 1.0, 2.0]
            .iter()
            .map(|&p| {
                let samples = PointSamples {
                    point: p,
                    null: (0..99).map(|i| i as f64 / 99.0).collect(),
                    alt: (0..99).map(|i| 50.0 + i as f64).collect(),
                    requested: 99,
                    failures: vec![],
                };
                ResultRecord::from_samples(samples, JobSeed::new(1).unwrap(), observed, 0.0)
            })
            .collect();
        ResultStore::new(meta(FitType::Exclusion, CalculatorType::Frequentist), records)
    }

    #[test]
    fn test_report_bracketed() {
        let inv = asym_store(|p| (-p).exp());
        let rep = LimitReport::build("DR-WHO", &inv, &discovery_store(9.0), opts(0.95, true, Some(2.0)))
                .unwrap();
        let value = rep.observed.value().unwrap();
        assert!(value > 2.0 && value < 4.0, "{}", value);
        assert!(rep.monotonic);
        assert_relative_eq!(rep.clb_at_limit.unwrap(), 0.5, epsilon = 1e-12);
        let vis = rep.visible_cross_section.unwrap();
        assert_relative_eq!(vis.observed.unwrap(), value / 2.0);
        assert_eq!(rep.expected.len(), 5);
        // More optimistic bands exclude earlier.
        let e: Vec<f64> = rep.expected.iter().filter_map(LimitEstimate::value).collect();
        assert!(e.windows(2).all(|w| w[0] <= w[1]), "{:?}", e);
    }

    #[test]
    fn test_report_out_of_range() {
        let inv = asym_store(|_| 0.2);
        let rep =
            LimitReport::build("DR-WHO", &inv, &discovery_store(9.0), opts(0.95, true, None)).unwrap();
        assert_eq!(rep.observed, LimitEstimate::OutOfRange { side: RangeSide::Above });
        assert!(rep.clb_at_limit.is_none());
        assert!(rep.observed_error.is_none());
        assert!(rep.visible_cross_section.is_none());
        let json = serde_json::to_value(&rep.observed).unwrap();
        assert_eq!(json["status"], "out_of_range");
        assert_eq!(json["side"], "above");
    }

    #[test]
    fn test_report_uses_requested_level_and_curve() {
        let inv = asym_store(|p| (-p).exp());
        let disc = discovery_store(9.0);
        let at_95 = LimitReport::build("DR-WHO", &inv, &disc, opts(0.95, true, None)).unwrap();
        let at_68 = LimitReport::build("DR-WHO", &inv, &disc, opts(0.68, true, None)).unwrap();
        assert_eq!(at_68.confidence_level, 0.68);
        let (v95, v68) = (at_95.observed.value().unwrap(), at_68.observed.value().unwrap());
        assert!((2.0..3.0).contains(&v95), "{}", v95);
        assert!((1.0..2.0).contains(&v68), "{}", v68);

        // CLs+b = CLs / 2 here, so it crosses 0.05 between 2 and 3 but earlier.
        let clsb = LimitReport::build("DR-WHO", &inv, &disc, opts(0.95, false, None)).unwrap();
        assert!(!clsb.use_cls);
        let v = clsb.observed.value().unwrap();
        assert!(v < v95 && v > 2.0, "{} vs {}", v, v95);

        assert!(LimitReport::build("DR-WHO", &inv, &disc, opts(1.0, true, None)).is_err());
        assert!(LimitReport::build("DR-WHO", &inv, &disc, opts(0.0, true, None)).is_err());
    }

    #[test]
    fn test_toy_report_out_of_range() {
        let disc = discovery_store(9.0);
        // Observed below every null toy: CLs stays near one.
        let above =
            LimitReport::build("SR", &toy_store(-1.0), &disc, opts(0.95, true, None)).unwrap();
        assert_eq!(above.observed, LimitEstimate::OutOfRange { side: RangeSide::Above });
        assert!(above.observed_error.is_none());

        // Observed above every null toy but below every alternate toy: CLs = 0.01.
        let below =
            LimitReport::build("SR", &toy_store(10.0), &disc, opts(0.95, true, None)).unwrap();
        assert_relative_eq!(below.points[0].cls, 0.01, epsilon = 1e-12);
        assert_eq!(below.observed, LimitEstimate::OutOfRange { side: RangeSide::Below });
        assert!(below.clb_at_limit.is_none());
    }

    #[test]
    fn test_discovery_summary_caps_p0() {
        let s = DiscoverySummary::from_store(&discovery_store(9.0)).unwrap();
        // 99 of 999 toys at or above 9.0.
        assert_relative_eq!(s.p0, (99.0 + 1.0) / 1000.0, epsilon = 1e-12);
        assert!(s.significance > 1.0);

        let low = DiscoverySummary::from_store(&discovery_store(-1.0)).unwrap();
        assert_relative_eq!(low.p0, 1.0);
        assert_eq!(low.p0_capped, P0_CAP);
        assert_relative_eq!(low.significance, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_toy_point_summary() {
        let samples = PointSamples {
            point: 1.0,
            null: (0..99).map(|i| i as f64).collect(),
            alt: (0..99).map(|i| 50.0 + i as f64).collect(),
            requested: 99,
            failures: vec![],
        };
        let rec = ResultRecord::from_samples(samples, JobSeed::new(2).unwrap(), 89.5, 0.0);
        let s = PointSummary::from_record(&rec, true).unwrap();
        assert_relative_eq!(s.clsb, 10.0 / 100.0);
        assert_relative_eq!(s.clb, 60.0 / 100.0);
        assert_relative_eq!(s.cls, 1.0 / 6.0, epsilon = 1e-12);
        assert!(s.cls_err > 0.0);
        assert!(s.expected.windows(2).all(|w| w[0] <= w[1]));
    }
}
