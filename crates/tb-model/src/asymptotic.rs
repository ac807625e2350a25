//! Asymptotic p-values from Asimov datasets.

use crate::fit::ProfileFitter;
use crate::model::CountingModel;
use tb_core::{AsymptoticPoint, CalculatorType, Error, FitType, Result, TestSpec};
use tb_prob::{
    asymptotic_exclusion_pvalues, expected_cls_band_from_sqrtq_a, expected_p0_band_from_sqrtq0_a,
    normal_cdf,
};

/// Analytic p-values at `point` for the asymptotic and asimov calculators.
///
/// The Asimov dataset is generated at the alternate POI with the background at its
/// conditional fit to observed data (`asymptotic`) or at its nominal value (`asimov`).
pub fn asymptotic_point(
    fitter: &ProfileFitter,
    model: &CountingModel,
    spec: &TestSpec,
    point: f64,
) -> Result<AsymptoticPoint> {
    if spec.calculator.uses_toys() {
        return Err(Error::Validation(format!(
            "{} calculator does not use asymptotic formulae",
            spec.calculator
        )));
    }

    let observed = model.observed();
    let alt = spec.alternate_point();
    let beta = match spec.calculator {
        CalculatorType::Asimov => model.nominal_background().to_vec(),
        _ => model.conditional_background(observed, alt),
    };
    let asimov = model.expected(alt, &beta);

    let q = fitter.statistic(model, observed, spec, point)?.statistic;
    let q_a = fitter.statistic(model, &asimov, spec, point)?.statistic;
    let sqrtq = q.max(0.0).sqrt();
    let sqrtq_a = q_a.max(0.0).sqrt();

    let (null_pvalue, alt_pvalue, expected) = match spec.fit_type {
        FitType::Exclusion => {
            let (clsb, clb) = asymptotic_exclusion_pvalues(q, q_a);
            (clsb, clb, expected_cls_band_from_sqrtq_a(sqrtq_a))
        }
        FitType::Discovery => (
            normal_cdf(-sqrtq),
            normal_cdf(sqrtq_a - sqrtq),
            expected_p0_band_from_sqrtq0_a(sqrtq_a),
        ),
    };

    Ok(AsymptoticPoint { statistic: q, asimov_statistic: q_a, null_pvalue, alt_pvalue, expected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::one_bin;
    use approx::assert_relative_eq;
    use tb_core::TestStatistic;
    use tb_prob::safe_cls;

    fn exclusion(calculator: CalculatorType) -> TestSpec {
        TestSpec::new(calculator, TestStatistic::ProfileLikelihoodOneSided, FitType::Exclusion)
            .unwrap()
    }

    #[test]
    fn test_cls_is_one_at_zero() {
        let model = one_bin(5.0, 2.0, 5.0, 4.0);
        let p = asymptotic_point(&ProfileFitter::default(), &model, &exclusion(CalculatorType::Asymptotic), 0.0)
            .unwrap();
        assert_relative_eq!(safe_cls(p.null_pvalue, p.alt_pvalue), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cls_decreases_with_point() {
        let model = one_bin(5.0, 2.0, 5.0, 4.0);
        let fitter = ProfileFitter::default();
        let spec = exclusion(CalculatorType::Asimov);
        let mut last = 1.0 + 1e-12;
        for mu in [0.5, 1.0, 2.0, 4.0, 8.0] {
            let p = asymptotic_point(&fitter, &model, &spec, mu).unwrap();
            let cls = safe_cls(p.null_pvalue, p.alt_pvalue);
            assert!(cls < last, "mu={} cls={} last={}", mu, cls, last);
            last = cls;
            assert!(p.expected.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_asimov_expected_median_equals_observed_on_background_data() {
        // Observed data equal to the nominal background make the observed CLs match
        // the expected median.
        let model = one_bin(5.0, 2.0, 5.0, 4.0);
        let spec = exclusion(CalculatorType::Asimov);
        let p = asymptotic_point(&ProfileFitter::default(), &model, &spec, 3.0).unwrap();
        assert_relative_eq!(p.statistic, p.asimov_statistic, epsilon = 1e-6);
        assert_relative_eq!(safe_cls(p.null_pvalue, p.alt_pvalue), p.expected[2], epsilon = 1e-6);
    }

    #[test]
    fn test_discovery_p0() {
        let model = one_bin(25.0, 5.0, 5.0, 4.0);
        let spec = TestSpec::new(
            CalculatorType::Asymptotic,
            TestStatistic::ProfileLikelihood,
            FitType::Discovery,
        )
        .unwrap();
        let p = asymptotic_point(&ProfileFitter::default(), &model, &spec, 0.0).unwrap();
        assert_relative_eq!(p.null_pvalue, normal_cdf(-p.statistic.sqrt()), epsilon = 1e-12);
        assert!(p.null_pvalue < 1e-3);
    }

    #[test]
    fn test_rejects_toy_calculator() {
        let model = one_bin(5.0, 2.0, 5.0, 4.0);
        let spec = exclusion(CalculatorType::Frequentist);
        assert!(asymptotic_point(&ProfileFitter::default(), &model, &spec, 1.0).is_err());
    }
}
