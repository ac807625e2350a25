//! Discovery test at the background-only hypothesis.

use crate::adapter::UnitExecutor;
use crate::pool::{CancelToken, ProcessPool};
use crate::scan::{RunOutcome, Sampler, validate_meta};
use crate::store::StoreMeta;
use tb_core::{FitType, JobSeed, Result, SeedStream, ToyGenerator};

/// POI value of the background-only null hypothesis.
pub const DISCOVERY_POINT: f64 = 0.0;

/// Single-point test of the background-only hypothesis.
///
/// Shares batching, the pool, and record handling with the scan, but draws unit
/// seeds from the discovery stream so the same job seed never reuses scan seeds.
pub struct DiscoveryTester<'a> {
    sampler: Sampler<'a>,
}

impl<'a> DiscoveryTester<'a> {
    /// Tester using `generator` for the observed statistic and `executor` for toys.
    pub fn new(
        generator: &'a dyn ToyGenerator,
        executor: &'a dyn UnitExecutor,
        pool: &'a ProcessPool,
        cancel: &'a CancelToken,
    ) -> Self {
        Self { sampler: Sampler { generator, executor, pool, cancel } }
    }

    /// Run the test. `seed` is required for toy calculators.
    pub fn run(
        &self,
        meta: StoreMeta,
        n_toys: usize,
        n_batch: usize,
        seed: Option<JobSeed>,
    ) -> Result<RunOutcome> {
        validate_meta(&meta, FitType::Discovery)?;
        log::info!("discovery test of {} with {} toys", meta.poi, n_toys);
        self.sampler.run(meta, &[DISCOVERY_POINT], n_toys, n_batch, seed, SeedStream::Discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InProcessExecutor;
    use crate::scan::{InversionScanner, ScanConfig};
    use crate::test_support::StubGenerator;
    use std::collections::BTreeSet;
    use tb_core::{CalculatorType, PointRange, TestStatistic};

    fn meta(fit_type: FitType) -> StoreMeta {
        StoreMeta {
            poi: "mu_SIG".into(),
            model: "combined".into(),
            model_digest: "d".into(),
            calculator: CalculatorType::Frequentist,
            statistic: TestStatistic::ProfileLikelihood,
            fit_type,
            confidence_level: 0.95,
            use_cls: true,
        }
    }

    #[test]
    fn test_discovery_single_point() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(FitType::Discovery);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(2);
        let cancel = CancelToken::new();
        let out = DiscoveryTester::new(&generator, &exec, &pool, &cancel)
            .run(m, 250, 100, Some(JobSeed::new(4).unwrap()))
            .unwrap();
        assert_eq!(out.store.records.len(), 1);
        assert_eq!(out.store.records[0].point, 0.0);
        assert_eq!(out.store.records[0].null.len(), 250);
        assert_eq!(out.summary.completed, 3);
    }

    #[test]
    fn test_discovery_rejects_exclusion_meta() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(FitType::Exclusion);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        assert!(
            DiscoveryTester::new(&generator, &exec, &pool, &cancel)
                .run(m, 10, 10, Some(JobSeed::new(4).unwrap()))
                .is_err()
        );
    }

    #[test]
    fn test_discovery_samples_differ_from_scan_at_zero() {
        // Same job seed, same point: the discovery stream must not replay scan toys.
        let generator = StubGenerator { fail_seeds: vec![] };
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        let seed = Some(JobSeed::new(4).unwrap());

        let dm = meta(FitType::Discovery);
        let dexec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, dm.spec());
        let disc =
            DiscoveryTester::new(&generator, &dexec, &pool, &cancel).run(dm, 50, 50, seed).unwrap();

        let mut sm = meta(FitType::Exclusion);
        sm.statistic = TestStatistic::ProfileLikelihoodOneSided;
        let sexec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, sm.spec());
        let config =
            ScanConfig { range: PointRange::new(0.0, 0.0, 1).unwrap(), n_toys: 50, n_batch: 50 };
        let scan =
            InversionScanner::new(&generator, &sexec, &pool, &cancel).run(sm, &config, seed).unwrap();

        let a: BTreeSet<u64> = disc.store.records[0].null.iter().map(|x| x.to_bits()).collect();
        let b: BTreeSet<u64> = scan.store.records[0].null.iter().map(|x| x.to_bits()).collect();
        assert!(a.is_disjoint(&b));
    }
}
