//! Hypothesis-test inversion: the upper-limit scan.
//!
//! Every point moves through `pending -> sampling -> scored -> done`. All toy units of
//! the scan go through a single pool run, interleaved across points; a point is
//! scored once each of its units has an outcome.

use crate::adapter::UnitExecutor;
use crate::batch::{assemble, plan_units};
use crate::pool::{CancelToken, PoolSummary, ProcessPool};
use crate::store::{JobStatus, ResultRecord, ResultStore, StoreMeta};
use tb_core::{
    Error, FitType, JobSeed, PointRange, Result, SeedAllocator, SeedStream, ToyGenerator,
};

/// Scan configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Points to test.
    pub range: PointRange,
    /// Toys per point and ensemble.
    pub n_toys: usize,
    /// Toys per unit.
    pub n_batch: usize,
}

/// Result of one scan or discovery test.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Produced store.
    pub store: ResultStore,
    /// Unit outcome counts (all zero for asymptotic calculators).
    pub summary: PoolSummary,
    /// Completeness of the store.
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointState {
    Pending,
    Sampling,
    Scored,
    Done,
}

impl PointState {
    fn next(self) -> PointState {
        match self {
            PointState::Pending => PointState::Sampling,
            PointState::Sampling => PointState::Scored,
            PointState::Scored | PointState::Done => PointState::Done,
        }
    }
}

pub(crate) fn validate_meta(meta: &StoreMeta, fit_type: FitType) -> Result<()> {
    if meta.fit_type != fit_type {
        return Err(Error::Validation(format!(
            "store metadata is for a {} test, expected {}",
            meta.fit_type, fit_type
        )));
    }
    if !(meta.confidence_level > 0.0 && meta.confidence_level < 1.0) {
        return Err(Error::Validation(format!(
            "confidence level must be in (0, 1), got {}",
            meta.confidence_level
        )));
    }
    Ok(())
}

/// Shared driver for scans and discovery tests.
pub(crate) struct Sampler<'a> {
    pub generator: &'a dyn ToyGenerator,
    pub executor: &'a dyn UnitExecutor,
    pub pool: &'a ProcessPool,
    pub cancel: &'a CancelToken,
}

impl Sampler<'_> {
    pub(crate) fn run(
        &self,
        meta: StoreMeta,
        points: &[f64],
        n_toys: usize,
        n_batch: usize,
        seed: Option<JobSeed>,
        stream: SeedStream,
    ) -> Result<RunOutcome> {
        let spec = meta.spec();
        for &point in points {
            self.generator.check_point(point)?;
        }
        let mut states = vec![PointState::Pending; points.len()];

        if !spec.calculator.uses_toys() {
            let mut records = Vec::with_capacity(points.len());
            for (i, &point) in points.iter().enumerate() {
                let asym = self.generator.asymptotic(&spec, point)?;
                let poi_hat = self.generator.observe(&spec, point)?.poi_hat;
                records.push(ResultRecord::from_asymptotic(point, poi_hat, asym));
                states[i] = PointState::Done;
                log::info!("POI {}: asymptotic p-values computed", point);
            }
            let store = ResultStore::new(meta, records);
            let status = store.status();
            return Ok(RunOutcome { store, summary: PoolSummary::default(), status });
        }

        let seed = seed.ok_or_else(|| {
            Error::Validation(format!("a job seed is required for the {} calculator", spec.calculator))
        })?;
        if n_toys == 0 {
            return Err(Error::Validation("number of toys must be > 0".to_string()));
        }

        let alloc = SeedAllocator::new(seed, stream);
        let units = plan_units(points, n_toys, n_batch, &alloc)?;
        let per_point = units.len() / points.len().max(1);
        let point_of = |unit_index: usize| unit_index / per_point.max(1);

        for s in states.iter_mut() {
            *s = s.next();
        }
        log::info!(
            "dispatching {} units ({} toys per point, batches of {}) over {} workers, job seed {}",
            units.len(),
            n_toys,
            n_batch,
            self.pool.workers(),
            seed
        );

        let mut remaining = vec![per_point; points.len()];
        let reports = self.pool.run(&units, self.executor, self.cancel, |report| {
            let p = point_of(report.unit.index);
            if let Some(left) = remaining.get_mut(p) {
                *left -= 1;
                if *left == 0 {
                    log::debug!("POI {}: all {} units reported", points[p], per_point);
                }
            }
        })?;
        let summary = PoolSummary::from_reports(&reports);

        let mut records = Vec::with_capacity(points.len());
        for (i, samples) in assemble(points, &units, reports).into_iter().enumerate() {
            let observed = self.generator.observe(&spec, samples.point)?;
            states[i] = states[i].next();
            log::info!(
                "POI {}: {} null / {} alt toys of {} (q_obs = {:.6})",
                samples.point,
                samples.null.len(),
                samples.alt.len(),
                samples.requested,
                observed.statistic
            );
            records.push(ResultRecord::from_samples(
                samples,
                seed,
                observed.statistic,
                observed.poi_hat,
            ));
            states[i] = states[i].next();
        }
        debug_assert!(states.iter().all(|s| *s == PointState::Done));

        let store = ResultStore::new(meta, records);
        let status = store.status();
        Ok(RunOutcome { store, summary, status })
    }
}

/// Upper-limit scan over a linear grid of POI values.
pub struct InversionScanner<'a> {
    sampler: Sampler<'a>,
}

impl<'a> InversionScanner<'a> {
    /// Scanner using `generator` for observed-data statistics and `executor` for toys.
    pub fn new(
        generator: &'a dyn ToyGenerator,
        executor: &'a dyn UnitExecutor,
        pool: &'a ProcessPool,
        cancel: &'a CancelToken,
    ) -> Self {
        Self { sampler: Sampler { generator, executor, pool, cancel } }
    }

    /// Run the scan. `seed` is required for toy calculators.
    pub fn run(
        &self,
        meta: StoreMeta,
        config: &ScanConfig,
        seed: Option<JobSeed>,
    ) -> Result<RunOutcome> {
        validate_meta(&meta, FitType::Exclusion)?;
        let points = config.range.points();
        log::info!(
            "inversion scan of {} over {} points in [{}, {}]",
            meta.poi,
            points.len(),
            config.range.start,
            config.range.stop
        );
        self.sampler.run(
            meta,
            &points,
            config.n_toys,
            config.n_batch,
            seed,
            SeedStream::Inversion,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InProcessExecutor;
    use crate::test_support::{StubGenerator, unit_hash};
    use tb_core::{CalculatorType, TestStatistic};

    fn meta(calculator: CalculatorType) -> StoreMeta {
        StoreMeta {
            poi: "mu_SIG".into(),
            model: "combined".into(),
            model_digest: "d".into(),
            calculator,
            statistic: TestStatistic::ProfileLikelihoodOneSided,
            fit_type: FitType::Exclusion,
            confidence_level: 0.95,
            use_cls: true,
        }
    }

    fn scan(workers: usize, seed: u32, fail_seeds: Vec<u64>) -> RunOutcome {
        let generator = StubGenerator { fail_seeds: fail_seeds.clone() };
        let m = meta(CalculatorType::Frequentist);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds }, m.spec());
        let pool = ProcessPool::new(workers);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 30.0, 6).unwrap(), n_toys: 300, n_batch: 100 };
        InversionScanner::new(&generator, &exec, &pool, &cancel)
            .run(m, &config, Some(JobSeed::new(seed).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_scan_visits_points_with_full_counts() {
        let out = scan(2, 1, vec![]);
        let pts: Vec<f64> = out.store.records.iter().map(|r| r.point).collect();
        assert_eq!(pts, vec![0.0, 6.0, 12.0, 18.0, 24.0, 30.0]);
        for r in &out.store.records {
            assert_eq!(r.null.len(), 300);
            assert_eq!(r.alt.len(), 300);
            assert_eq!(r.observed, 0.5 * r.point);
        }
        assert_eq!(out.status, JobStatus::Complete);
        assert_eq!(out.summary.completed, 18);
    }

    #[test]
    fn test_pool_size_does_not_change_samples() {
        let a = scan(1, 7, vec![]);
        let b = scan(4, 7, vec![]);
        assert_eq!(a.store, b.store);
    }

    #[test]
    fn test_failed_unit_reports_shortfall() {
        let alloc = SeedAllocator::new(JobSeed::new(1).unwrap(), SeedStream::Inversion);
        let bad = u64::from(alloc.unit_seed(4).unwrap()); // point 6, second batch
        let out = scan(2, 1, vec![bad]);
        let r = out.store.record(6.0).unwrap();
        assert_eq!(r.null.len(), 200);
        assert_eq!(r.shortfall.null, 100);
        assert_eq!(r.failures.len(), 1);
        assert_eq!(out.status, JobStatus::Partial);
        assert_eq!(out.summary.failed, 1);
    }

    #[test]
    fn test_seed_required_for_toys() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(CalculatorType::Hybrid);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 1.0, 2).unwrap(), n_toys: 10, n_batch: 5 };
        let err = InversionScanner::new(&generator, &exec, &pool, &cancel)
            .run(m, &config, None)
            .unwrap_err();
        assert!(err.to_string().contains("seed"));
    }

    #[test]
    fn test_asymptotic_scan_skips_toys() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(CalculatorType::Asymptotic);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 4.0, 5).unwrap(), n_toys: 0, n_batch: 1 };
        let out = InversionScanner::new(&generator, &exec, &pool, &cancel)
            .run(m, &config, None)
            .unwrap();
        assert_eq!(out.store.records.len(), 5);
        assert!(out.store.records.iter().all(|r| r.asymptotic.is_some() && r.null.is_empty()));
        assert_eq!(out.status, JobStatus::Complete);
    }

    #[test]
    fn test_reference_scan_seed_layout() {
        // 3000 toys in batches of 100 at six points, job seed 1.
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(CalculatorType::Frequentist);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(4);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 30.0, 6).unwrap(), n_toys: 3000, n_batch: 100 };
        let out = InversionScanner::new(&generator, &exec, &pool, &cancel)
            .run(m, &config, Some(JobSeed::new(1).unwrap()))
            .unwrap();
        assert_eq!(out.summary.completed, 180);
        assert_eq!(out.status, JobStatus::Complete);

        let alloc = SeedAllocator::new(JobSeed::new(1).unwrap(), SeedStream::Inversion);
        for (p, r) in out.store.records.iter().enumerate() {
            assert_eq!(r.null.len(), 3000);
            assert_eq!(r.alt.len(), 3000);
            assert_eq!(r.seeds.iter().map(|s| s.get()).collect::<Vec<_>>(), vec![1]);
            let expected: Vec<f64> = (0..30u32)
                .flat_map(|b| {
                    let seed = u64::from(alloc.unit_seed(p as u32 * 30 + b).unwrap());
                    (0..100u64).map(move |i| unit_hash(seed, i))
                })
                .collect();
            assert_eq!(r.null, expected);
        }
    }

    #[test]
    fn test_out_of_range_point_rejected_before_dispatch() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let m = meta(CalculatorType::Frequentist);
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 2000.0, 3).unwrap(), n_toys: 10, n_batch: 5 };
        let err = InversionScanner::new(&generator, &exec, &pool, &cancel)
            .run(m, &config, Some(JobSeed::new(1).unwrap()))
            .unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.contains("2000"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_confidence_level() {
        let generator = StubGenerator { fail_seeds: vec![] };
        let mut m = meta(CalculatorType::Frequentist);
        m.confidence_level = 1.0;
        let exec = InProcessExecutor::new(StubGenerator { fail_seeds: vec![] }, m.spec());
        let pool = ProcessPool::new(1);
        let cancel = CancelToken::new();
        let config =
            ScanConfig { range: PointRange::new(0.0, 1.0, 2).unwrap(), n_toys: 10, n_batch: 5 };
        assert!(
            InversionScanner::new(&generator, &exec, &pool, &cancel)
                .run(m, &config, Some(JobSeed::new(1).unwrap()))
                .is_err()
        );
    }
}
