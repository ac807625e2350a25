//! # tb-inference
//!
//! Toy-based inference engine for toybail.
//!
//! - [`scan::InversionScanner`]: CLs / CLs+b scan over linearly spaced POI values
//! - [`discovery::DiscoveryTester`]: background-only p-value and significance
//! - [`pool::ProcessPool`] and [`worker::ProcessExecutor`]: bounded pool of
//!   disposable worker processes, one process per unit of toy work
//! - [`store`]: serializable result stores with seed-disciplined merging
//! - [`report`]: limit-curve interpolation and summaries
//!
//! Nothing in this crate knows about a concrete model; all model access goes
//! through [`tb_core::ToyGenerator`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod batch;
pub mod discovery;
pub mod pool;
pub mod report;
pub mod scan;
pub mod store;
pub mod worker;

pub use adapter::{InProcessExecutor, UnitExecutor, WorkUnit, WorkerRequest, serve_worker};
pub use batch::{PointSamples, UnitFailure, split_batches};
pub use discovery::{DISCOVERY_POINT, DiscoveryTester};
pub use pool::{CancelToken, PoolSummary, ProcessPool, UnitOutcome, UnitReport};
pub use report::{
    DiscoverySummary, LimitEstimate, LimitReport, PointSummary, RangeSide, ReportOptions,
    VisibleCrossSection, find_crossing,
};
pub use scan::{InversionScanner, RunOutcome, ScanConfig};
pub use store::{JobStatus, ResultBundle, ResultRecord, ResultStore, StoreMeta};
pub use worker::ProcessExecutor;

#[cfg(test)]
pub(crate) mod test_support {
    use tb_core::{
        AsymptoticPoint, Error, ObservedPoint, Result, TestSpec, ToyBatch, ToyGenerator,
    };

    /// Deterministic generator: statistics are a hash of (seed, toy index).
    ///
    /// Null samples sit in `[0, 1)`, alternate samples in `[point, point + 1)`,
    /// and the observed statistic is `0.5 * point`.
    pub(crate) struct StubGenerator {
        /// Unit seeds for which generation fails outright.
        pub fail_seeds: Vec<u64>,
    }

    pub(crate) const STUB_POI_MAX: f64 = 1000.0;

    pub(crate) fn unit_hash(seed: u64, i: u64) -> f64 {
        let mut x = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ i.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        x ^= x >> 31;
        x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
        x ^= x >> 29;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    impl ToyGenerator for StubGenerator {
        fn observe(&self, _spec: &TestSpec, point: f64) -> Result<ObservedPoint> {
            Ok(ObservedPoint { statistic: 0.5 * point, poi_hat: 0.0 })
        }

        fn generate(&self, _spec: &TestSpec, point: f64, seed: u64, n: usize) -> Result<ToyBatch> {
            if self.fail_seeds.contains(&seed) {
                return Err(Error::Computation(format!("stub failure for seed {}", seed)));
            }
            let null = (0..n as u64).map(|i| unit_hash(seed, i)).collect();
            let alt = (0..n as u64).map(|i| point + unit_hash(seed ^ 0xff, i)).collect();
            Ok(ToyBatch {
                point,
                seed,
                requested: n,
                null,
                alt,
                null_failed: 0,
                alt_failed: 0,
            })
        }

        fn asymptotic(&self, _spec: &TestSpec, point: f64) -> Result<AsymptoticPoint> {
            let cls = (-point).exp();
            Ok(AsymptoticPoint {
                statistic: point,
                asimov_statistic: point,
                null_pvalue: 0.5 * cls,
                alt_pvalue: 0.5,
                expected: [cls * 0.5, cls * 0.75, cls, cls.sqrt(), cls.sqrt().sqrt()],
            })
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn check_point(&self, point: f64) -> Result<()> {
            if !(0.0..=STUB_POI_MAX).contains(&point) {
                return Err(Error::Validation(format!("POI {} outside the stub range", point)));
            }
            Ok(())
        }
    }
}
