//! Result stores and seed-disciplined merging.
//!
//! A [`ResultStore`] holds one record per tested point, each accumulating the
//! samples of every job seed that contributed to it. Stores from independent
//! invocations merge only when they were produced under identical configuration
//! and no job seed contributes twice to the same point.

use crate::batch::{PointSamples, UnitFailure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tb_core::{
    AsymptoticPoint, CalculatorType, Error, FitType, JobSeed, Result, TestSpec, TestStatistic,
    points_match,
};

/// Format tag of persisted bundles.
pub const SCHEMA_VERSION: &str = "toybail_results_v1";

/// Configuration every record of a store was produced under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// POI name.
    pub poi: String,
    /// Model name inside the workspace.
    pub model: String,
    /// SHA-256 of the model definition.
    pub model_digest: String,
    /// Calculator kind.
    pub calculator: CalculatorType,
    /// Test statistic kind.
    pub statistic: TestStatistic,
    /// Discovery or exclusion.
    pub fit_type: FitType,
    /// Confidence level in `(0, 1)`.
    pub confidence_level: f64,
    /// CLs (true) or CLs+b (false).
    pub use_cls: bool,
}

impl StoreMeta {
    /// Test configuration implied by this metadata.
    pub fn spec(&self) -> TestSpec {
        TestSpec { calculator: self.calculator, statistic: self.statistic, fit_type: self.fit_type }
    }

    fn check_compatible(&self, other: &StoreMeta) -> Result<()> {
        let mismatch = |field: &str, left: String, right: String| {
            Err(Error::ConfigurationMismatch { field: field.to_string(), left, right })
        };
        if self.poi != other.poi {
            return mismatch("poi", self.poi.clone(), other.poi.clone());
        }
        if self.model != other.model {
            return mismatch("model", self.model.clone(), other.model.clone());
        }
        if self.model_digest != other.model_digest {
            return mismatch("model_digest", self.model_digest.clone(), other.model_digest.clone());
        }
        if self.calculator != other.calculator {
            return mismatch("calculator", self.calculator.to_string(), other.calculator.to_string());
        }
        if self.statistic != other.statistic {
            return mismatch("statistic", self.statistic.to_string(), other.statistic.to_string());
        }
        if self.fit_type != other.fit_type {
            return mismatch("fit_type", self.fit_type.to_string(), other.fit_type.to_string());
        }
        if self.confidence_level != other.confidence_level {
            return mismatch(
                "confidence_level",
                self.confidence_level.to_string(),
                other.confidence_level.to_string(),
            );
        }
        if self.use_cls != other.use_cls {
            return mismatch("use_cls", self.use_cls.to_string(), other.use_cls.to_string());
        }
        Ok(())
    }
}

/// Missing samples per ensemble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    /// Missing null-hypothesis samples.
    pub null: usize,
    /// Missing alternate-hypothesis samples.
    pub alt: usize,
}

/// Everything known about one tested point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Tested POI value.
    pub point: f64,
    /// Observed-data test statistic.
    pub observed: f64,
    /// Unconditional best-fit POI on observed data.
    pub poi_hat: f64,
    /// Null-hypothesis samples.
    pub null: Vec<f64>,
    /// Alternate-hypothesis samples.
    pub alt: Vec<f64>,
    /// Job seeds that contributed samples.
    pub seeds: BTreeSet<JobSeed>,
    /// Toys requested per ensemble, summed over job seeds.
    pub requested: usize,
    /// Missing samples, summed over job seeds.
    pub shortfall: Shortfall,
    /// Units that did not deliver.
    #[serde(default)]
    pub failures: Vec<UnitFailure>,
    /// Analytic p-values (asymptotic calculators only).
    #[serde(default)]
    pub asymptotic: Option<AsymptoticPoint>,
}

impl ResultRecord {
    /// Record for toy samples gathered under `seed`.
    pub fn from_samples(samples: PointSamples, seed: JobSeed, observed: f64, poi_hat: f64) -> Self {
        let shortfall = Shortfall { null: samples.null_shortfall(), alt: samples.alt_shortfall() };
        Self {
            point: samples.point,
            observed,
            poi_hat,
            null: samples.null,
            alt: samples.alt,
            seeds: BTreeSet::from([seed]),
            requested: samples.requested,
            shortfall,
            failures: samples.failures,
            asymptotic: None,
        }
    }

    /// Record for an asymptotic calculator.
    pub fn from_asymptotic(point: f64, poi_hat: f64, asymptotic: AsymptoticPoint) -> Self {
        Self {
            point,
            observed: asymptotic.statistic,
            poi_hat,
            null: Vec::new(),
            alt: Vec::new(),
            seeds: BTreeSet::new(),
            requested: 0,
            shortfall: Shortfall::default(),
            failures: Vec::new(),
            asymptotic: Some(asymptotic),
        }
    }

    /// Larger of the two ensemble shortfalls.
    pub fn missing(&self) -> usize {
        self.shortfall.null.max(self.shortfall.alt)
    }

    fn merge(
        &self,
        other: &ResultRecord,
        left: &SeedSources,
        right: &SeedSources,
    ) -> Result<ResultRecord> {
        let scale = self.observed.abs().max(other.observed.abs()).max(1.0);
        if (self.observed - other.observed).abs() > 1e-9 * scale {
            return Err(Error::ConfigurationMismatch {
                field: format!("observed statistic at POI {}", self.point),
                left: self.observed.to_string(),
                right: other.observed.to_string(),
            });
        }
        if let Some(seed) = self.seeds.intersection(&other.seeds).next() {
            return Err(Error::SeedCollision {
                seed: seed.get(),
                point: self.point,
                first: describe(left, *seed),
                second: describe(right, *seed),
            });
        }

        let mut merged = self.clone();
        merged.null.extend_from_slice(&other.null);
        merged.alt.extend_from_slice(&other.alt);
        merged.seeds.extend(other.seeds.iter().copied());
        merged.requested += other.requested;
        merged.shortfall.null += other.shortfall.null;
        merged.shortfall.alt += other.shortfall.alt;
        merged.failures.extend(other.failures.iter().cloned());
        Ok(merged)
    }
}

/// Provenance of job seeds: which inputs each seed came from.
pub type SeedSources = BTreeMap<JobSeed, Vec<String>>;

fn describe(sources: &SeedSources, seed: JobSeed) -> String {
    match sources.get(&seed) {
        Some(names) if !names.is_empty() => names.join(" + "),
        _ => "<unknown input>".to_string(),
    }
}

/// Aggregate completeness of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every requested toy is present.
    Complete,
    /// Some toys are missing, but no point misses a majority.
    Partial,
    /// Some point misses a majority of its toys.
    Failed,
}

impl JobStatus {
    /// The worse of two statuses.
    pub fn worst(self, other: JobStatus) -> JobStatus {
        use JobStatus::*;
        match (self, other) {
            (Failed, _) | (_, Failed) => Failed,
            (Partial, _) | (_, Partial) => Partial,
            _ => Complete,
        }
    }
}

/// Records sorted by point, plus the configuration they share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStore {
    /// Shared configuration.
    pub meta: StoreMeta,
    /// Records in ascending point order.
    pub records: Vec<ResultRecord>,
}

impl ResultStore {
    /// Build a store, sorting records by point.
    pub fn new(meta: StoreMeta, mut records: Vec<ResultRecord>) -> Self {
        records.sort_by(|a, b| a.point.total_cmp(&b.point));
        Self { meta, records }
    }

    /// Record at `point`, if any.
    pub fn record(&self, point: f64) -> Option<&ResultRecord> {
        self.records.iter().find(|r| points_match(r.point, point))
    }

    /// Job seeds contributing to any record.
    pub fn seeds(&self) -> BTreeSet<JobSeed> {
        self.records.iter().flat_map(|r| r.seeds.iter().copied()).collect()
    }

    /// Completeness over all records.
    pub fn status(&self) -> JobStatus {
        let mut status = JobStatus::Complete;
        for r in &self.records {
            let missing = r.missing();
            if missing == 0 {
                continue;
            }
            if r.requested == 0 || 2 * missing > r.requested {
                return JobStatus::Failed;
            }
            status = JobStatus::Partial;
        }
        status
    }

    /// Fail with the collision that merging new results for `seed` at `points` would hit.
    ///
    /// `incoming` names the source of the new results in the error.
    pub fn check_seed_free(
        &self,
        seed: JobSeed,
        points: &[f64],
        sources: &SeedSources,
        incoming: &str,
    ) -> Result<()> {
        for &point in points {
            if let Some(rec) = self.record(point).filter(|r| r.seeds.contains(&seed)) {
                return Err(Error::SeedCollision {
                    seed: seed.get(),
                    point: rec.point,
                    first: describe(sources, seed),
                    second: incoming.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Pure merge without provenance names.
    pub fn merge(&self, other: &ResultStore) -> Result<ResultStore> {
        self.merge_with_sources(other, &SeedSources::new(), &SeedSources::new())
    }

    /// Pure merge; `left` / `right` name the inputs each seed came from in errors.
    ///
    /// Fails without producing anything on a configuration mismatch, a differing
    /// observed statistic, or a job seed shared at a common point.
    pub fn merge_with_sources(
        &self,
        other: &ResultStore,
        left: &SeedSources,
        right: &SeedSources,
    ) -> Result<ResultStore> {
        self.meta.check_compatible(&other.meta)?;
        if !self.meta.calculator.uses_toys() {
            return Err(Error::Validation(format!(
                "{} results have no toys to accumulate and cannot be merged",
                self.meta.calculator
            )));
        }

        let mut records = Vec::with_capacity(self.records.len() + other.records.len());
        let mut taken = vec![false; other.records.len()];
        for rec in &self.records {
            let twin = other
                .records
                .iter()
                .enumerate()
                .find(|(j, r)| !taken[*j] && points_match(r.point, rec.point));
            match twin {
                Some((j, r)) => {
                    taken[j] = true;
                    records.push(rec.merge(r, left, right)?);
                }
                None => records.push(rec.clone()),
            }
        }
        for (j, r) in other.records.iter().enumerate() {
            if !taken[j] {
                records.push(r.clone());
            }
        }
        Ok(ResultStore::new(self.meta.clone(), records))
    }
}

/// Persisted content of a dump file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    /// Format tag, [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// Which inputs each job seed came from.
    pub sources: SeedSources,
    /// Upper-limit scan results.
    pub inversion: Option<ResultStore>,
    /// Discovery test results.
    pub discovery: Option<ResultStore>,
}

impl ResultBundle {
    /// Bundle for one invocation, attributing `seed` (if any) to `source`.
    pub fn new(
        seed: Option<JobSeed>,
        source: &str,
        inversion: Option<ResultStore>,
        discovery: Option<ResultStore>,
    ) -> Self {
        let mut sources = SeedSources::new();
        if let Some(seed) = seed {
            sources.insert(seed, vec![source.to_string()]);
        }
        Self { schema_version: SCHEMA_VERSION.to_string(), sources, inversion, discovery }
    }

    /// Pure merge of two bundles.
    pub fn merge(&self, other: &ResultBundle) -> Result<ResultBundle> {
        let merge_store = |a: &Option<ResultStore>, b: &Option<ResultStore>| -> Result<_> {
            Ok(match (a, b) {
                (Some(a), Some(b)) => Some(a.merge_with_sources(b, &self.sources, &other.sources)?),
                (Some(a), None) => Some(a.clone()),
                (None, b) => b.clone(),
            })
        };
        let inversion = merge_store(&self.inversion, &other.inversion)?;
        let discovery = merge_store(&self.discovery, &other.discovery)?;

        let mut sources = self.sources.clone();
        for (seed, names) in &other.sources {
            let entry = sources.entry(*seed).or_default();
            for name in names {
                if !entry.contains(name) {
                    entry.push(name.clone());
                }
            }
        }
        Ok(ResultBundle { schema_version: SCHEMA_VERSION.to_string(), sources, inversion, discovery })
    }

    /// Fail if a run under `seed` producing `inversion_points` and `discovery_points`
    /// could not be merged into this bundle because the seed is already present there.
    pub fn check_seed_free(
        &self,
        seed: JobSeed,
        incoming: &str,
        inversion_points: &[f64],
        discovery_points: &[f64],
    ) -> Result<()> {
        if let Some(store) = &self.inversion {
            store.check_seed_free(seed, inversion_points, &self.sources, incoming)?;
        }
        if let Some(store) = &self.discovery {
            store.check_seed_free(seed, discovery_points, &self.sources, incoming)?;
        }
        Ok(())
    }

    /// Merge many bundles by pairwise cascade reduction. `None` for an empty input.
    pub fn merge_all(mut bundles: Vec<ResultBundle>) -> Result<Option<ResultBundle>> {
        while bundles.len() > 1 {
            let mut next = Vec::with_capacity(bundles.len().div_ceil(2));
            let mut iter = bundles.into_iter();
            while let Some(a) = iter.next() {
                match iter.next() {
                    Some(b) => next.push(a.merge(&b)?),
                    None => next.push(a),
                }
            }
            bundles = next;
        }
        Ok(bundles.pop())
    }

    /// Read a bundle from a JSON file.
    pub fn load(path: &Path) -> Result<ResultBundle> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
        })?;
        let bundle: ResultBundle = serde_json::from_str(&text).map_err(|e| {
            Error::Validation(format!("{} is not a result bundle: {}", path.display(), e))
        })?;
        if bundle.schema_version != SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "{} has schema '{}', expected '{}'",
                path.display(),
                bundle.schema_version,
                SCHEMA_VERSION
            )));
        }
        Ok(bundle)
    }

    /// Write the bundle as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Worst status over the contained stores.
    pub fn status(&self) -> JobStatus {
        [&self.inversion, &self.discovery]
            .into_iter()
            .flatten()
            .map(ResultStore::status)
            .fold(JobStatus::Complete, JobStatus::worst)
    }
}
