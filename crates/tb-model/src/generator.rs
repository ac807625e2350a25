//! [`ToyGenerator`] implementation for the counting model.

use crate::asymptotic::asymptotic_point;
use crate::fit::ProfileFitter;
use crate::model::{CountingModel, Dataset};
use crate::optimizer::OptimizerConfig;
use crate::toys::{sample_frequentist, sample_hybrid};
use crate::workspace::load_model;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tb_core::{
    AsymptoticPoint, CalculatorType, Error, ModelRef, ObservedPoint, Result, TestSpec,
    ToyBatch, ToyGenerator,
};

/// Bit set in the unit seed to derive the alternate-ensemble RNG stream.
///
/// Unit seeds are 32-bit, so the two streams of a unit never coincide with any
/// other unit's streams.
const ALT_STREAM_BIT: u64 = 1 << 40;

/// Toy generator over a [`CountingModel`].
#[derive(Debug, Clone)]
pub struct CountingGenerator {
    name: String,
    model: CountingModel,
    digest: Option<String>,
    fitter: ProfileFitter,
}

impl CountingGenerator {
    /// Wrap an in-memory model.
    pub fn new(name: impl Into<String>, model: CountingModel) -> Self {
        Self { name: name.into(), model, digest: None, fitter: ProfileFitter::default() }
    }

    /// Load the model referenced by `model_ref` from its workspace file.
    pub fn from_model_ref(model_ref: &ModelRef) -> Result<Self> {
        let (model, digest) = load_model(model_ref)?;
        Ok(Self {
            name: model_ref.model.clone(),
            model,
            digest: Some(digest),
            fitter: ProfileFitter::default(),
        })
    }

    /// Replace the optimizer configuration used for every fit.
    pub fn with_optimizer(mut self, config: OptimizerConfig) -> Self {
        self.fitter = ProfileFitter::new(config);
        self
    }

    /// Underlying model.
    pub fn model(&self) -> &CountingModel {
        &self.model
    }

    /// SHA-256 of the model definition, when loaded from a workspace.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    fn ensemble(
        &self,
        spec: &TestSpec,
        point: f64,
        gen_mu: f64,
        rng: &mut StdRng,
        n_toys: usize,
    ) -> (Vec<f64>, usize) {
        let beta = match spec.calculator {
            CalculatorType::Frequentist => {
                Some(self.model.conditional_background(self.model.observed(), gen_mu))
            }
            _ => None,
        };

        let mut samples = Vec::with_capacity(n_toys);
        let mut failed = 0usize;
        for _ in 0..n_toys {
            let toy: Result<Dataset> = match &beta {
                Some(beta) => sample_frequentist(&self.model, gen_mu, beta, rng),
                None => sample_hybrid(&self.model, gen_mu, rng),
            };
            match toy.and_then(|d| self.fitter.statistic(&self.model, &d, spec, point)) {
                Ok(obs) => samples.push(obs.statistic),
                Err(e) => {
                    log::debug!("{}: toy at POI {} dropped: {}", self.name, point, e);
                    failed += 1;
                }
            }
        }
        (samples, failed)
    }
}

impl ToyGenerator for CountingGenerator {
    fn observe(&self, spec: &TestSpec, point: f64) -> Result<ObservedPoint> {
        self.fitter.statistic(&self.model, self.model.observed(), spec, point)
    }

    fn generate(&self, spec: &TestSpec, point: f64, seed: u64, n_toys: usize) -> Result<ToyBatch> {
        if !spec.calculator.uses_toys() {
            return Err(Error::Validation(format!(
                "{} calculator does not generate toys",
                spec.calculator
            )));
        }
        self.check_point(point)?;

        let mut rng_null = StdRng::seed_from_u64(seed);
        let mut rng_alt = StdRng::seed_from_u64(seed | ALT_STREAM_BIT);
        let (null, null_failed) = self.ensemble(spec, point, point, &mut rng_null, n_toys);
        let (alt, alt_failed) =
            self.ensemble(spec, point, spec.alternate_point(), &mut rng_alt, n_toys);

        if null_failed + alt_failed > 0 {
            log::warn!(
                "{}: {} null and {} alt toys failed at POI {} (seed {})",
                self.name,
                null_failed,
                alt_failed,
                point,
                seed
            );
        }

        Ok(ToyBatch { point, seed, requested: n_toys, null, alt, null_failed, alt_failed })
    }

    fn asymptotic(&self, spec: &TestSpec, point: f64) -> Result<AsymptoticPoint> {
        asymptotic_point(&self.fitter, &self.model, spec, point)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check_point(&self, point: f64) -> Result<()> {
        let (lo, hi) = self.model.poi_bounds();
        if !(lo..=hi).contains(&point) {
            return Err(Error::Validation(format!(
                "POI {} outside the range [{}, {}] of model '{}'",
                point, lo, hi, self.name
            )));
        }
        Ok(())
    }
}
