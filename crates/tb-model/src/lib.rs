//! # tb-model
//!
//! Concrete model capability for toybail: a multi-bin on/off counting model.
//!
//! Each bin observes `n ~ Pois(mu * s + beta)` in the signal region and
//! `m ~ Pois(tau * beta)` in a control region. The background `beta` of every bin is
//! a nuisance parameter profiled in closed form; the signal strength `mu` is fitted
//! with bounded L-BFGS.
//!
//! [`CountingGenerator`] implements [`tb_core::ToyGenerator`] on top of this model and
//! is what the worker processes run.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asymptotic;
pub mod fit;
pub mod generator;
pub mod model;
pub mod optimizer;
pub mod toys;
pub mod workspace;

pub use fit::{PoiFit, ProfileFitter};
pub use generator::CountingGenerator;
pub use model::{CountingModel, Dataset};
pub use optimizer::{OptimizerConfig, OptimizationResult};
pub use workspace::{BinSpec, CountingModelSpec, Workspace};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::CountingModel;
    use crate::workspace::{BinSpec, CountingModelSpec};

    /// Single-bin model with `aux_observed = tau * background`.
    pub(crate) fn one_bin(observed: f64, signal: f64, background: f64, tau: f64) -> CountingModel {
        CountingModel::from_spec(&CountingModelSpec {
            poi: "mu".into(),
            poi_max: 50.0,
            bins: vec![BinSpec {
                name: "SR".into(),
                observed,
                signal,
                background,
                tau,
                aux_observed: None,
            }],
        })
        .unwrap()
    }
}
