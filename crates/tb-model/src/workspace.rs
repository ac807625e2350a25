//! Workspace file format and model lookup.
//!
//! A workspace is a JSON document holding named counting models:
//!
//! ```json
//! {
//!   "models": {
//!     "combined": {
//!       "poi": "mu_SIG",
//!       "poi_max": 50.0,
//!       "bins": [
//!         {"name": "SR", "observed": 5, "signal": 0.8, "background": 4.2, "tau": 3.0}
//!       ]
//!     }
//!   }
//! }
//! ```

use crate::model::CountingModel;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tb_core::{Error, ModelRef, Result};

fn default_poi_max() -> f64 {
    100.0
}

/// One signal-region bin with its control-region measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    /// Optional label used in error messages.
    #[serde(default)]
    pub name: String,
    /// Observed signal-region count.
    pub observed: f64,
    /// Expected signal yield at `mu = 1`.
    pub signal: f64,
    /// Nominal expected background yield.
    pub background: f64,
    /// Control-to-signal region background ratio.
    pub tau: f64,
    /// Observed control-region count (defaults to `tau * background`).
    #[serde(default)]
    pub aux_observed: Option<f64>,
}

/// Serialized form of one counting model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingModelSpec {
    /// Name of the parameter of interest.
    pub poi: String,
    /// Upper bound of the POI range `[0, poi_max]`.
    #[serde(default = "default_poi_max")]
    pub poi_max: f64,
    /// Bins of the model.
    pub bins: Vec<BinSpec>,
}

impl CountingModelSpec {
    /// SHA-256 of the canonical JSON encoding, as lowercase hex.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut h = Sha256::new();
        h.update(&bytes);
        Ok(format!("{:x}", h.finalize()))
    }
}

/// A collection of named models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Models keyed by name.
    pub models: BTreeMap<String, CountingModelSpec>,
}

impl Workspace {
    /// Parse a workspace from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a workspace file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read workspace {}: {}", path.display(), e),
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Validation(format!("failed to parse workspace {}: {}", path.display(), e))
        })
    }

    /// Look up a model by name and check that it defines `poi`.
    ///
    /// `origin` names the workspace in error messages.
    pub fn select(&self, origin: &str, model: &str, poi: &str) -> Result<&CountingModelSpec> {
        let spec = self.models.get(model).ok_or_else(|| {
            let available: Vec<&str> = self.models.keys().map(String::as_str).collect();
            Error::Validation(format!(
                "model '{}' not found in {}; available: [{}]",
                model,
                origin,
                available.join(", ")
            ))
        })?;
        if spec.poi != poi {
            return Err(Error::Validation(format!(
                "POI '{}' is not defined by model '{}' in {} (its POI is '{}')",
                poi, model, origin, spec.poi
            )));
        }
        Ok(spec)
    }
}

/// Load the model a [`ModelRef`] points to, returning it with its digest.
pub fn load_model(model_ref: &ModelRef) -> Result<(CountingModel, String)> {
    let ws = Workspace::from_path(&model_ref.path)?;
    let origin = model_ref.path.display().to_string();
    let spec = ws.select(&origin, &model_ref.model, &model_ref.poi)?;
    let digest = spec.digest()?;
    let model = CountingModel::from_spec(spec)?;
    Ok((model, digest))
}
