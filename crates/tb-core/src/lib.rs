//! # tb-core
//!
//! Core types, traits, and error handling for toybail.
//!
//! This crate provides:
//! - Common error types
//! - The `ToyGenerator` capability trait that decouples inference from models
//! - Closed configuration enums (calculator, test statistic, fit type)
//! - Explicit seed allocation for batched toy generation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod seed;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use seed::{JobSeed, SeedAllocator, SeedStream};
pub use traits::ToyGenerator;
pub use types::{
    AsymptoticPoint, CalculatorType, DISCOVERY_ALT_POINT, FitType, ModelRef, ObservedPoint,
    PointRange, TestSpec, TestStatistic, ToyBatch, linspace, points_match,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
