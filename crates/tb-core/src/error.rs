//! Error types for toybail

use thiserror::Error;

/// toybail error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error (fit failure, non-finite statistic, ...)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Two result sets were produced under different configurations.
    #[error("Configuration mismatch: {field} differs ({left} vs {right})")]
    ConfigurationMismatch {
        /// Name of the differing configuration field.
        field: String,
        /// Value on the left-hand side of the merge.
        left: String,
        /// Value on the right-hand side of the merge.
        right: String,
    },

    /// A job seed contributes to the same point from two inputs.
    #[error("Seed collision: seed {seed} at POI {point} is used by both {first} and {second}")]
    SeedCollision {
        /// Offending job seed.
        seed: u16,
        /// POI value where the collision was detected.
        point: f64,
        /// Source of the first occurrence.
        first: String,
        /// Source of the second occurrence.
        second: String,
    },

    /// A worker process failed to deliver a batch.
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Work was cancelled before completion.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
