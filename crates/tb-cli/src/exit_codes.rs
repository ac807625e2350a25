//! Process exit codes.
//!
//! Ranges:
//! - 0-9: operational outcomes (output was written)
//! - 10-19: user errors (fix the invocation or inputs)
//! - 20-29: internal, I/O, and cancellation errors

use tb_core::Error;

/// Exit codes of `toybail`. Stable for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every requested toy is present.
    Clean = 0,

    /// Output written, some toys missing.
    PartialToys = 3,

    /// Output written, but a point misses a majority of its toys.
    FailedToys = 4,

    /// Invalid arguments, configuration, or input files.
    ArgsError = 10,

    /// Seed collision or configuration mismatch between result sets.
    MergeConflict = 11,

    /// Internal error.
    InternalError = 20,

    /// I/O error.
    IoError = 21,

    /// Deadline reached before all work finished.
    Cancelled = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Name used in log lines.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PartialToys => "OK_PARTIAL",
            ExitCode::FailedToys => "ERR_FAILED_TOYS",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::MergeConflict => "ERR_MERGE_CONFLICT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::Cancelled => "ERR_CANCELLED",
        }
    }

    /// Classify an error that ended the run.
    pub fn from_error(err: &anyhow::Error) -> ExitCode {
        if let Some(e) = err.downcast_ref::<Error>() {
            return match e {
                Error::Validation(_) => ExitCode::ArgsError,
                Error::ConfigurationMismatch { .. } | Error::SeedCollision { .. } => {
                    ExitCode::MergeConflict
                }
                Error::Io(_) => ExitCode::IoError,
                Error::Cancelled(_) => ExitCode::Cancelled,
                Error::Json(_) | Error::Computation(_) | Error::Worker(_) => {
                    ExitCode::InternalError
                }
            };
        }
        if err.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::IoError;
        }
        if let Some(e) = err.downcast_ref::<csv::Error>() {
            return if e.is_io_error() { ExitCode::IoError } else { ExitCode::InternalError };
        }
        ExitCode::InternalError
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_classified() {
        let e = anyhow::Error::from(Error::SeedCollision {
            seed: 1,
            point: 0.0,
            first: "a".into(),
            second: "b".into(),
        });
        assert_eq!(ExitCode::from_error(&e), ExitCode::MergeConflict);
        let e = anyhow::Error::from(Error::Validation("bad".into()));
        assert_eq!(ExitCode::from_error(&e), ExitCode::ArgsError);
        let e = anyhow::Error::from(Error::Cancelled("late".into())).context("running invert");
        assert_eq!(ExitCode::from_error(&e), ExitCode::Cancelled);
    }

    #[test]
    fn test_foreign_errors_classified() {
        let e = anyhow::Error::from(std::io::Error::other("disk"));
        assert_eq!(ExitCode::from_error(&e), ExitCode::IoError);
        assert_eq!(ExitCode::from_error(&anyhow::anyhow!("oops")), ExitCode::InternalError);
        assert_eq!(ExitCode::Cancelled.to_string(), "ERR_CANCELLED (22)");
    }
}
