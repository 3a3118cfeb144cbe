//! Error types for fitting.

use conix_solve::SolveError;
use thiserror::Error;

/// Precondition violations when setting up a fit.
///
/// A fit that fails to converge is not an error; it comes back as a
/// [`FitOutcome`](crate::FitOutcome) without a primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Embedded solver settings were rejected.
    #[error("solver settings: {0}")]
    Solver(#[from] SolveError),

    /// Invalid fit settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for fitting operations.
pub type Result<T> = std::result::Result<T, FitError>;
