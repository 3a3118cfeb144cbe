//! Error types for the intersection engine.

use conix_math::MathError;
use conix_solve::SolveError;
use thiserror::Error;

/// Precondition violations at the intersection API boundary.
///
/// Numerical failure at an individual seed is not an error: it only means
/// that seed contributes nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntersectError {
    /// A domain rectangle or placement was malformed.
    #[error(transparent)]
    Math(#[from] MathError),

    /// Embedded solver settings were rejected.
    #[error("solver settings: {0}")]
    Solver(#[from] SolveError),

    /// Invalid intersection settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for intersection operations.
pub type Result<T> = std::result::Result<T, IntersectError>;
