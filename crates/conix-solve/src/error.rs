//! Error types for the solvers.

use thiserror::Error;

/// Ways a solve can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The iteration budget ran out before a convergence test passed.
    #[error("no convergence after {iterations} iterations (residual {residual:e})")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
        /// Residual at the last iterate.
        residual: f64,
    },

    /// The linear system of a step could not be solved.
    #[error("singular system at iteration {0}")]
    Singular(usize),

    /// A model callback rejected the parameters or produced non-finite values.
    #[error("invalid model evaluation: {0}")]
    InvalidModel(String),

    /// Vector lengths disagree with the model.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Length the model declares.
        expected: usize,
        /// Length supplied.
        found: usize,
    },

    /// Invalid solver settings or bounds.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolveError>;
