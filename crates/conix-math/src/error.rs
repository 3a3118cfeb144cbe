//! Error types for the math primitives.

use thiserror::Error;

/// Precondition violations in math primitive construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// A parameter rectangle is NaN, inverted, or has zero area.
    #[error("degenerate rectangle [{u_min}, {u_max}] x [{v_min}, {v_max}]")]
    DegenerateRect {
        /// Lower u bound.
        u_min: f64,
        /// Upper u bound.
        u_max: f64,
        /// Lower v bound.
        v_min: f64,
        /// Upper v bound.
        v_max: f64,
    },

    /// A transform has no inverse.
    #[error("transform is not invertible")]
    Singular,
}

/// Result type for math operations.
pub type Result<T> = std::result::Result<T, MathError>;
