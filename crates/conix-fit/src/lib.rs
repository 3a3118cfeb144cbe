#![warn(missing_docs)]

//! Primitive surface fitting for the conix geometric core.
//!
//! Fits cylinders, cones, tori and general quadrics to unordered point
//! clouds by Levenberg-Marquardt over the primitive's parameters:
//!
//! - [`fit_cylinder`]: residual `|(p - c) × a| - r`.
//! - [`fit_cone`]: residual `ρ cos α - h sin α`.
//! - [`fit_torus`]: residual `√((ρ - R)² + h²) - r`.
//! - [`fit_quadric`]: Sampson distance `F / |∇F|` after an algebraic
//!   initial estimate.
//!
//! Axis directions are two polar angles in a frame whose equator contains
//! the initial axis, so the guess sits far from the frame's poles.
//!
//! Every fit reports the sum of squared standard errors of its parameters.
//! Non-convergence is not an error: the outcome carries no primitive and an
//! infinite error.
//!
//! # Example
//!
//! ```ignore
//! use conix_fit::{fit_cylinder, CylinderGuess, FitSettings};
//!
//! let guess = CylinderGuess { center, axis, radius: 2.0 };
//! let outcome = fit_cylinder(&points, &guess, &FitSettings::default())?;
//! if let Some(cyl) = outcome.primitive {
//!     println!("fit error {:e}", outcome.error);
//! }
//! ```

mod axis;
mod cone;
mod cylinder;
mod error;
mod quadric;
mod torus;

pub use cone::{fit_cone, ConeGuess};
pub use cylinder::{fit_cylinder, fit_many_cylinders, CylinderGuess};
pub use error::{FitError, Result};
pub use quadric::{fit_quadric, QUADRIC_MONOMIALS};
pub use torus::{fit_torus, TorusGuess};

use conix_math::Point3;
use conix_solve::{LeastSquaresModel, LevenbergMarquardt, SolverSettings};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// Settings and outcome
// =============================================================================

/// Fitting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Settings for the Levenberg-Marquardt solve.
    pub solver: SolverSettings,
    /// Singular values of `JᵀJ` below this fraction of the largest are
    /// dropped from the pseudo-inverse of the error estimate.
    pub rank_tolerance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            solver: SolverSettings {
                max_iterations: 200,
                ..SolverSettings::default()
            },
            rank_tolerance: 1e-12,
        }
    }
}

impl FitSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.rank_tolerance > 0.0 && self.rank_tolerance < 1.0) {
            return Err(FitError::InvalidSettings(
                "rank_tolerance must be between 0 and 1".into(),
            ));
        }
        self.solver.validate()?;
        Ok(())
    }
}

/// Result of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome<T> {
    /// The fitted primitive, `None` when the solve did not converge to a
    /// valid one.
    pub primitive: Option<T>,
    /// Sum of squared standard errors of the fitted parameters
    /// (`σ² · trace((JᵀJ)⁺)`); `+∞` on failure.
    pub error: f64,
}

impl<T> FitOutcome<T> {
    /// The outcome of a fit that could not be completed.
    pub fn failed() -> Self {
        Self {
            primitive: None,
            error: f64::INFINITY,
        }
    }

    /// Whether a primitive was produced.
    pub fn is_fitted(&self) -> bool {
        self.primitive.is_some()
    }
}

// =============================================================================
// Shared machinery
// =============================================================================

/// A primitive described by a parameter vector.
pub(crate) trait Shape {
    /// What a successful fit produces.
    type Output;

    /// Number of free parameters.
    fn num_params(&self) -> usize;

    /// Parameters of the initial guess.
    fn initial(&self) -> DVector<f64>;

    /// One residual per point, plus any constraint residuals.
    fn residuals(&self, x: &DVector<f64>, points: &[Point3]) -> Option<DVector<f64>>;

    /// Extra residuals appended after the per-point ones.
    fn num_constraints(&self) -> usize {
        0
    }

    /// Build the primitive, `None` when the parameters are degenerate.
    fn build(&self, x: &DVector<f64>, points: &[Point3]) -> Option<Self::Output>;
}

struct CloudModel<'a, S> {
    shape: &'a S,
    points: &'a [Point3],
}

impl<S: Shape> LeastSquaresModel for CloudModel<'_, S> {
    fn num_params(&self) -> usize {
        self.shape.num_params()
    }

    fn num_residuals(&self) -> usize {
        self.points.len() + self.shape.num_constraints()
    }

    fn residual(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        self.shape
            .residuals(x, self.points)
            .filter(|r| r.iter().all(|v| v.is_finite()))
    }
}

/// Run the solve for `shape` and assemble the outcome.
///
/// Settings must already be validated.
pub(crate) fn fit_shape<S: Shape>(
    kind: &'static str,
    shape: &S,
    points: &[Point3],
    settings: &FitSettings,
) -> FitOutcome<S::Output> {
    let model = CloudModel { shape, points };
    if model.num_residuals() <= model.num_params() {
        debug!(kind, points = points.len(), "too few points to fit");
        return FitOutcome::failed();
    }
    let x0 = shape.initial();
    if x0.iter().any(|v| !v.is_finite()) {
        debug!(kind, "non-finite initial guess");
        return FitOutcome::failed();
    }

    let solution = match LevenbergMarquardt::new(settings.solver.clone())
        .solve(&model, x0)
        .and_then(|s| s.into_converged())
    {
        Ok(s) => s,
        Err(err) => {
            debug!(kind, %err, "fit did not converge");
            return FitOutcome::failed();
        }
    };

    let Some(primitive) = shape.build(&solution.params, points) else {
        debug!(kind, "fit converged to a degenerate primitive");
        return FitOutcome::failed();
    };
    let error = standard_error(&model, &solution.params, settings.rank_tolerance)
        .unwrap_or(f64::INFINITY);
    debug!(
        kind,
        iterations = solution.iterations,
        residual = solution.residual,
        error,
        "fit converged"
    );
    FitOutcome {
        primitive: Some(primitive),
        error,
    }
}

/// `σ² · trace((JᵀJ)⁺)` at `x`, with `σ² = |r|² / (m - n)`.
fn standard_error<M: LeastSquaresModel>(model: &M, x: &DVector<f64>, rank_tol: f64) -> Option<f64> {
    let r = model.residual(x)?;
    let j = model.jacobian(x)?;
    let dof = r.len().saturating_sub(x.len()).max(1);
    let sigma2 = r.norm_squared() / dof as f64;
    Some(sigma2 * pseudo_inverse_trace(&j.tr_mul(&j), rank_tol))
}

/// Trace of the pseudo-inverse of a symmetric positive semi-definite matrix.
fn pseudo_inverse_trace(a: &DMatrix<f64>, rank_tol: f64) -> f64 {
    let s = a.singular_values();
    let cutoff = rank_tol * s.amax();
    s.iter().filter(|&&v| v > cutoff).map(|v| 1.0 / v).sum()
}

/// Mean of the points; the origin for an empty slice.
pub(crate) fn centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(FitSettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let s = FitSettings {
            rank_tolerance: 0.0,
            ..FitSettings::default()
        };
        assert!(matches!(s.validate(), Err(FitError::InvalidSettings(_))));

        let mut s = FitSettings::default();
        s.solver.max_iterations = 0;
        assert!(matches!(s.validate(), Err(FitError::Solver(_))));
    }

    #[test]
    fn test_settings_serde() {
        let s = FitSettings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: FitSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
        let partial: FitSettings = serde_json::from_str(r#"{"rank_tolerance":1e-9}"#).unwrap();
        assert_eq!(partial.solver, s.solver);
    }

    #[test]
    fn test_pseudo_inverse_trace_drops_null_space() {
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 2.0, 0.0]));
        assert!((pseudo_inverse_trace(&a, 1e-12) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_failed_outcome() {
        let f: FitOutcome<f64> = FitOutcome::failed();
        assert!(!f.is_fitted());
        assert!(f.error.is_infinite());
    }

    #[test]
    fn test_centroid() {
        let c = centroid(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, -2.0)]);
        assert!((c - Point3::new(1.0, 2.0, -1.0)).norm() < 1e-15);
    }
}
