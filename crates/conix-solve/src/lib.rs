#![warn(missing_docs)]

//! Numerical solvers for the conix geometric core.
//!
//! Three interchangeable strategies over user-supplied model callbacks:
//!
//! - [`NewtonMinimizer`]: Newton's method with Hessian for a scalar
//!   objective, regularized by a diagonal shift and safeguarded by a
//!   backtracking line search.
//! - [`LevenbergMarquardt`]: damped Gauss-Newton for a vector residual.
//! - [`TrustRegion`]: Levenberg-Marquardt with an explicit trust radius and
//!   box constraints.
//!
//! Model callbacks return `None` for parameters they cannot evaluate. Every
//! solve terminates within [`SolverSettings::max_iterations`] outer steps and
//! reports failure through [`SolveError`], never by panicking.

mod error;
mod lm;
mod newton;
mod trust_region;

pub use error::{Result, SolveError};
pub use lm::LevenbergMarquardt;
pub use newton::NewtonMinimizer;
pub use trust_region::TrustRegion;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// =============================================================================
// Model traits
// =============================================================================

/// A smooth scalar function to minimize.
pub trait ScalarObjective {
    /// Number of parameters.
    fn dimension(&self) -> usize;

    /// Objective value, `None` if `x` is outside the model's domain.
    fn value(&self, x: &DVector<f64>) -> Option<f64>;

    /// Gradient at `x`.
    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>>;

    /// Hessian at `x`.
    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>>;
}

/// A vector residual whose squared norm is minimized.
pub trait LeastSquaresModel {
    /// Number of parameters.
    fn num_params(&self) -> usize;

    /// Number of residual components.
    fn num_residuals(&self) -> usize;

    /// Residual vector at `x`.
    fn residual(&self, x: &DVector<f64>) -> Option<DVector<f64>>;

    /// Jacobian of the residual (rows = residuals, columns = parameters).
    ///
    /// Defaults to central differences.
    fn jacobian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        finite_difference_jacobian(self, x)
    }
}

/// Central-difference Jacobian of `model` at `x`.
pub fn finite_difference_jacobian<M: LeastSquaresModel + ?Sized>(
    model: &M,
    x: &DVector<f64>,
) -> Option<DMatrix<f64>> {
    let n = x.len();
    let m = model.num_residuals();
    let mut jac = DMatrix::zeros(m, n);
    let mut shifted = x.clone();
    for j in 0..n {
        let h = 1e-7 * (1.0 + x[j].abs());
        shifted[j] = x[j] + h;
        let plus = model.residual(&shifted)?;
        shifted[j] = x[j] - h;
        let minus = model.residual(&shifted)?;
        shifted[j] = x[j];
        if plus.len() != m || minus.len() != m {
            return None;
        }
        jac.set_column(j, &((plus - minus) / (2.0 * h)));
    }
    Some(jac)
}

/// A least-squares model from a closure, with a finite-difference Jacobian.
pub struct ResidualFn<F> {
    params: usize,
    residuals: usize,
    f: F,
}

impl<F> ResidualFn<F>
where
    F: Fn(&DVector<f64>) -> Option<DVector<f64>>,
{
    /// Wrap `f`, which maps `params` parameters to `residuals` values.
    pub fn new(params: usize, residuals: usize, f: F) -> Self {
        Self {
            params,
            residuals,
            f,
        }
    }
}

impl<F> LeastSquaresModel for ResidualFn<F>
where
    F: Fn(&DVector<f64>) -> Option<DVector<f64>>,
{
    fn num_params(&self) -> usize {
        self.params
    }

    fn num_residuals(&self) -> usize {
        self.residuals
    }

    fn residual(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        (self.f)(x)
    }
}

// =============================================================================
// Results, bounds, settings
// =============================================================================

/// Outcome of a solve that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Whether a convergence test passed (as opposed to the iteration
    /// budget running out).
    pub converged: bool,
    /// Final parameters.
    pub params: DVector<f64>,
    /// Final objective value (Newton) or residual norm (least squares).
    pub residual: f64,
    /// Outer iterations performed.
    pub iterations: usize,
}

impl Solution {
    /// `Ok` when converged, [`SolveError::NotConverged`] otherwise.
    pub fn into_converged(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(SolveError::NotConverged {
                iterations: self.iterations,
                residual: self.residual,
            })
        }
    }
}

/// Box constraints `lower <= x <= upper`. Infinite entries are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    /// Build bounds; fails when the lengths differ or a lower bound exceeds
    /// its upper bound.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(SolveError::DimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        if lower.iter().zip(upper.iter()).any(|(l, u)| l.is_nan() || u.is_nan() || l > u) {
            return Err(SolveError::InvalidSettings(
                "lower bound exceeds upper bound".into(),
            ));
        }
        Ok(Self { lower, upper })
    }

    /// No constraints on `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
        }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Lower bounds.
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// Upper bounds.
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// Clamp `x` into the box.
    pub fn project(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(x.len(), |i, _| x[i].clamp(self.lower[i], self.upper[i]))
    }

    /// Whether `x` lies in the box.
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.iter()
            .enumerate()
            .all(|(i, v)| *v >= self.lower[i] && *v <= self.upper[i])
    }
}

/// Iteration limits and tolerances shared by all solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Maximum outer iterations.
    pub max_iterations: usize,
    /// Converged when the (projected) gradient's largest component is below
    /// this value.
    pub gradient_tolerance: f64,
    /// Converged when a step is smaller than this, relative to `|x| + tol`.
    pub step_tolerance: f64,
    /// Least-squares solvers stop when the residual norm drops to this.
    pub residual_tolerance: f64,
    /// Initial damping relative to the largest diagonal of `JᵀJ`.
    pub initial_damping: f64,
    /// Initial trust radius (trust-region solver).
    pub initial_trust_radius: f64,
    /// Maximum halvings in the Newton line search.
    pub max_line_search: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            gradient_tolerance: 1e-12,
            step_tolerance: 1e-12,
            residual_tolerance: 1e-13,
            initial_damping: 1e-3,
            initial_trust_radius: 1.0,
            max_line_search: 40,
        }
    }
}

impl SolverSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SolveError::InvalidSettings(
                "max_iterations must be positive".into(),
            ));
        }
        let tolerances = [
            ("gradient_tolerance", self.gradient_tolerance),
            ("step_tolerance", self.step_tolerance),
            ("residual_tolerance", self.residual_tolerance),
        ];
        for (name, value) in tolerances {
            if value.is_nan() || value < 0.0 {
                return Err(SolveError::InvalidSettings(format!(
                    "{name} must be non-negative"
                )));
            }
        }
        if self.initial_damping.is_nan() || self.initial_damping <= 0.0 {
            return Err(SolveError::InvalidSettings(
                "initial_damping must be positive".into(),
            ));
        }
        if !self.initial_trust_radius.is_finite() || self.initial_trust_radius <= 0.0 {
            return Err(SolveError::InvalidSettings(
                "initial_trust_radius must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Fails with `DimensionMismatch` unless `found == expected`.
pub(crate) fn check_len(expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SolveError::DimensionMismatch { expected, found })
    }
}

/// Residual at `x` with length and finiteness checks.
pub(crate) fn eval_residual<M: LeastSquaresModel + ?Sized>(
    model: &M,
    x: &DVector<f64>,
) -> Option<DVector<f64>> {
    let r = model.residual(x)?;
    (r.len() == model.num_residuals() && r.iter().all(|v| v.is_finite())).then_some(r)
}

/// Jacobian at `x` with shape and finiteness checks.
pub(crate) fn eval_jacobian<M: LeastSquaresModel + ?Sized>(
    model: &M,
    x: &DVector<f64>,
) -> Result<DMatrix<f64>> {
    let j = model
        .jacobian(x)
        .ok_or_else(|| SolveError::InvalidModel("jacobian rejected parameters".into()))?;
    if j.nrows() != model.num_residuals() || j.ncols() != model.num_params() {
        return Err(SolveError::DimensionMismatch {
            expected: model.num_residuals() * model.num_params(),
            found: j.nrows() * j.ncols(),
        });
    }
    if j.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::InvalidModel("non-finite jacobian".into()));
    }
    Ok(j)
}
