//! Newton's method with Hessian for scalar minimization.

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::{check_len, Result, ScalarObjective, Solution, SolveError, SolverSettings};

/// Minimizes a [`ScalarObjective`] with regularized Newton steps.
///
/// When the Hessian is not positive definite a diagonal shift grows until
/// the shifted matrix factors; the resulting step is a descent direction and
/// a backtracking (Armijo) line search makes every accepted step decrease
/// the objective.
#[derive(Debug, Clone, Default)]
pub struct NewtonMinimizer {
    settings: SolverSettings,
}

impl NewtonMinimizer {
    /// Create a minimizer with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Minimize `objective` starting from `x0`.
    pub fn minimize<O: ScalarObjective + ?Sized>(
        &self,
        objective: &O,
        x0: DVector<f64>,
    ) -> Result<Solution> {
        check_len(objective.dimension(), x0.len())?;
        let s = &self.settings;
        let mut x = x0;
        let mut f = value(objective, &x)?;

        for iter in 0..s.max_iterations {
            let g = objective
                .gradient(&x)
                .filter(|g| g.len() == x.len() && g.iter().all(|v| v.is_finite()))
                .ok_or_else(|| SolveError::InvalidModel("gradient rejected parameters".into()))?;
            if g.amax() <= s.gradient_tolerance {
                return Ok(done(x, f, iter, true));
            }
            let h = objective
                .hessian(&x)
                .filter(|h| h.nrows() == x.len() && h.ncols() == x.len())
                .ok_or_else(|| SolveError::InvalidModel("hessian rejected parameters".into()))?;
            let step = regularized_step(&h, &g).ok_or(SolveError::Singular(iter))?;

            // Armijo backtracking
            let slope = g.dot(&step);
            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..s.max_line_search {
                let trial = &x + alpha * &step;
                if let Some(ft) = objective.value(&trial).filter(|v| v.is_finite()) {
                    if ft <= f + 1e-4 * alpha * slope {
                        accepted = Some((trial, ft));
                        break;
                    }
                }
                alpha *= 0.5;
            }
            let Some((x_new, f_new)) = accepted else {
                // No decrease along a descent direction: at the floating-point
                // resolution of the minimum.
                trace!(iter, f, "newton line search exhausted");
                return Ok(done(x, f, iter, true));
            };
            let moved = (&x_new - &x).norm();
            x = x_new;
            f = f_new;
            if moved <= s.step_tolerance * (x.norm() + s.step_tolerance) {
                return Ok(done(x, f, iter + 1, true));
            }
        }
        Ok(done(x, f, s.max_iterations, false))
    }
}

fn value<O: ScalarObjective + ?Sized>(objective: &O, x: &DVector<f64>) -> Result<f64> {
    objective
        .value(x)
        .filter(|v| v.is_finite())
        .ok_or_else(|| SolveError::InvalidModel("objective rejected parameters".into()))
}

fn done(params: DVector<f64>, residual: f64, iterations: usize, converged: bool) -> Solution {
    trace!(iterations, residual, converged, "newton finished");
    Solution {
        converged,
        params,
        residual,
        iterations,
    }
}

/// Solve `(H + μI) d = -g` with the smallest tried `μ >= 0` for which the
/// shifted matrix is positive definite.
fn regularized_step(h: &DMatrix<f64>, g: &DVector<f64>) -> Option<DVector<f64>> {
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = h.nrows();
    let scale = h.diagonal().amax().max(g.amax()).max(1e-300);
    let mut mu = 0.0;
    for _ in 0..64 {
        let shifted = h + DMatrix::identity(n, n) * mu;
        if let Some(chol) = shifted.cholesky() {
            let d = chol.solve(&(-g));
            if d.iter().all(|v| v.is_finite()) {
                return Some(d);
            }
        }
        mu = if mu == 0.0 { 1e-10 * scale } else { mu * 10.0 };
    }
    None
}
