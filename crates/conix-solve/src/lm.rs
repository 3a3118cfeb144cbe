//! Levenberg-Marquardt for unconstrained nonlinear least squares.

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::{
    check_len, eval_jacobian, eval_residual, LeastSquaresModel, Result, Solution, SolveError,
    SolverSettings,
};

/// Damping above which a step is considered impossible.
const MAX_DAMPING: f64 = 1e32;

/// Minimizes `½|r(x)|²` for a [`LeastSquaresModel`].
///
/// Damping follows Nielsen's update: shrink smoothly on good steps, grow
/// geometrically on rejected ones.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    settings: SolverSettings,
}

impl LevenbergMarquardt {
    /// Create a solver with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Solve starting from `x0`.
    pub fn solve<M: LeastSquaresModel + ?Sized>(
        &self,
        model: &M,
        x0: DVector<f64>,
    ) -> Result<Solution> {
        check_len(model.num_params(), x0.len())?;
        let s = &self.settings;
        let mut x = x0;
        let mut r = eval_residual(model, &x)
            .ok_or_else(|| SolveError::InvalidModel("residual rejected initial guess".into()))?;
        let mut cost = 0.5 * r.norm_squared();
        let mut lambda = -1.0;
        let mut nu = 2.0;

        for iter in 0..s.max_iterations {
            if r.norm() <= s.residual_tolerance {
                return Ok(finish(x, &r, iter, true));
            }
            let j = eval_jacobian(model, &x)?;
            let g = j.tr_mul(&r);
            if g.amax() <= s.gradient_tolerance {
                return Ok(finish(x, &r, iter, true));
            }
            let a = j.tr_mul(&j);
            if lambda < 0.0 {
                lambda = s.initial_damping * a.diagonal().amax().max(1e-300);
            }

            // Inner loop: raise damping until a step reduces the cost.
            loop {
                let Some(step) = damped_step(&a, &g, lambda) else {
                    lambda *= nu;
                    nu *= 2.0;
                    if lambda > MAX_DAMPING {
                        return Err(SolveError::Singular(iter));
                    }
                    continue;
                };
                if step.norm() <= s.step_tolerance * (x.norm() + s.step_tolerance) {
                    return Ok(finish(x, &r, iter + 1, true));
                }
                let x_new = &x + &step;
                let predicted = 0.5 * step.dot(&(lambda * &step - &g));
                let trial = eval_residual(model, &x_new);
                let gain = match &trial {
                    Some(r_new) if predicted > 0.0 => (cost - 0.5 * r_new.norm_squared()) / predicted,
                    _ => -1.0,
                };
                if gain > 0.0 {
                    if let Some(r_new) = trial {
                        x = x_new;
                        cost = 0.5 * r_new.norm_squared();
                        r = r_new;
                    }
                    lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * gain - 1.0).powi(3));
                    nu = 2.0;
                    break;
                }
                lambda *= nu;
                nu *= 2.0;
                if lambda > MAX_DAMPING {
                    // Steps vanish before the cost can decrease.
                    trace!(iter, cost, "damping saturated");
                    return Ok(finish(x, &r, iter + 1, true));
                }
            }
        }
        Ok(finish(x, &r, s.max_iterations, false))
    }
}

fn finish(params: DVector<f64>, r: &DVector<f64>, iterations: usize, converged: bool) -> Solution {
    let residual = r.norm();
    trace!(iterations, residual, converged, "levenberg-marquardt finished");
    Solution {
        converged,
        params,
        residual,
        iterations,
    }
}

/// Solve `(JᵀJ + λI) h = -g`.
pub(crate) fn damped_step(a: &DMatrix<f64>, g: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let n = a.nrows();
    let m = a + DMatrix::identity(n, n) * lambda;
    let h = m.cholesky()?.solve(&(-g));
    h.iter().all(|v| v.is_finite()).then_some(h)
}
