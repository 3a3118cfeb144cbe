//! Box-constrained Levenberg-Marquardt with an explicit trust radius.

use nalgebra::DVector;
use tracing::trace;

use crate::lm::damped_step;
use crate::{
    check_len, eval_jacobian, eval_residual, Bounds, LeastSquaresModel, Result, Solution,
    SolveError, SolverSettings,
};

/// Minimizes `½|r(x)|²` subject to `lower <= x <= upper`.
///
/// Each step is the damped Gauss-Newton step with the smallest damping
/// whose length fits the trust radius, projected into the box. The radius
/// shrinks or grows according to the ratio of actual to predicted
/// reduction.
#[derive(Debug, Clone, Default)]
pub struct TrustRegion {
    settings: SolverSettings,
}

impl TrustRegion {
    /// Create a solver with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Solve starting from `x0` (projected into `bounds` first).
    pub fn solve<M: LeastSquaresModel + ?Sized>(
        &self,
        model: &M,
        x0: DVector<f64>,
        bounds: &Bounds,
    ) -> Result<Solution> {
        check_len(model.num_params(), x0.len())?;
        check_len(model.num_params(), bounds.len())?;
        let s = &self.settings;
        let mut x = bounds.project(&x0);
        let mut r = eval_residual(model, &x)
            .ok_or_else(|| SolveError::InvalidModel("residual rejected initial guess".into()))?;
        let mut cost = 0.5 * r.norm_squared();
        let mut radius = s.initial_trust_radius * (1.0 + x.norm());

        for iter in 0..s.max_iterations {
            if r.norm() <= s.residual_tolerance {
                return Ok(finish(x, &r, iter, true));
            }
            let j = eval_jacobian(model, &x)?;
            let g = j.tr_mul(&r);
            let projected_gradient = bounds.project(&(&x - &g)) - &x;
            if projected_gradient.amax() <= s.gradient_tolerance {
                return Ok(finish(x, &r, iter, true));
            }
            let a = j.tr_mul(&j);

            // Smallest damping whose step fits in the trust radius
            let scale = a.diagonal().amax().max(1e-300);
            let mut mu = 0.0;
            let mut step = None;
            for _ in 0..60 {
                if let Some(h) = damped_step(&a, &g, mu) {
                    if h.norm() <= radius {
                        step = Some(h);
                        break;
                    }
                    step = Some(h);
                }
                mu = if mu == 0.0 { 1e-12 * scale } else { mu * 4.0 };
            }
            let mut h = step.ok_or(SolveError::Singular(iter))?;
            let len = h.norm();
            if len > radius {
                h *= radius / len;
            }

            let x_trial = bounds.project(&(&x + &h));
            let h_eff = &x_trial - &x;
            let moved = h_eff.norm();
            if moved <= s.step_tolerance * (x.norm() + s.step_tolerance) {
                return Ok(finish(x, &r, iter + 1, true));
            }
            let predicted = -(g.dot(&h_eff) + 0.5 * h_eff.dot(&(&a * &h_eff)));
            let trial = eval_residual(model, &x_trial);
            let rho = match &trial {
                Some(r_new) if predicted > 0.0 => (cost - 0.5 * r_new.norm_squared()) / predicted,
                _ => -1.0,
            };

            if rho < 0.25 {
                radius = 0.25 * moved;
            } else if rho > 0.75 && moved >= 0.9 * radius {
                radius *= 2.0;
            }
            if rho > 1e-4 {
                if let Some(r_new) = trial {
                    x = x_trial;
                    cost = 0.5 * r_new.norm_squared();
                    r = r_new;
                }
            }
            if radius <= s.step_tolerance * (x.norm() + s.step_tolerance) {
                trace!(iter, cost, "trust radius collapsed");
                return Ok(finish(x, &r, iter + 1, true));
            }
        }
        Ok(finish(x, &r, s.max_iterations, false))
    }
}

fn finish(params: DVector<f64>, r: &DVector<f64>, iterations: usize, converged: bool) -> Solution {
    let residual = r.norm();
    trace!(iterations, residual, converged, "trust region finished");
    Solution {
        converged,
        params,
        residual,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResidualFn;

    fn bounds(lo: &[f64], hi: &[f64]) -> Bounds {
        Bounds::new(DVector::from_row_slice(lo), DVector::from_row_slice(hi)).unwrap()
    }

    #[test]
    fn test_trust_region_unconstrained_minimum_inside() {
        let model = ResidualFn::new(2, 2, |p: &DVector<f64>| {
            Some(DVector::from_vec(vec![p[0] - 0.3, 10.0 * (p[1] - p[0] * p[0])]))
        });
        let sol = TrustRegion::default()
            .solve(&model, DVector::from_vec(vec![0.9, 0.9]), &bounds(&[0.0, 0.0], &[1.0, 1.0]))
            .unwrap();
        assert!(sol.converged);
        assert!((sol.params[0] - 0.3).abs() < 1e-8);
        assert!((sol.params[1] - 0.09).abs() < 1e-8);
    }

    #[test]
    fn test_trust_region_active_bound() {
        // Unconstrained minimum at x = 2 lies outside [0, 1]
        let model = ResidualFn::new(1, 1, |p: &DVector<f64>| {
            Some(DVector::from_element(1, p[0] - 2.0))
        });
        let sol = TrustRegion::default()
            .solve(&model, DVector::from_element(1, 0.5), &bounds(&[0.0], &[1.0]))
            .unwrap();
        assert!(sol.converged);
        assert!((sol.params[0] - 1.0).abs() < 1e-12);
        assert!((sol.residual - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_trust_region_projects_initial_guess() {
        let model = ResidualFn::new(1, 1, |p: &DVector<f64>| {
            Some(DVector::from_element(1, p[0] + 5.0))
        });
        let sol = TrustRegion::default()
            .solve(&model, DVector::from_element(1, -10.0), &bounds(&[-1.0], &[1.0]))
            .unwrap();
        assert!((sol.params[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_trust_region_bounds_dimension() {
        let model = ResidualFn::new(2, 1, |p: &DVector<f64>| Some(DVector::from_element(1, p[0])));
        let err = TrustRegion::default()
            .solve(&model, DVector::zeros(2), &Bounds::unbounded(3))
            .unwrap_err();
        assert!(matches!(err, SolveError::DimensionMismatch { .. }));
    }
}
