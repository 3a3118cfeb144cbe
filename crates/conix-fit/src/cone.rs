//! Cone fitting.

use std::f64::consts::FRAC_PI_2;

use conix_geom::ConeSurface;
use conix_math::{Point3, Vec3};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::axis::AxisFrame;
use crate::{fit_shape, FitOutcome, FitSettings, Result, Shape};

/// Starting point for a cone fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConeGuess {
    /// Apex.
    pub apex: Point3,
    /// Axis direction, pointing into the fitted nappe; need not be unit.
    pub axis: Vec3,
    /// Half-angle in radians.
    pub half_angle: f64,
}

impl From<&ConeSurface> for ConeGuess {
    fn from(cone: &ConeSurface) -> Self {
        Self {
            apex: cone.apex,
            axis: cone.axis.into_inner(),
            half_angle: cone.half_angle,
        }
    }
}

/// Parameters `[θ, φ, x, y, z, α]`.
struct ConeShape {
    frame: AxisFrame,
    guess: ConeGuess,
}

impl Shape for ConeShape {
    type Output = ConeSurface;

    fn num_params(&self) -> usize {
        6
    }

    fn initial(&self) -> DVector<f64> {
        let a = self.guess.apex;
        DVector::from_vec(vec![0.0, 0.0, a.x, a.y, a.z, self.guess.half_angle])
    }

    fn residuals(&self, x: &DVector<f64>, points: &[Point3]) -> Option<DVector<f64>> {
        let axis = self.frame.direction(x[0], x[1]);
        let apex = Point3::new(x[2], x[3], x[4]);
        let (sa, ca) = x[5].sin_cos();
        Some(DVector::from_iterator(
            points.len(),
            points.iter().map(|p| {
                let d = p - apex;
                let h = d.dot(&axis);
                let rho = d.cross(&axis).norm();
                rho * ca - h * sa
            }),
        ))
    }

    fn build(&self, x: &DVector<f64>, _points: &[Point3]) -> Option<ConeSurface> {
        let alpha = x[5];
        if !(alpha > 0.0 && alpha < FRAC_PI_2) {
            return None;
        }
        let axis = self.frame.direction(x[0], x[1]);
        ConeSurface::with_axis(Point3::new(x[2], x[3], x[4]), axis, alpha)
    }
}

/// Fit a right circular cone to `points`, starting from `guess`.
pub fn fit_cone(points: &[Point3], guess: &ConeGuess, settings: &FitSettings) -> Result<FitOutcome<ConeSurface>> {
    settings.validate()?;
    let Some(frame) = AxisFrame::new(&guess.axis) else {
        return Ok(FitOutcome::failed());
    };
    let shape = ConeShape { frame, guess: *guess };
    Ok(fit_shape("cone", &shape, points, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_geom::Surface;
    use conix_math::{Point2, TAU};

    fn truth() -> ConeSurface {
        ConeSurface::with_axis(Point3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 1.0), 0.4).unwrap()
    }

    fn sample(cone: &ConeSurface) -> Vec<Point3> {
        let mut pts = Vec::new();
        for i in 0..20 {
            for j in 0..5 {
                let u = TAU * i as f64 / 20.0;
                let v = 1.0 + 0.5 * j as f64;
                pts.push(cone.evaluate(Point2::new(u, v)));
            }
        }
        pts
    }

    #[test]
    fn test_exact_cloud_fits() {
        let cone = truth();
        let pts = sample(&cone);
        let out = fit_cone(&pts, &ConeGuess::from(&cone), &FitSettings::default()).unwrap();
        let fit = out.primitive.unwrap();
        assert!((fit.apex - cone.apex).norm() < 1e-9);
        assert!((fit.half_angle - 0.4).abs() < 1e-9);
        assert!(out.error < 1e-20);
    }

    #[test]
    fn test_recovers_from_perturbed_guess() {
        let cone = truth();
        let pts = sample(&cone);
        let guess = ConeGuess {
            apex: Point3::new(1.05, 1.95, 3.02),
            axis: Vec3::new(0.05, 1.0, 0.9),
            half_angle: 0.45,
        };
        let out = fit_cone(&pts, &guess, &FitSettings::default()).unwrap();
        let fit = out.primitive.unwrap();
        assert!((fit.apex - cone.apex).norm() < 1e-7);
        assert!(fit.axis.as_ref().cross(cone.axis.as_ref()).norm() < 1e-7);
        assert!((fit.half_angle - 0.4).abs() < 1e-7);
        for p in &pts {
            let d = p - fit.apex;
            let h = d.dot(fit.axis.as_ref());
            assert!(h > 0.0);
        }
    }

    #[test]
    fn test_zero_axis_fails() {
        let guess = ConeGuess {
            apex: Point3::origin(),
            axis: Vec3::zeros(),
            half_angle: 0.3,
        };
        let out = fit_cone(&sample(&truth()), &guess, &FitSettings::default()).unwrap();
        assert!(!out.is_fitted());
        assert!(out.error.is_infinite());
    }
}
