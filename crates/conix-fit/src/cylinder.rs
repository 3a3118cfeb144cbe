//! Cylinder fitting.

use conix_geom::CylinderSurface;
use conix_math::{Point3, Vec3};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::axis::AxisFrame;
use crate::{centroid, fit_shape, FitOutcome, FitSettings, Result, Shape};

/// Starting point for a cylinder fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylinderGuess {
    /// A point on the axis.
    pub center: Point3,
    /// Axis direction; need not be unit.
    pub axis: Vec3,
    /// Radius.
    pub radius: f64,
}

impl CylinderGuess {
    /// Guess taken from a circular cylinder; `None` for an elliptical one.
    pub fn from_surface(cyl: &CylinderSurface) -> Option<Self> {
        let (center, axis, radius) = cyl.circular_axis()?;
        Some(Self {
            center,
            axis: axis.into_inner(),
            radius,
        })
    }
}

/// Parameters `[θ, φ, s, t, r]`: axis angles, axis point offset
/// `c0 + s·e2 + t·e3` in the plane through the guess perpendicular to the
/// initial axis, radius.
struct CylinderShape {
    frame: AxisFrame,
    center: Point3,
    radius: f64,
}

impl CylinderShape {
    fn new(guess: &CylinderGuess) -> Option<Self> {
        Some(Self {
            frame: AxisFrame::new(&guess.axis)?,
            center: guess.center,
            radius: guess.radius,
        })
    }

    fn placement(&self, x: &DVector<f64>) -> (Point3, Vec3, f64) {
        let (e2, e3) = self.frame.transverse();
        let axis = self.frame.direction(x[0], x[1]);
        (self.center + x[2] * e2 + x[3] * e3, axis, x[4])
    }
}

impl Shape for CylinderShape {
    type Output = CylinderSurface;

    fn num_params(&self) -> usize {
        5
    }

    fn initial(&self) -> DVector<f64> {
        DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, self.radius])
    }

    fn residuals(&self, x: &DVector<f64>, points: &[Point3]) -> Option<DVector<f64>> {
        let (c, a, r) = self.placement(x);
        Some(DVector::from_iterator(
            points.len(),
            points.iter().map(|p| (p - c).cross(&a).norm() - r),
        ))
    }

    fn build(&self, x: &DVector<f64>, points: &[Point3]) -> Option<CylinderSurface> {
        let (c, a, r) = self.placement(x);
        if !(r > 0.0 && r.is_finite()) {
            return None;
        }
        // Put the origin level with the middle of the cloud.
        let mid = c + (centroid(points) - c).dot(&a) * a;
        Some(CylinderSurface::with_axis(mid, a, r))
    }
}

/// Fit a circular cylinder to `points`, starting from `guess`.
pub fn fit_cylinder(
    points: &[Point3],
    guess: &CylinderGuess,
    settings: &FitSettings,
) -> Result<FitOutcome<CylinderSurface>> {
    settings.validate()?;
    Ok(fit_one(points, guess, settings))
}

/// Fit many clouds in parallel; outcomes come back in input order.
pub fn fit_many_cylinders(
    problems: &[(Vec<Point3>, CylinderGuess)],
    settings: &FitSettings,
) -> Result<Vec<FitOutcome<CylinderSurface>>> {
    settings.validate()?;
    Ok(problems
        .par_iter()
        .map(|(points, guess)| fit_one(points, guess, settings))
        .collect())
}

fn fit_one(points: &[Point3], guess: &CylinderGuess, settings: &FitSettings) -> FitOutcome<CylinderSurface> {
    match CylinderShape::new(guess) {
        Some(shape) => fit_shape("cylinder", &shape, points, settings),
        None => FitOutcome::failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_geom::Surface;
    use conix_math::{Point2, TAU};

    fn sample(cyl: &CylinderSurface, nu: usize, nv: usize) -> Vec<Point3> {
        let mut pts = Vec::new();
        for i in 0..nu {
            for j in 0..nv {
                let u = TAU * i as f64 / nu as f64;
                let v = -2.0 + 4.0 * j as f64 / (nv - 1) as f64;
                pts.push(cyl.evaluate(Point2::new(u, v)));
            }
        }
        pts
    }

    fn truth() -> CylinderSurface {
        CylinderSurface::with_axis(Point3::new(1.0, -2.0, 0.5), Vec3::new(0.2, 1.0, 0.3), 1.5)
    }

    fn assert_same(fit: &CylinderSurface, want: &CylinderSurface, tol: f64) {
        let (c0, a0, r0) = fit.circular_axis().unwrap();
        let (c1, a1, r1) = want.circular_axis().unwrap();
        let (a0, a1) = (a0.into_inner(), a1.into_inner());
        assert!((r0 - r1).abs() < tol);
        assert!(a0.cross(&a1).norm() < tol);
        // Axis points agree up to sliding along the axis
        assert!((c0 - c1).cross(&a1).norm() < tol);
    }

    #[test]
    fn test_exact_cloud_from_true_guess() {
        let cyl = truth();
        let pts = sample(&cyl, 24, 5);
        let guess = CylinderGuess::from_surface(&cyl).unwrap();
        let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
        let fit = out.primitive.as_ref().unwrap();
        assert_same(fit, &cyl, 1e-9);
        assert!(out.error < 1e-20);
    }

    #[test]
    fn test_recovers_from_perturbed_guess() {
        let cyl = truth();
        let pts = sample(&cyl, 24, 5);
        let guess = CylinderGuess {
            center: Point3::new(1.2, -2.1, 0.3),
            axis: Vec3::new(0.3, 1.0, 0.2),
            radius: 1.3,
        };
        let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
        assert_same(out.primitive.as_ref().unwrap(), &cyl, 1e-7);
        assert!(out.error < 1e-12);
    }

    #[test]
    fn test_noise_raises_error() {
        let cyl = truth();
        let mut pts = sample(&cyl, 24, 5);
        for (k, p) in pts.iter_mut().enumerate() {
            let wiggle = 1e-3 * ((k * 7919) % 13) as f64 / 13.0 - 5e-4;
            *p += Vec3::new(wiggle, -wiggle, 0.5 * wiggle);
        }
        let guess = CylinderGuess::from_surface(&cyl).unwrap();
        let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
        assert_same(out.primitive.as_ref().unwrap(), &cyl, 1e-2);
        assert!(out.error > 0.0 && out.error.is_finite());
    }

    #[test]
    fn test_too_few_points_fail() {
        let cyl = truth();
        let pts = sample(&cyl, 2, 2);
        let guess = CylinderGuess::from_surface(&cyl).unwrap();
        let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
        assert!(!out.is_fitted());
        assert_eq!(out.error, f64::INFINITY);
    }

    #[test]
    fn test_zero_axis_guess_fails() {
        let pts = sample(&truth(), 12, 3);
        let guess = CylinderGuess {
            center: Point3::origin(),
            axis: Vec3::zeros(),
            radius: 1.0,
        };
        let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
        assert!(out.primitive.is_none());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = FitSettings {
            rank_tolerance: -1.0,
            ..FitSettings::default()
        };
        let guess = CylinderGuess::from_surface(&truth()).unwrap();
        assert!(fit_cylinder(&[], &guess, &settings).is_err());
        assert!(fit_many_cylinders(&[], &settings).is_err());
    }

    #[test]
    fn test_many_cylinders_in_order() {
        let problems: Vec<(Vec<Point3>, CylinderGuess)> = [0.5, 1.0, 2.0, 3.5]
            .iter()
            .map(|&r| {
                let cyl = CylinderSurface::with_axis(Point3::new(r, 0.0, 0.0), Vec3::z(), r);
                let mut guess = CylinderGuess::from_surface(&cyl).unwrap();
                guess.radius *= 1.1;
                (sample(&cyl, 16, 3), guess)
            })
            .collect();
        let outs = fit_many_cylinders(&problems, &FitSettings::default()).unwrap();
        assert_eq!(outs.len(), 4);
        for (out, r) in outs.iter().zip([0.5, 1.0, 2.0, 3.5]) {
            let (_, _, fitted) = out.primitive.as_ref().unwrap().circular_axis().unwrap();
            assert!((fitted - r).abs() < 1e-8);
        }
    }
}
