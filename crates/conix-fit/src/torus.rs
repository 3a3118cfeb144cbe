//! Torus fitting.

use conix_geom::TorusSurface;
use conix_math::{Point3, Vec3};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::axis::AxisFrame;
use crate::{fit_shape, FitOutcome, FitSettings, Result, Shape};

/// Starting point for a torus fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TorusGuess {
    /// Center.
    pub center: Point3,
    /// Axis of revolution; need not be unit.
    pub axis: Vec3,
    /// Distance from the center to the tube center.
    pub major_radius: f64,
    /// Tube radius.
    pub minor_radius: f64,
}

impl From<&TorusSurface> for TorusGuess {
    fn from(t: &TorusSurface) -> Self {
        Self {
            center: t.center,
            axis: t.axis.into_inner(),
            major_radius: t.major_radius,
            minor_radius: t.minor_radius,
        }
    }
}

/// Parameters `[θ, φ, x, y, z, R, r]`.
struct TorusShape {
    frame: AxisFrame,
    guess: TorusGuess,
}

impl Shape for TorusShape {
    type Output = TorusSurface;

    fn num_params(&self) -> usize {
        7
    }

    fn initial(&self) -> DVector<f64> {
        let g = &self.guess;
        DVector::from_vec(vec![
            0.0,
            0.0,
            g.center.x,
            g.center.y,
            g.center.z,
            g.major_radius,
            g.minor_radius,
        ])
    }

    fn residuals(&self, x: &DVector<f64>, points: &[Point3]) -> Option<DVector<f64>> {
        let axis = self.frame.direction(x[0], x[1]);
        let center = Point3::new(x[2], x[3], x[4]);
        let (big_r, r) = (x[5], x[6]);
        Some(DVector::from_iterator(
            points.len(),
            points.iter().map(|p| {
                let d = p - center;
                let h = d.dot(&axis);
                let rho = d.cross(&axis).norm();
                (rho - big_r).hypot(h) - r
            }),
        ))
    }

    fn build(&self, x: &DVector<f64>, _points: &[Point3]) -> Option<TorusSurface> {
        let (big_r, r) = (x[5], x[6]);
        if !(big_r > 0.0 && r > 0.0 && big_r.is_finite() && r.is_finite()) {
            return None;
        }
        let axis = self.frame.direction(x[0], x[1]);
        Some(TorusSurface::with_axis(Point3::new(x[2], x[3], x[4]), axis, big_r, r))
    }
}

/// Fit a torus to `points`, starting from `guess`.
pub fn fit_torus(points: &[Point3], guess: &TorusGuess, settings: &FitSettings) -> Result<FitOutcome<TorusSurface>> {
    settings.validate()?;
    let Some(frame) = AxisFrame::new(&guess.axis) else {
        return Ok(FitOutcome::failed());
    };
    let shape = TorusShape { frame, guess: *guess };
    Ok(fit_shape("torus", &shape, points, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use conix_geom::Surface;
    use conix_math::{Point2, TAU};

    fn truth() -> TorusSurface {
        TorusSurface::with_axis(Point3::new(0.0, 0.0, 1.0), Vec3::new(0.1, 0.0, 1.0), 3.0, 1.0)
    }

    fn sample(t: &TorusSurface) -> Vec<Point3> {
        let mut pts = Vec::new();
        for i in 0..16 {
            for j in 0..8 {
                let uv = Point2::new(TAU * i as f64 / 16.0, TAU * (j as f64 + 0.25) / 8.0);
                pts.push(t.evaluate(uv));
            }
        }
        pts
    }

    #[test]
    fn test_recovers_torus() {
        let t = truth();
        let pts = sample(&t);
        let guess = TorusGuess {
            center: Point3::new(0.1, -0.1, 0.9),
            axis: Vec3::z(),
            major_radius: 2.8,
            minor_radius: 1.2,
        };
        let out = fit_torus(&pts, &guess, &FitSettings::default()).unwrap();
        let fit = out.primitive.unwrap();
        assert!((fit.center - t.center).norm() < 1e-7);
        assert!(fit.axis.as_ref().cross(t.axis.as_ref()).norm() < 1e-7);
        assert_abs_diff_eq!(fit.major_radius, 3.0, epsilon = 1e-7);
        assert_abs_diff_eq!(fit.minor_radius, 1.0, epsilon = 1e-7);
        assert!(out.error < 1e-12);
    }

    #[test]
    fn test_exact_guess_zero_error() {
        let t = truth();
        let out = fit_torus(&sample(&t), &TorusGuess::from(&t), &FitSettings::default()).unwrap();
        assert!(out.is_fitted());
        assert!(out.error < 1e-20);
    }

    #[test]
    fn test_guess_serde() {
        let g = TorusGuess::from(&truth());
        let json = serde_json::to_string(&g).unwrap();
        let back: TorusGuess = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(g.center, back.center, max_relative = 1e-15);
        assert_relative_eq!(g.axis, back.axis, max_relative = 1e-15);
        assert_relative_eq!(g.major_radius, back.major_radius, max_relative = 1e-15);
        assert_relative_eq!(g.minor_radius, back.minor_radius, max_relative = 1e-15);
    }
}
