//! Intersection curves carried on two surfaces at once.

use conix_math::{Point2, Point3};

use crate::bspline::chord_length_params;
use crate::{BSplineCurve, BSplineCurve2d, Curve2d, Curve3d, Surface};

/// A point on an intersection curve with its parameters on both surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// World position.
    pub point: Point3,
    /// Parameters on surface A.
    pub uv_a: Point2,
    /// Parameters on surface B.
    pub uv_b: Point2,
}

/// A 3D curve with its images in the parameter spaces of surfaces A and B.
///
/// All three members share the curve parameter: `curve_a.evaluate(t)` are
/// the A-parameters of `curve.evaluate(t)`, and likewise for B.
#[derive(Debug, Clone)]
pub struct DualSurfaceCurve {
    /// The curve in world space.
    pub curve: Box<dyn Curve3d>,
    /// Image in the parameter space of surface A.
    pub curve_a: Box<dyn Curve2d>,
    /// Image in the parameter space of surface B.
    pub curve_b: Box<dyn Curve2d>,
}

impl DualSurfaceCurve {
    /// Bundle a 3D curve with its two parameter-space images.
    pub fn new(curve: Box<dyn Curve3d>, curve_a: Box<dyn Curve2d>, curve_b: Box<dyn Curve2d>) -> Self {
        Self {
            curve,
            curve_a,
            curve_b,
        }
    }

    /// Interpolate ordered samples. The three B-splines share chord-length
    /// parameters on `[0, 1]` computed from the world positions.
    ///
    /// Parameter samples must already be unwrapped across periodic seams.
    /// `None` for fewer than two samples or coincident consecutive samples.
    pub fn from_samples(samples: &[SurfacePoint]) -> Option<Self> {
        let coords: Vec<_> = samples.iter().map(|s| s.point.coords).collect();
        let params = chord_length_params(&coords)?;
        let points: Vec<Point3> = samples.iter().map(|s| s.point).collect();
        let uv_a: Vec<Point2> = samples.iter().map(|s| s.uv_a).collect();
        let uv_b: Vec<Point2> = samples.iter().map(|s| s.uv_b).collect();
        Some(Self {
            curve: Box::new(BSplineCurve::interpolate(&points, &params)?),
            curve_a: Box::new(BSplineCurve2d::interpolate(&uv_a, &params)?),
            curve_b: Box::new(BSplineCurve2d::interpolate(&uv_b, &params)?),
        })
    }

    /// The same curve with the roles of A and B exchanged.
    pub fn swapped(self) -> Self {
        Self {
            curve: self.curve,
            curve_a: self.curve_b,
            curve_b: self.curve_a,
        }
    }

    /// Curve parameter domain.
    pub fn domain(&self) -> (f64, f64) {
        self.curve.domain()
    }

    /// All three members evaluated at `t`.
    pub fn point_at(&self, t: f64) -> SurfacePoint {
        SurfacePoint {
            point: self.curve.evaluate(t),
            uv_a: self.curve_a.evaluate(t),
            uv_b: self.curve_b.evaluate(t),
        }
    }

    /// World position at the start of the domain.
    pub fn start_point(&self) -> Point3 {
        self.curve.evaluate(self.domain().0)
    }

    /// World position at the end of the domain.
    pub fn end_point(&self) -> Point3 {
        self.curve.evaluate(self.domain().1)
    }

    /// Whether the two ends coincide within `tol`.
    pub fn is_closed(&self, tol: f64) -> bool {
        (self.start_point() - self.end_point()).norm() <= tol
    }

    /// The piece between `t0` and `t1`, every member reparameterized to
    /// `[0, 1]`.
    pub fn trimmed(&self, t0: f64, t1: f64) -> Self {
        Self {
            curve: self.curve.trimmed(t0, t1),
            curve_a: self.curve_a.trimmed(t0, t1),
            curve_b: self.curve_b.trimmed(t0, t1),
        }
    }

    /// The curve traversed backwards.
    pub fn reversed(&self) -> Self {
        let (t0, t1) = self.domain();
        self.trimmed(t1, t0)
    }

    /// Largest distance between the world curve and the images of the
    /// parameter curves on `a` and `b`, over `samples + 1` stations.
    pub fn deviation(&self, a: &dyn Surface, b: &dyn Surface, samples: usize) -> f64 {
        let (t0, t1) = self.domain();
        let n = samples.max(1);
        (0..=n)
            .map(|i| {
                let t = t0 + (t1 - t0) * i as f64 / n as f64;
                let p = self.point_at(t);
                let da = (a.evaluate(p.uv_a) - p.point).norm();
                let db = (b.evaluate(p.uv_b) - p.point).norm();
                da.max(db)
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CylinderSurface, Plane};
    use conix_math::Vec3;

    fn circle_samples(n: usize) -> Vec<SurfacePoint> {
        let plane = Plane::from_normal(Point3::new(0.0, 0.0, 1.0), Vec3::z());
        let cyl = CylinderSurface::new(1.0);
        (0..=n)
            .map(|i| {
                let a = std::f64::consts::PI * i as f64 / n as f64;
                let p = Point3::new(a.cos(), a.sin(), 1.0);
                SurfacePoint {
                    point: p,
                    uv_a: plane.project(&p),
                    uv_b: cyl.position_of(&p),
                }
            })
            .collect()
    }

    #[test]
    fn test_from_samples_consistent() {
        let plane = Plane::from_normal(Point3::new(0.0, 0.0, 1.0), Vec3::z());
        let cyl = CylinderSurface::new(1.0);
        let dual = DualSurfaceCurve::from_samples(&circle_samples(24)).unwrap();
        assert_eq!(dual.domain(), (0.0, 1.0));
        assert!(dual.deviation(&plane, &cyl, 50) < 1e-4);
        assert!((dual.start_point() - Point3::new(1.0, 0.0, 1.0)).norm() < 1e-12);
        assert!(!dual.is_closed(1e-6));
    }

    #[test]
    fn test_swapped_and_reversed() {
        let samples = circle_samples(12);
        let dual = DualSurfaceCurve::from_samples(&samples).unwrap();
        let sw = dual.clone().swapped();
        let p = sw.point_at(0.3);
        let q = dual.point_at(0.3);
        assert_eq!(p.uv_a, q.uv_b);
        let rev = dual.reversed();
        assert!((rev.start_point() - dual.end_point()).norm() < 1e-12);
        assert!((rev.point_at(0.7).uv_b - q.uv_b).norm() < 1e-12);
    }

    #[test]
    fn test_from_samples_rejects_degenerate() {
        let s = circle_samples(4);
        assert!(DualSurfaceCurve::from_samples(&s[..1]).is_none());
        assert!(DualSurfaceCurve::from_samples(&[s[0], s[0]]).is_none());
    }
}
