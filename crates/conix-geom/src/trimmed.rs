use std::any::Any;

use conix_math::{Point2, Point3, Vec2, Vec3};

use crate::{Curve2d, Curve3d, CurveKind};

/// The piece of a 3D curve between two base parameters, reparameterized to
/// `[0, 1]`. `t1 < t0` gives the reversed piece.
#[derive(Debug, Clone)]
pub struct Trimmed3d {
    base: Box<dyn Curve3d>,
    t0: f64,
    t1: f64,
}

impl Trimmed3d {
    /// Wrap `base` between `t0` and `t1`. Nested trims collapse onto the
    /// innermost base curve.
    pub fn new(base: Box<dyn Curve3d>, t0: f64, t1: f64) -> Self {
        if let Some(inner) = base.as_any().downcast_ref::<Trimmed3d>() {
            let (a, b) = (inner.map(t0), inner.map(t1));
            return Self {
                base: inner.base.clone(),
                t0: a,
                t1: b,
            };
        }
        Self { base, t0, t1 }
    }

    /// The underlying curve.
    pub fn base(&self) -> &dyn Curve3d {
        self.base.as_ref()
    }

    /// Base parameters of the two ends.
    pub fn bounds(&self) -> (f64, f64) {
        (self.t0, self.t1)
    }

    fn map(&self, t: f64) -> f64 {
        self.t0 + t * (self.t1 - self.t0)
    }
}

impl Curve3d for Trimmed3d {
    fn evaluate(&self, t: f64) -> Point3 {
        self.base.evaluate(self.map(t))
    }

    fn tangent(&self, t: f64) -> Vec3 {
        (self.t1 - self.t0) * self.base.tangent(self.map(t))
    }

    fn second_derivative(&self, t: f64) -> Vec3 {
        let s = self.t1 - self.t0;
        s * s * self.base.second_derivative(self.map(t))
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Trimmed
    }

    fn clone_box(&self) -> Box<dyn Curve3d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn suggested_segments(&self) -> usize {
        self.base.suggested_segments()
    }
}

/// The piece of a 2D curve between two base parameters, reparameterized to
/// `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Trimmed2d {
    base: Box<dyn Curve2d>,
    t0: f64,
    t1: f64,
}

impl Trimmed2d {
    /// Wrap `base` between `t0` and `t1`.
    pub fn new(base: Box<dyn Curve2d>, t0: f64, t1: f64) -> Self {
        if let Some(inner) = base.as_any().downcast_ref::<Trimmed2d>() {
            let (a, b) = (inner.map(t0), inner.map(t1));
            return Self {
                base: inner.base.clone(),
                t0: a,
                t1: b,
            };
        }
        Self { base, t0, t1 }
    }

    /// The underlying curve.
    pub fn base(&self) -> &dyn Curve2d {
        self.base.as_ref()
    }

    fn map(&self, t: f64) -> f64 {
        self.t0 + t * (self.t1 - self.t0)
    }
}

impl Curve2d for Trimmed2d {
    fn evaluate(&self, t: f64) -> Point2 {
        self.base.evaluate(self.map(t))
    }

    fn tangent(&self, t: f64) -> Vec2 {
        (self.t1 - self.t0) * self.base.tangent(self.map(t))
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Trimmed
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BSplineCurve;

    fn wave() -> BSplineCurve {
        let pts: Vec<Point3> = (0..8)
            .map(|i| Point3::new(i as f64, (i as f64 * 0.7).sin(), 0.0))
            .collect();
        BSplineCurve::interpolate_chord(&pts).unwrap()
    }

    #[test]
    fn test_trimmed_endpoints_and_derivatives() {
        let base = wave();
        let piece = base.trimmed(0.2, 0.6);
        assert_eq!(piece.curve_type(), CurveKind::Trimmed);
        assert!((piece.evaluate(0.0) - base.evaluate(0.2)).norm() < 1e-12);
        assert!((piece.evaluate(1.0) - base.evaluate(0.6)).norm() < 1e-12);
        assert!((piece.tangent(0.5) - 0.4 * base.tangent(0.4)).norm() < 1e-12);
        assert!((piece.second_derivative(0.5) - 0.16 * base.second_derivative(0.4)).norm() < 1e-10);
    }

    #[test]
    fn test_nested_trim_collapses() {
        let base = wave();
        let outer = Trimmed3d::new(Box::new(base.clone()), 0.2, 0.6);
        let inner = outer.trimmed(0.5, 1.0);
        let t = inner.as_any().downcast_ref::<Trimmed3d>().unwrap();
        assert_eq!(t.base().curve_type(), CurveKind::BSpline);
        let (a, b) = t.bounds();
        assert!((a - 0.4).abs() < 1e-12 && (b - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_trim() {
        let base = wave();
        let piece = base.trimmed(0.8, 0.1);
        assert!((piece.evaluate(0.0) - base.evaluate(0.8)).norm() < 1e-12);
        assert!((piece.length() - base.trimmed(0.1, 0.8).length()).abs() < 1e-8);
    }
}
