use std::any::Any;

use conix_math::{BoundingBox3, Point3, Vec3};

use crate::{Curve3d, CurveKind};

/// A 3D line segment defined by origin and direction.
///
/// Parameterization: `P(t) = origin + t * direction`, `t ∈ [0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Line3d {
    /// Starting point.
    pub origin: Point3,
    /// Direction (not necessarily unit length; its magnitude is the speed).
    pub direction: Vec3,
}

impl Line3d {
    /// Create a line from two endpoints, parameterized so `t=0` gives `start` and `t=1` gives `end`.
    pub fn from_points(start: Point3, end: Point3) -> Self {
        Self {
            origin: start,
            direction: end - start,
        }
    }

    /// End point at `t = 1`.
    pub fn end(&self) -> Point3 {
        self.origin + self.direction
    }

    /// Unbounded parameter of the foot of the perpendicular from `p`.
    pub fn parameter_of(&self, p: &Point3) -> Option<f64> {
        let len2 = self.direction.norm_squared();
        if len2 <= 1e-300 {
            return None;
        }
        Some((p - self.origin).dot(&self.direction) / len2)
    }

    /// Distance from `p` to the infinite line.
    pub fn distance_to(&self, p: &Point3) -> f64 {
        match self.parameter_of(p) {
            Some(t) => (self.evaluate(t) - p).norm(),
            None => (self.origin - p).norm(),
        }
    }

    /// Same points traversed in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            origin: self.end(),
            direction: -self.direction,
        }
    }
}

impl Curve3d for Line3d {
    fn evaluate(&self, t: f64) -> Point3 {
        self.origin + t * self.direction
    }

    fn tangent(&self, _t: f64) -> Vec3 {
        self.direction
    }

    fn second_derivative(&self, _t: f64) -> Vec3 {
        Vec3::zeros()
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Line
    }

    fn clone_box(&self) -> Box<dyn Curve3d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn suggested_segments(&self) -> usize {
        1
    }

    fn position_of(&self, p: &Point3) -> f64 {
        self.parameter_of(p).unwrap_or(0.0).clamp(0.0, 1.0)
    }

    fn length(&self) -> f64 {
        self.direction.norm()
    }

    fn approximate(&self, _chord_tolerance: f64) -> Vec<Point3> {
        vec![self.origin, self.end()]
    }

    fn bounding_box(&self) -> BoundingBox3 {
        BoundingBox3::from_points([self.origin, self.end()].iter())
    }

    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve3d> {
        Box::new(Line3d {
            origin: self.evaluate(t0),
            direction: (t1 - t0) * self.direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_line3d() {
        let line = Line3d::from_points(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        let mid = line.evaluate(0.5);
        assert_abs_diff_eq!(mid.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(line.length(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_line_position_of_clamps() {
        let line = Line3d::from_points(Point3::origin(), Point3::new(2.0, 0.0, 0.0));
        assert!((line.position_of(&Point3::new(1.0, 5.0, 0.0)) - 0.5).abs() < 1e-12);
        assert_eq!(line.position_of(&Point3::new(-3.0, 0.0, 0.0)), 0.0);
        assert!((line.distance_to(&Point3::new(1.0, 3.0, 4.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_line_trimmed_exact() {
        let line = Line3d::from_points(Point3::origin(), Point3::new(4.0, 4.0, 0.0));
        let piece = line.trimmed(0.25, 0.75);
        assert_eq!(piece.curve_type(), CurveKind::Line);
        assert!((piece.evaluate(0.0) - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((piece.evaluate(1.0) - Point3::new(3.0, 3.0, 0.0)).norm() < 1e-12);
    }
}
