//! 2D curves in surface parameter space.

use std::any::Any;

use conix_math::{Point2, Vec2};

use crate::{Curve2d, CurveKind};

/// A 2D line segment in parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Line2d {
    /// Starting point.
    pub origin: Point2,
    /// Direction.
    pub direction: Vec2,
}

impl Line2d {
    /// Create from two endpoints.
    pub fn from_points(start: Point2, end: Point2) -> Self {
        Self {
            origin: start,
            direction: end - start,
        }
    }
}

impl Curve2d for Line2d {
    fn evaluate(&self, t: f64) -> Point2 {
        self.origin + t * self.direction
    }

    fn tangent(&self, _t: f64) -> Vec2 {
        self.direction
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Line
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve2d> {
        Box::new(Line2d {
            origin: self.evaluate(t0),
            direction: (t1 - t0) * self.direction,
        })
    }
}

/// A 2D ellipse or arc in parameter space, parameterized like
/// [`crate::Ellipse3d`]: angle `start + t * sweep`, `t ∈ [0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ellipse2d {
    /// Center.
    pub center: Point2,
    /// Semi-diameter at angle 0.
    pub major: Vec2,
    /// Semi-diameter at angle π/2.
    pub minor: Vec2,
    /// Start angle.
    pub start: f64,
    /// Signed sweep angle.
    pub sweep: f64,
}

impl Ellipse2d {
    /// Circle or circular arc of radius `radius`.
    pub fn circle(center: Point2, radius: f64, start: f64, sweep: f64) -> Self {
        Self {
            center,
            major: Vec2::new(radius, 0.0),
            minor: Vec2::new(0.0, radius),
            start,
            sweep,
        }
    }
}

impl Curve2d for Ellipse2d {
    fn evaluate(&self, t: f64) -> Point2 {
        let (s, c) = (self.start + t * self.sweep).sin_cos();
        self.center + c * self.major + s * self.minor
    }

    fn tangent(&self, t: f64) -> Vec2 {
        let (s, c) = (self.start + t * self.sweep).sin_cos();
        self.sweep * (-s * self.major + c * self.minor)
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Ellipse
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve2d> {
        Box::new(Ellipse2d {
            start: self.start + t0 * self.sweep,
            sweep: (t1 - t0) * self.sweep,
            ..self.clone()
        })
    }
}
