#![warn(missing_docs)]

//! Intersection algorithms for the conix geometric core.
//!
//! - [`intersect_curves`]: curve/curve hits with parameters on both curves.
//! - [`intersect_curve_surface`]: curve/surface hits with the curve
//!   parameter and the surface (u, v).
//! - [`intersect_surfaces`]: surface/surface intersection curves as
//!   [`DualSurfaceCurve`](conix_geom::DualSurfaceCurve)s, carrying the 3D
//!   curve and its image on each surface.
//! - [`project_point`] / [`project_curve`]: map world geometry into a
//!   surface's parameter rectangle.
//!
//! Closed forms are used wherever the operand pair has one; everything
//! else goes through seeded numerical solves. A seed whose solve fails
//! contributes nothing. Only malformed input (degenerate rectangles,
//! invalid settings) is reported as an [`IntersectError`].

mod curve_curve;
mod curve_surface;
mod error;
mod project;
mod settings;
mod ssi;

pub use curve_curve::{intersect_curves, CurveCurveHit};
pub use curve_surface::{intersect_curve_surface, CurveSurfaceHit};
pub use error::{IntersectError, Result};
pub use project::{project_curve, project_point};
pub use settings::IntersectSettings;
pub use ssi::intersect_surfaces;

use conix_geom::Surface;
use conix_math::{ImplicitPolynomial, Point3, Vec3};

/// Relative slack when testing a parameter against its interval.
const DOMAIN_MARGIN: f64 = 1e-6;

/// `t` clamped into `(lo, hi)` if it lies within the relative margin,
/// `None` otherwise.
pub(crate) fn in_interval(t: f64, (lo, hi): (f64, f64)) -> Option<f64> {
    let (a, b) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let margin = DOMAIN_MARGIN * (b - a).max(1.0);
    (t.is_finite() && t >= a - margin && t <= b + margin).then(|| t.clamp(a, b))
}

/// Downcast a surface to a concrete type.
pub(crate) fn downcast<T: 'static>(s: &dyn Surface) -> Option<&T> {
    s.as_any().downcast_ref::<T>()
}

/// An implicit polynomial with its gradient polynomials precomputed.
#[derive(Debug, Clone)]
pub(crate) struct ImplicitField {
    f: ImplicitPolynomial,
    grad: [ImplicitPolynomial; 3],
}

impl ImplicitField {
    pub(crate) fn of(s: &dyn Surface) -> Option<Self> {
        let f = s.implicit()?;
        let grad = [0, 1, 2].map(|i| f.derivative(i));
        Some(Self { f, grad })
    }

    pub(crate) fn value(&self, p: &Point3) -> f64 {
        self.f.evaluate(p)
    }

    pub(crate) fn gradient(&self, p: &Point3) -> Vec3 {
        Vec3::new(
            self.grad[0].evaluate(p),
            self.grad[1].evaluate(p),
            self.grad[2].evaluate(p),
        )
    }

    pub(crate) fn polynomial(&self) -> &ImplicitPolynomial {
        &self.f
    }
}

/// Drop points within `tol` of an earlier kept point.
pub(crate) fn dedup_by_point<T>(items: Vec<T>, tol: f64, point: impl Fn(&T) -> Point3) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let p = point(&item);
        if out.iter().all(|k| (point(k) - p).norm() > tol) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_geom::SphereSurface;

    #[test]
    fn test_in_interval_margin() {
        assert_eq!(in_interval(0.5, (0.0, 1.0)), Some(0.5));
        assert_eq!(in_interval(1.0 + 1e-8, (0.0, 1.0)), Some(1.0));
        assert_eq!(in_interval(-1e-8, (0.0, 1.0)), Some(0.0));
        assert_eq!(in_interval(1.01, (0.0, 1.0)), None);
        assert_eq!(in_interval(f64::NAN, (0.0, 1.0)), None);
    }

    #[test]
    fn test_implicit_field_matches_polynomial() {
        let s = SphereSurface::with_center(Point3::new(1.0, 0.0, 0.0), 2.0);
        let field = ImplicitField::of(&s).unwrap();
        let p = Point3::new(0.3, -0.7, 1.1);
        let poly = s.implicit().unwrap();
        assert!((field.value(&p) - poly.evaluate(&p)).abs() < 1e-14);
        assert!((field.gradient(&p) - poly.gradient(&p)).norm() < 1e-14);
    }

    #[test]
    fn test_dedup_by_point() {
        let pts = vec![Point3::origin(), Point3::new(1e-9, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let kept = dedup_by_point(pts, 1e-6, |p| *p);
        assert_eq!(kept.len(), 2);
    }
}
