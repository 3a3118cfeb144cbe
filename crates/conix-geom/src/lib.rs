#![warn(missing_docs)]

//! Analytic surface and curve types for the conix geometric core.
//!
//! Provides trait-based abstractions for parametric surfaces and curves,
//! with concrete implementations for the analytic types the intersection
//! engine works with: planes, cylinders (circular or elliptical), cones,
//! spheres, tori, lines, ellipses and their arcs, and interpolating
//! B-splines. Free-form geometry is a tensor-product [`BSplineSurface`].
//! Every type evaluates position and derivatives in closed form and maps
//! world points back to parameters with `position_of`.
//!
//! Surface/surface intersection results are [`DualSurfaceCurve`]s: a 3D
//! curve plus its image in the parameter space of each parent surface.

use std::any::Any;
use std::fmt::Debug;

use conix_math::{
    BoundingBox3, BoundingRect, Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform,
    Vec2, Vec3,
};

mod bspline;
mod bspline_surface;
mod cone;
mod curve2d;
mod cylinder;
mod dual;
mod ellipse;
mod line;
mod plane;
pub mod quadrature;
pub mod record;
mod sphere;
mod torus;
mod trimmed;

pub use bspline::{BSplineCurve, BSplineCurve2d};
pub use bspline_surface::BSplineSurface;
pub use cone::ConeSurface;
pub use curve2d::{Ellipse2d, Line2d};
pub use cylinder::CylinderSurface;
pub use dual::{DualSurfaceCurve, SurfacePoint};
pub use ellipse::{Ellipse3d, ProjectionData};
pub use line::Line3d;
pub use plane::Plane;
pub use record::{CurveRecord, SurfaceRecord};
pub use sphere::SphereSurface;
pub use torus::TorusSurface;
pub use trimmed::{Trimmed2d, Trimmed3d};

// =============================================================================
// Surface trait
// =============================================================================

/// The kind of a surface (for match-based dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Infinite plane.
    Plane,
    /// Cylindrical surface, circular or elliptical cross-section.
    Cylinder,
    /// Conical surface.
    Cone,
    /// Spherical surface.
    Sphere,
    /// Toroidal surface.
    Torus,
    /// Tensor-product B-spline surface; has no implicit form.
    BSpline,
}

/// A parametric surface in 3D space.
pub trait Surface: Send + Sync + Debug {
    /// Evaluate the surface at parameter `(u, v)` to get a 3D point.
    fn evaluate(&self, uv: Point2) -> Point3;

    /// Surface normal at parameter `(u, v)`.
    fn normal(&self, uv: Point2) -> Dir3;

    /// Partial derivative with respect to u at `(u, v)`.
    fn d_du(&self, uv: Point2) -> Vec3;

    /// Partial derivative with respect to v at `(u, v)`.
    fn d_dv(&self, uv: Point2) -> Vec3;

    /// Second partial derivative with respect to u.
    fn d2_du2(&self, uv: Point2) -> Vec3;

    /// Mixed second partial derivative.
    fn d2_dudv(&self, uv: Point2) -> Vec3;

    /// Second partial derivative with respect to v.
    fn d2_dv2(&self, uv: Point2) -> Vec3;

    /// Parameter domain as `((u_min, u_max), (v_min, v_max))`.
    fn domain(&self) -> ((f64, f64), (f64, f64));

    /// Period of each parameter axis.
    fn periodicity(&self) -> Periodicity;

    /// Parameters of the surface point closest to `p` (exact for points on
    /// the surface). Angular parameters are returned in `[0, 2π)`; callers
    /// comparing against a domain use [`conix_math::adjust_periodic`].
    fn position_of(&self, p: &Point3) -> Point2;

    /// Implicit equation `F(x, y, z) = 0`, normalized so `|F|` approximates
    /// distance near the surface.
    fn implicit(&self) -> Option<ImplicitPolynomial>;

    /// The kind of this surface.
    fn surface_type(&self) -> SurfaceKind;

    /// Clone this surface into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Surface>;

    /// Downcast to a concrete type via `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Apply an affine transform to this surface, returning a new surface.
    ///
    /// `None` when the transform is singular or does not preserve the
    /// surface type.
    fn transform(&self, t: &Transform) -> Option<Box<dyn Surface>>;

    /// Conservative bounding box of the patch over `rect`.
    fn bounding_box(&self, rect: &BoundingRect) -> BoundingBox3 {
        sampled_surface_box(self, rect)
    }
}

impl Clone for Box<dyn Surface> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Grid-sampled box padded by the largest deviation of cell centers from
/// the bilinear interpolation of their corners.
pub(crate) fn sampled_surface_box<S: Surface + ?Sized>(s: &S, rect: &BoundingRect) -> BoundingBox3 {
    const N: usize = 16;
    let mut grid = Vec::with_capacity((N + 1) * (N + 1));
    for i in 0..=N {
        for j in 0..=N {
            grid.push(s.evaluate(rect.lerp(i as f64 / N as f64, j as f64 / N as f64)));
        }
    }
    let mut bbox = BoundingBox3::from_points(grid.iter());
    let at = |i: usize, j: usize| grid[i * (N + 1) + j];
    let mut pad: f64 = 0.0;
    for i in 0..N {
        for j in 0..N {
            let corners = at(i, j).coords + at(i + 1, j).coords + at(i, j + 1).coords
                + at(i + 1, j + 1).coords;
            let mid = s.evaluate(rect.lerp(
                (i as f64 + 0.5) / N as f64,
                (j as f64 + 0.5) / N as f64,
            ));
            pad = pad.max((mid.coords - corners / 4.0).norm());
        }
    }
    bbox.expand(2.0 * pad + 1e-12);
    bbox
}

// =============================================================================
// Curve traits
// =============================================================================

/// The kind of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveKind {
    /// Straight line.
    Line,
    /// Ellipse, circle, or an arc of one.
    Ellipse,
    /// Interpolating B-spline.
    BSpline,
    /// Reparameterized piece of another curve.
    Trimmed,
}

/// A parametric curve in 3D space.
pub trait Curve3d: Send + Sync + Debug {
    /// Evaluate the curve at parameter `t` to get a 3D point.
    fn evaluate(&self, t: f64) -> Point3;

    /// First derivative at parameter `t`.
    fn tangent(&self, t: f64) -> Vec3;

    /// Second derivative at parameter `t`.
    fn second_derivative(&self, t: f64) -> Vec3;

    /// Parameter domain `(t_min, t_max)`.
    fn domain(&self) -> (f64, f64);

    /// The kind of this curve.
    fn curve_type(&self) -> CurveKind;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Curve3d>;

    /// Downcast to a concrete type via `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Suggested number of segments for smooth tessellation.
    ///
    /// Override this for curves with high curvature.
    /// Default returns 32.
    fn suggested_segments(&self) -> usize {
        32
    }

    /// Parameter of the curve point closest to `p`, within the domain.
    fn position_of(&self, p: &Point3) -> f64 {
        quadrature::closest_parameter(self, p)
    }

    /// Arc length over the whole domain.
    fn length(&self) -> f64 {
        let (t0, t1) = self.domain();
        quadrature::integrate(|t| self.tangent(t).norm(), t0, t1, self.suggested_segments())
    }

    /// Polyline approximation whose chords deviate from the curve by at most
    /// `chord_tolerance`. Includes both end points.
    fn approximate(&self, chord_tolerance: f64) -> Vec<Point3> {
        quadrature::adaptive_polyline(self, chord_tolerance)
    }

    /// Bounding box of the curve.
    fn bounding_box(&self) -> BoundingBox3 {
        let first = quadrature::adaptive_polyline(self, f64::INFINITY);
        let diag = BoundingBox3::from_points(first.iter()).diagonal();
        let tol = (diag * 1e-4).max(1e-9);
        let mut bbox = BoundingBox3::from_points(self.approximate(tol).iter());
        bbox.expand(tol);
        bbox
    }

    /// The piece between `t0` and `t1`, reparameterized to `[0, 1]`.
    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve3d> {
        Box::new(Trimmed3d::new(self.clone_box(), t0, t1))
    }
}

impl Clone for Box<dyn Curve3d> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A 2D parametric curve (an intersection curve's image in a surface's
/// parameter space).
pub trait Curve2d: Send + Sync + Debug {
    /// Evaluate the curve at parameter `t` to get a 2D point.
    fn evaluate(&self, t: f64) -> Point2;

    /// Tangent vector at parameter `t`.
    fn tangent(&self, t: f64) -> Vec2;

    /// Parameter domain `(t_min, t_max)`.
    fn domain(&self) -> (f64, f64);

    /// The kind of this curve.
    fn curve_type(&self) -> CurveKind;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Curve2d>;

    /// Downcast to a concrete type via `Any`.
    fn as_any(&self) -> &dyn Any;

    /// The piece between `t0` and `t1`, reparameterized to `[0, 1]`.
    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve2d> {
        Box::new(Trimmed2d::new(self.clone_box(), t0, t1))
    }
}

impl Clone for Box<dyn Curve2d> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Unit vector perpendicular to `axis`, used as the u = 0 reference.
pub(crate) fn reference_direction(axis: &Dir3) -> Dir3 {
    let a = axis.as_ref();
    let arbitrary = if a.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    Dir3::new_normalize(arbitrary - arbitrary.dot(a) * a)
}

/// Normalize a nonzero vector, `None` for zero or non-finite input.
pub(crate) fn try_dir(v: &Vec3) -> Option<Dir3> {
    let n = v.norm();
    if n.is_finite() && n > 1e-300 {
        Some(Dir3::new_unchecked(v / n))
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Check first and second partials against central differences.
    pub fn check_partials(s: &dyn Surface, uv: Point2) {
        let h = 1e-5;
        let at = |du: f64, dv: f64| s.evaluate(Point2::new(uv.x + du, uv.y + dv));
        let fd_u = (at(h, 0.0) - at(-h, 0.0)) / (2.0 * h);
        let fd_v = (at(0.0, h) - at(0.0, -h)) / (2.0 * h);
        assert!((s.d_du(uv) - fd_u).norm() < 1e-6, "d_du mismatch");
        assert!((s.d_dv(uv) - fd_v).norm() < 1e-6, "d_dv mismatch");

        let fd_uu = (s.d_du(Point2::new(uv.x + h, uv.y)) - s.d_du(Point2::new(uv.x - h, uv.y)))
            / (2.0 * h);
        let fd_uv = (s.d_du(Point2::new(uv.x, uv.y + h)) - s.d_du(Point2::new(uv.x, uv.y - h)))
            / (2.0 * h);
        let fd_vv = (s.d_dv(Point2::new(uv.x, uv.y + h)) - s.d_dv(Point2::new(uv.x, uv.y - h)))
            / (2.0 * h);
        assert!((s.d2_du2(uv) - fd_uu).norm() < 1e-6, "d2_du2 mismatch");
        assert!((s.d2_dudv(uv) - fd_uv).norm() < 1e-6, "d2_dudv mismatch");
        assert!((s.d2_dv2(uv) - fd_vv).norm() < 1e-6, "d2_dv2 mismatch");
    }

    /// Check that the normal is perpendicular to both partials.
    pub fn check_normal(s: &dyn Surface, uv: Point2) {
        let n = s.normal(uv);
        assert!(n.dot(&s.d_du(uv)).abs() < 1e-9);
        assert!(n.dot(&s.d_dv(uv)).abs() < 1e-9);
    }

    /// Check that the implicit equation vanishes on the surface and that
    /// `|F|` tracks distance along the normal.
    pub fn check_implicit(s: &dyn Surface, uv: Point2) {
        let f = s.implicit().expect("surface has an implicit equation");
        let p = s.evaluate(uv);
        assert!(f.evaluate(&p).abs() < 1e-9, "F = {}", f.evaluate(&p));
        let off = p + 1e-3 * s.normal(uv).into_inner();
        let d = f.evaluate(&off).abs();
        assert!(d > 0.5e-3 && d < 2e-3, "|F| = {d} at distance 1e-3");
    }
}
