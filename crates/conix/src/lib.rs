#![warn(missing_docs)]

//! Geometric intersection and fitting core.
//!
//! Provides the [`Patch`] type, a surface bounded by a parameter
//! rectangle, as the entry point for intersections, and re-exports the
//! member crates for everything else.
//!
//! # Example
//!
//! ```
//! use conix::{CylinderSurface, IntersectSettings, Patch, Point3, Vec3};
//!
//! let a = Patch::cylinder(CylinderSurface::new(1.0), (-5.0, 5.0)).unwrap();
//! let b = Patch::cylinder(
//!     CylinderSurface::with_axis(Point3::new(1.0, 0.0, 0.0), Vec3::z(), 1.0),
//!     (-5.0, 5.0),
//! )
//! .unwrap();
//! let curves = a.intersect(&b, &IntersectSettings::default()).unwrap();
//! assert_eq!(curves.len(), 2);
//! ```

pub use conix_fit;
pub use conix_geom;
pub use conix_intersect;
pub use conix_math;
pub use conix_solve;

pub use conix_fit::{
    fit_cone, fit_cylinder, fit_many_cylinders, fit_quadric, fit_torus, ConeGuess, CylinderGuess,
    FitOutcome, FitSettings, TorusGuess,
};
pub use conix_geom::{
    BSplineSurface, ConeSurface, Curve2d, Curve3d, CylinderSurface, DualSurfaceCurve, Ellipse3d,
    Line3d, Plane, SphereSurface, Surface, SurfaceKind, SurfacePoint, TorusSurface,
};
pub use conix_intersect::{
    intersect_curve_surface, intersect_curves, intersect_surfaces, project_curve, project_point,
    CurveCurveHit, CurveSurfaceHit, IntersectError, IntersectSettings,
};
pub use conix_math::{BoundingBox3, BoundingRect, Dir3, MathError, Point2, Point3, Transform, Vec3};
pub use conix_solve::SolverSettings;

/// A surface restricted to a parameter rectangle.
#[derive(Debug, Clone)]
pub struct Patch {
    surface: Box<dyn Surface>,
    rect: BoundingRect,
}

impl Patch {
    /// Wrap `surface` over `rect`.
    pub fn new(surface: impl Surface + 'static, rect: BoundingRect) -> Self {
        Self {
            surface: Box::new(surface),
            rect,
        }
    }

    /// A square of half-width `half_extent` around the plane's origin.
    pub fn plane(plane: Plane, half_extent: f64) -> conix_math::Result<Self> {
        let rect = BoundingRect::new(-half_extent, half_extent, -half_extent, half_extent)?;
        Ok(Self::new(plane, rect))
    }

    /// The full circumference between axial parameters `v_range`.
    pub fn cylinder(cyl: CylinderSurface, v_range: (f64, f64)) -> conix_math::Result<Self> {
        let rect = full_turn(&cyl, v_range)?;
        Ok(Self::new(cyl, rect))
    }

    /// The full circumference between generator distances `v_range`.
    pub fn cone(cone: ConeSurface, v_range: (f64, f64)) -> conix_math::Result<Self> {
        let rect = full_turn(&cone, v_range)?;
        Ok(Self::new(cone, rect))
    }

    /// The whole sphere.
    pub fn sphere(sphere: SphereSurface) -> conix_math::Result<Self> {
        Self::natural(sphere)
    }

    /// The whole torus.
    pub fn torus(torus: TorusSurface) -> conix_math::Result<Self> {
        Self::natural(torus)
    }

    /// The whole knot domain of a B-spline surface.
    pub fn bspline(surface: BSplineSurface) -> conix_math::Result<Self> {
        Self::natural(surface)
    }

    fn natural(surface: impl Surface + 'static) -> conix_math::Result<Self> {
        let ((u0, u1), (v0, v1)) = surface.domain();
        let rect = BoundingRect::new(u0, u1, v0, v1)?;
        Ok(Self::new(surface, rect))
    }

    /// The underlying surface.
    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    /// The parameter rectangle.
    pub fn rect(&self) -> &BoundingRect {
        &self.rect
    }

    /// World-space bounds of the patch.
    pub fn bounding_box(&self) -> BoundingBox3 {
        self.surface.bounding_box(&self.rect)
    }

    /// Intersection curves with another patch, clipped to both.
    pub fn intersect(
        &self,
        other: &Patch,
        settings: &IntersectSettings,
    ) -> conix_intersect::Result<Vec<DualSurfaceCurve>> {
        intersect_surfaces(self.surface(), &self.rect, other.surface(), &other.rect, settings)
    }

    /// Points where `curve` crosses the patch.
    pub fn intersect_curve(
        &self,
        curve: &dyn Curve3d,
        settings: &IntersectSettings,
    ) -> conix_intersect::Result<Vec<CurveSurfaceHit>> {
        intersect_curve_surface(curve, self.surface(), &self.rect, settings)
    }

    /// Parameters of the point of the patch nearest to `p`.
    pub fn project(&self, p: &Point3) -> Point2 {
        project_point(self.surface(), p, &self.rect)
    }
}

fn full_turn(s: &dyn Surface, (v0, v1): (f64, f64)) -> conix_math::Result<BoundingRect> {
    let ((u0, u1), _) = s.domain();
    BoundingRect::new(u0, u1, v0, v1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_rects() {
        let s = Patch::sphere(SphereSurface::new(2.0)).unwrap();
        assert!((s.rect().width() - conix_math::TAU).abs() < 1e-12);
        let t = Patch::torus(TorusSurface::new(3.0, 1.0)).unwrap();
        assert!((t.rect().height() - conix_math::TAU).abs() < 1e-12);
        let net = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let b = Patch::bspline(BSplineSurface::clamped_uniform(net, 2, 2, 1, 1).unwrap()).unwrap();
        assert_eq!((b.rect().width(), b.rect().height()), (1.0, 1.0));
    }

    #[test]
    fn test_degenerate_range_rejected() {
        assert!(Patch::cylinder(CylinderSurface::new(1.0), (1.0, 1.0)).is_err());
        assert!(Patch::plane(Plane::xy(), 0.0).is_err());
    }

    #[test]
    fn test_plane_cuts_sphere_patch() {
        let sphere = Patch::sphere(SphereSurface::new(1.0)).unwrap();
        let plane = Patch::plane(Plane::from_normal(Point3::new(0.0, 0.0, 0.6), Vec3::z()), 3.0).unwrap();
        let curves = plane.intersect(&sphere, &IntersectSettings::default()).unwrap();
        assert_eq!(curves.len(), 1);
        assert!((curves[0].curve.length() - conix_math::TAU * 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_line_through_cylinder_patch() {
        let cyl = Patch::cylinder(CylinderSurface::new(1.0), (-1.0, 1.0)).unwrap();
        let line = Line3d::from_points(Point3::new(-3.0, 0.0, 0.0), Point3::new(3.0, 0.0, 0.0));
        let hits = cyl.intersect_curve(&line, &IntersectSettings::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert!((hits[0].point.x + 1.0).abs() < 1e-9);
        assert!((hits[1].point.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_onto_patch() {
        let cyl = Patch::cylinder(CylinderSurface::new(1.0), (-1.0, 1.0)).unwrap();
        let uv = cyl.project(&Point3::new(0.0, 2.0, 0.5));
        let q = cyl.surface().evaluate(uv);
        assert!((q - Point3::new(0.0, 1.0, 0.5)).norm() < 1e-9);
        assert!(cyl.bounding_box().contains(&Point3::new(0.0, 0.0, 0.5)));
    }
}
