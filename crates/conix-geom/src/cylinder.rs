use std::any::Any;
use std::sync::Mutex;

use conix_math::{
    adjust_periodic_value, poly, BoundingBox3, BoundingRect, Dir3, ImplicitPolynomial,
    MathError, Periodicity, Placement, Point2, Point3, Transform, Vec3, TAU,
};

use crate::{reference_direction, try_dir, Line3d, Surface, SurfaceKind};

/// A cylindrical surface: the unit cylinder `x² + y² = 1` (axis = local z)
/// carried into world space by an affine placement.
///
/// Parameterization: `P(u, v) = T · (cos u, sin u, v)`
///
/// Where `u ∈ [0, 2π)` is the angular parameter and `v` is the local height.
/// When the placement's x and y columns differ in length the cross-section
/// is an ellipse.
#[derive(Debug)]
pub struct CylinderSurface {
    placement: Placement,
    implicit: Mutex<Option<ImplicitPolynomial>>,
}

impl Clone for CylinderSurface {
    fn clone(&self) -> Self {
        Self {
            placement: self.placement.clone(),
            implicit: Mutex::new(None),
        }
    }
}

impl CylinderSurface {
    /// Create a cylinder with axis along Z, centered at origin.
    pub fn new(radius: f64) -> Self {
        Self::with_axis(Point3::origin(), Vec3::z(), radius)
    }

    /// Create a circular cylinder with a custom center and axis.
    ///
    /// Falls back to the Z axis when `axis` is zero.
    pub fn with_axis(center: Point3, axis: Vec3, radius: f64) -> Self {
        let a = try_dir(&axis).unwrap_or_else(|| Dir3::new_normalize(Vec3::z()));
        let ref_dir = reference_direction(&a);
        let y_dir = a.as_ref().cross(ref_dir.as_ref());
        let t = Transform::from_frame(
            &center,
            &(radius * ref_dir.as_ref()),
            &(radius * y_dir),
            a.as_ref(),
        );
        let placement = Placement::new(t).unwrap_or_else(|_| Placement::identity());
        Self {
            placement,
            implicit: Mutex::new(None),
        }
    }

    /// Elliptical cylinder with conjugate cross-section semi-axes `major`
    /// and `minor` (u = 0 lies along `major`). `None` if the three vectors
    /// are linearly dependent.
    pub fn elliptical(center: Point3, axis: Vec3, major: Vec3, minor: Vec3) -> Option<Self> {
        let a = try_dir(&axis)?;
        Self::from_transform(Transform::from_frame(&center, &major, &minor, a.as_ref()))
    }

    /// Rebuild a cylinder from its defining transform, recomputing the
    /// cached inverse. `None` if the transform is singular.
    pub fn from_transform(t: Transform) -> Option<Self> {
        let placement = Placement::new(t).ok()?;
        Some(Self {
            placement,
            implicit: Mutex::new(None),
        })
    }

    /// Replace the defining transform. The inverse and every derived cache
    /// are replaced in the same step.
    pub fn modify(&mut self, t: Transform) -> Result<(), MathError> {
        let placement = Placement::new(t)?;
        self.placement = placement;
        self.implicit = Mutex::new(None);
        Ok(())
    }

    /// The forward/inverse transform pair.
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Point on the axis at v = 0.
    pub fn origin(&self) -> Point3 {
        self.placement.forward().origin()
    }

    /// Axis vector (image of local z; its length is the speed in v).
    pub fn axis(&self) -> Vec3 {
        self.placement.forward().axis(2)
    }

    /// Unit axis direction.
    pub fn axis_dir(&self) -> Dir3 {
        Dir3::new_normalize(self.axis())
    }

    /// Lengths of the cross-section semi-diameters at u = 0 and u = π/2.
    pub fn radii(&self) -> (f64, f64) {
        let f = self.placement.forward();
        (f.axis(0).norm(), f.axis(1).norm())
    }

    /// Origin, unit axis, and radius when the cross-section perpendicular
    /// to the axis is a circle; `None` for elliptical or sheared cylinders.
    pub fn circular_axis(&self) -> Option<(Point3, Dir3, f64)> {
        let f = self.placement.forward();
        let (x, y, z) = (f.axis(0), f.axis(1), f.axis(2));
        let r = x.norm();
        let zn = z.norm();
        let tol = 1e-9;
        let circular = (y.norm() - r).abs() <= tol * r
            && x.dot(&y).abs() <= tol * r * r
            && x.dot(&z).abs() <= tol * r * zn
            && y.dot(&z).abs() <= tol * r * zn;
        if !circular {
            return None;
        }
        Some((f.origin(), Dir3::new_normalize(z), r))
    }

    /// Whether the cylinder is circular and right.
    pub fn is_circular(&self) -> bool {
        self.circular_axis().is_some()
    }

    /// The axis as a line, `t` equal to v.
    pub fn axis_line(&self) -> Line3d {
        Line3d {
            origin: self.origin(),
            direction: self.axis(),
        }
    }

    /// Direction of the ruling at angle `u`.
    pub fn ruling(&self, u: f64) -> Line3d {
        Line3d {
            origin: self.evaluate(Point2::new(u, 0.0)),
            direction: self.axis(),
        }
    }

    /// The rulings whose normals are perpendicular to `view_dir` (the
    /// outline seen when looking along `view_dir`), spanning `v_range`.
    ///
    /// Empty when the view direction is parallel to the axis.
    pub fn silhouette_lines(&self, view_dir: &Vec3, v_range: (f64, f64)) -> Vec<Line3d> {
        let w = self.placement.vec_to_local(view_dir);
        if w.xy().norm() <= 1e-12 * w.norm() {
            return Vec::new();
        }
        poly::solve_trig(w.x, w.y, 0.0)
            .into_iter()
            .map(|u| {
                Line3d::from_points(
                    self.evaluate(Point2::new(u, v_range.0)),
                    self.evaluate(Point2::new(u, v_range.1)),
                )
            })
            .collect()
    }

    fn local_implicit(&self) -> ImplicitPolynomial {
        let (rx, ry) = self.radii();
        let scale = 0.25 * (rx + ry);
        let x = ImplicitPolynomial::variable(0);
        let y = ImplicitPolynomial::variable(1);
        x.pow(2)
            .add(&y.pow(2))
            .add(&ImplicitPolynomial::constant(-1.0))
            .scale(scale)
    }
}

impl Surface for CylinderSurface {
    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        self.placement
            .to_world(&Point3::new(cos_u, sin_u, uv.y))
    }

    fn normal(&self, uv: Point2) -> Dir3 {
        let n = self.d_du(uv).cross(&self.d_dv(uv));
        try_dir(&n).unwrap_or_else(|| self.axis_dir())
    }

    fn d_du(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        self.placement.vec_to_world(&Vec3::new(-sin_u, cos_u, 0.0))
    }

    fn d_dv(&self, _uv: Point2) -> Vec3 {
        self.axis()
    }

    fn d2_du2(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        self.placement.vec_to_world(&Vec3::new(-cos_u, -sin_u, 0.0))
    }

    fn d2_dudv(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn d2_dv2(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, TAU), (-1e10, 1e10))
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::u_only(TAU)
    }

    fn position_of(&self, p: &Point3) -> Point2 {
        let l = self.placement.to_local(p);
        let mut u = l.y.atan2(l.x).rem_euclid(TAU);
        if u >= TAU {
            u = 0.0;
        }
        Point2::new(u, l.z)
    }

    fn implicit(&self) -> Option<ImplicitPolynomial> {
        let mut cache = match self.implicit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if cache.is_none() {
            *cache = Some(self.local_implicit().compose(self.placement.inverse()));
        }
        cache.clone()
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::Cylinder
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn transform(&self, t: &Transform) -> Option<Box<dyn Surface>> {
        let placement = self.placement.then(t).ok()?;
        Some(Box::new(CylinderSurface {
            placement,
            implicit: Mutex::new(None),
        }))
    }

    fn bounding_box(&self, rect: &BoundingRect) -> BoundingBox3 {
        // Coordinate i is o_i + X_i cos u + Y_i sin u + Z_i v: extremes lie on
        // the u borders or where -X_i sin u + Y_i cos u = 0.
        let f = self.placement.forward();
        let (x, y) = (f.axis(0), f.axis(1));
        let mut us = vec![rect.u_min(), rect.u_max()];
        for i in 0..3 {
            let base = y[i].atan2(x[i]);
            for cand in [base, base + std::f64::consts::PI] {
                let c = adjust_periodic_value(cand, rect.u_min(), rect.u_max(), TAU);
                if c >= rect.u_min() && c <= rect.u_max() {
                    us.push(c);
                }
            }
        }
        let mut bbox = BoundingBox3::empty();
        for &u in &us {
            for v in [rect.v_min(), rect.v_max()] {
                bbox.include_point(&self.evaluate(Point2::new(u, v)));
            }
        }
        bbox
    }
}
