use std::any::Any;

use conix_math::{
    BoundingBox3, BoundingRect, Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform,
    Vec3,
};

use crate::{try_dir, Surface, SurfaceKind};

/// An infinite plane defined by an origin point and a coordinate frame.
///
/// Parameterization: `P(u, v) = origin + u * x_dir + v * y_dir`
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Origin point on the plane.
    pub origin: Point3,
    /// Unit vector along the u direction.
    pub x_dir: Dir3,
    /// Unit vector along the v direction.
    pub y_dir: Dir3,
    /// Unit normal (x_dir × y_dir).
    pub normal_dir: Dir3,
}

impl Plane {
    /// Create a plane from origin and two direction vectors.
    ///
    /// The vectors do not need to be normalized or orthogonal; `y_dir` is
    /// re-orthogonalized against `x_dir`.
    pub fn new(origin: Point3, x_dir: Vec3, y_dir: Vec3) -> Self {
        let x = Dir3::new_normalize(x_dir);
        let y = Dir3::new_normalize(y_dir - y_dir.dot(x.as_ref()) * x.as_ref());
        let n = Dir3::new_normalize(x.as_ref().cross(y.as_ref()));
        Self {
            origin,
            x_dir: x,
            y_dir: y,
            normal_dir: n,
        }
    }

    /// Create a plane from origin and normal. X/Y directions are chosen arbitrarily.
    pub fn from_normal(origin: Point3, normal: Vec3) -> Self {
        let n = Dir3::new_normalize(normal);
        // Pick an arbitrary perpendicular vector
        let arbitrary = if n.as_ref().x.abs() < 0.9 {
            Vec3::x()
        } else {
            Vec3::y()
        };
        let x = Dir3::new_normalize(arbitrary.cross(n.as_ref()));
        let y = Dir3::new_normalize(n.as_ref().cross(x.as_ref()));
        Self {
            origin,
            x_dir: x,
            y_dir: y,
            normal_dir: n,
        }
    }

    /// Plane through three points; `None` if they are collinear or coincident.
    pub fn through_points(a: Point3, b: Point3, c: Point3) -> Option<Self> {
        let u = b - a;
        let n = u.cross(&(c - a));
        if n.norm() <= 1e-12 * (u.norm_squared() + (c - a).norm_squared()) {
            return None;
        }
        let x = try_dir(&u)?;
        let nd = try_dir(&n)?;
        Some(Self {
            origin: a,
            x_dir: x,
            y_dir: Dir3::new_normalize(nd.as_ref().cross(x.as_ref())),
            normal_dir: nd,
        })
    }

    /// XY plane at the origin.
    pub fn xy() -> Self {
        Self::new(Point3::origin(), Vec3::x(), Vec3::y())
    }

    /// XZ plane at the origin.
    pub fn xz() -> Self {
        Self::new(Point3::origin(), Vec3::x(), Vec3::z())
    }

    /// YZ plane at the origin.
    pub fn yz() -> Self {
        Self::new(Point3::origin(), Vec3::y(), Vec3::z())
    }

    /// Project a 3D point onto this plane's (u, v) parameter space.
    pub fn project(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(self.x_dir.as_ref()), d.dot(self.y_dir.as_ref()))
    }

    /// Project a vector onto this plane's (u, v) axes.
    pub fn project_vec(&self, v: &Vec3) -> conix_math::Vec2 {
        conix_math::Vec2::new(v.dot(self.x_dir.as_ref()), v.dot(self.y_dir.as_ref()))
    }

    /// Signed distance from a point to this plane.
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(self.normal_dir.as_ref())
    }

    /// Whether two planes describe the same frame within `tol`.
    pub fn same_frame(&self, other: &Plane, tol: f64) -> bool {
        (self.origin - other.origin).norm() <= tol
            && (self.x_dir.as_ref() - other.x_dir.as_ref()).norm() <= tol
            && (self.y_dir.as_ref() - other.y_dir.as_ref()).norm() <= tol
    }
}

impl Surface for Plane {
    fn evaluate(&self, uv: Point2) -> Point3 {
        self.origin + uv.x * self.x_dir.as_ref() + uv.y * self.y_dir.as_ref()
    }

    fn normal(&self, _uv: Point2) -> Dir3 {
        self.normal_dir
    }

    fn d_du(&self, _uv: Point2) -> Vec3 {
        *self.x_dir.as_ref()
    }

    fn d_dv(&self, _uv: Point2) -> Vec3 {
        *self.y_dir.as_ref()
    }

    fn d2_du2(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn d2_dudv(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn d2_dv2(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((-1e10, 1e10), (-1e10, 1e10))
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::NONE
    }

    fn position_of(&self, p: &Point3) -> Point2 {
        self.project(p)
    }

    fn implicit(&self) -> Option<ImplicitPolynomial> {
        let n = self.normal_dir.as_ref();
        Some(ImplicitPolynomial::linear(
            n.x,
            n.y,
            n.z,
            -n.dot(&self.origin.coords),
        ))
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::Plane
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn transform(&self, t: &Transform) -> Option<Box<dyn Surface>> {
        if !t.is_invertible() {
            return None;
        }
        let new_origin = t.apply_point(&self.origin);
        let new_x = t.apply_vec(self.x_dir.as_ref());
        let new_y = t.apply_vec(self.y_dir.as_ref());
        Some(Box::new(Plane::new(new_origin, new_x, new_y)))
    }

    fn bounding_box(&self, rect: &BoundingRect) -> BoundingBox3 {
        let corners = [
            self.evaluate(Point2::new(rect.u_min(), rect.v_min())),
            self.evaluate(Point2::new(rect.u_max(), rect.v_min())),
            self.evaluate(Point2::new(rect.u_min(), rect.v_max())),
            self.evaluate(Point2::new(rect.u_max(), rect.v_max())),
        ];
        BoundingBox3::from_points(corners.iter())
    }
}
