use std::any::Any;

use conix_math::{Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform, Vec3, TAU};

use crate::{reference_direction, try_dir, Surface, SurfaceKind};

/// A toroidal surface defined by center, axis, and two radii.
///
/// Parameterization:
/// ```text
/// P(u, v) = center + (R + r·cos(v))·(cos(u)·ref_dir + sin(u)·y_dir) + r·sin(v)·axis
/// ```
///
/// Where:
/// - `R` = major radius (center to tube center)
/// - `r` = minor radius (tube radius)
/// - `u ∈ [0, 2π)` is the toroidal angle (around the main axis)
/// - `v ∈ [0, 2π)` is the poloidal angle (around the tube)
#[derive(Debug, Clone, PartialEq)]
pub struct TorusSurface {
    /// Center of the torus.
    pub center: Point3,
    /// Unit direction of the torus axis (perpendicular to the plane of the ring).
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Major radius: distance from center to tube center.
    pub major_radius: f64,
    /// Minor radius: radius of the tube.
    pub minor_radius: f64,
}

impl TorusSurface {
    /// Create a torus centered at origin with axis along Z.
    pub fn new(major_radius: f64, minor_radius: f64) -> Self {
        Self {
            center: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            major_radius,
            minor_radius,
        }
    }

    /// Create a torus with a custom center and axis.
    ///
    /// Falls back to the Z axis when `axis` is zero.
    pub fn with_axis(center: Point3, axis: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        let a = try_dir(&axis).unwrap_or_else(|| Dir3::new_normalize(Vec3::z()));
        Self {
            center,
            axis: a,
            ref_dir: reference_direction(&a),
            major_radius,
            minor_radius,
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }

    fn tube_center_dir(&self, u: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir()
    }

    fn d_tube_center_dir(&self, u: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        -sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir()
    }

    /// World-to-local rigid transform (center at origin, axis = z).
    pub fn local_frame(&self) -> Transform {
        // Orthonormal frame: the inverse is the transpose
        let (x, y, z) = (*self.ref_dir.as_ref(), self.y_dir(), *self.axis.as_ref());
        let c = self.center.coords;
        let mut m = nalgebra::Matrix4::identity();
        for (row, v) in [x, y, z].iter().enumerate() {
            m[(row, 0)] = v.x;
            m[(row, 1)] = v.y;
            m[(row, 2)] = v.z;
            m[(row, 3)] = -v.dot(&c);
        }
        Transform { matrix: m }
    }

    /// The meridian circle at toroidal angle `u` as center, in-plane radial
    /// direction, and radius.
    pub fn meridian(&self, u: f64) -> (Point3, Vec3, f64) {
        let d = self.tube_center_dir(u);
        (self.center + self.major_radius * d, d, self.minor_radius)
    }
}

impl Surface for TorusSurface {
    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_v, cos_v) = uv.y.sin_cos();

        // Point on the tube centerline (at angle u around the main axis)
        let tube_center_dir = self.tube_center_dir(uv.x);

        self.center
            + (self.major_radius + self.minor_radius * cos_v) * tube_center_dir
            + self.minor_radius * sin_v * self.axis.as_ref()
    }

    fn normal(&self, uv: Point2) -> Dir3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        // Normal points outward from the tube center
        let n = cos_v * self.tube_center_dir(uv.x) + sin_v * self.axis.as_ref();
        Dir3::new_normalize(n)
    }

    fn d_du(&self, uv: Point2) -> Vec3 {
        let cos_v = uv.y.cos();
        (self.major_radius + self.minor_radius * cos_v) * self.d_tube_center_dir(uv.x)
    }

    fn d_dv(&self, uv: Point2) -> Vec3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        // d/dv: -r·sin(v)·tube_center_dir + r·cos(v)·axis
        -self.minor_radius * sin_v * self.tube_center_dir(uv.x)
            + self.minor_radius * cos_v * self.axis.as_ref()
    }

    fn d2_du2(&self, uv: Point2) -> Vec3 {
        -(self.major_radius + self.minor_radius * uv.y.cos()) * self.tube_center_dir(uv.x)
    }

    fn d2_dudv(&self, uv: Point2) -> Vec3 {
        -self.minor_radius * uv.y.sin() * self.d_tube_center_dir(uv.x)
    }

    fn d2_dv2(&self, uv: Point2) -> Vec3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        -self.minor_radius * (cos_v * self.tube_center_dir(uv.x) + sin_v * self.axis.as_ref())
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, TAU), (0.0, TAU))
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::both(TAU, TAU)
    }

    fn position_of(&self, p: &Point3) -> Point2 {
        let l = self.local_frame().apply_point(p);
        let norm = |a: f64| {
            let a = a.rem_euclid(TAU);
            if a >= TAU {
                0.0
            } else {
                a
            }
        };
        let u = norm(l.y.atan2(l.x));
        let rho = l.x.hypot(l.y);
        let v = norm(l.z.atan2(rho - self.major_radius));
        Point2::new(u, v)
    }

    /// `((|q|² + R² - r²)² - 4R²(qx² + qy²)) / 8R²r` in the local frame.
    fn implicit(&self) -> Option<ImplicitPolynomial> {
        let (big, small) = (self.major_radius, self.minor_radius);
        if big <= 0.0 || small <= 0.0 {
            return None;
        }
        let x = ImplicitPolynomial::variable(0);
        let y = ImplicitPolynomial::variable(1);
        let z = ImplicitPolynomial::variable(2);
        let planar = x.pow(2).add(&y.pow(2));
        let s = planar
            .add(&z.pow(2))
            .add(&ImplicitPolynomial::constant(big * big - small * small));
        let local = s
            .pow(2)
            .add(&planar.scale(-4.0 * big * big))
            .scale(1.0 / (8.0 * big * big * small));
        Some(local.compose(&self.local_frame()))
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::Torus
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
        let new_center = t.apply_point(&self.center);
        let new_axis = try_dir(&t.apply_vec(self.axis.as_ref()))?;
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        // Scale factor affects radii; use the length of the transformed ref_dir
        let scale = new_ref.norm();
        let new_ref = try_dir(&(new_ref - new_ref.dot(new_axis.as_ref()) * new_axis.as_ref()))?;
        Some(Box::new(TorusSurface {
            center: new_center,
            axis: new_axis,
            ref_dir: new_ref,
            major_radius: self.major_radius * scale,
            minor_radius: self.minor_radius * scale,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{check_implicit, check_normal, check_partials};
    use std::f64::consts::PI;

    #[test]
    fn test_torus_evaluate() {
        let torus = TorusSurface::new(10.0, 3.0); // R=10, r=3
        // u=0, v=0: outer equator, at (R+r, 0, 0) = (13, 0, 0)
        let pt = torus.evaluate(Point2::new(0.0, 0.0));
        assert!((pt.x - 13.0).abs() < 1e-10);
        assert!(pt.y.abs() < 1e-10);
        assert!(pt.z.abs() < 1e-10);

        // u=0, v=π: inner equator, at (R-r, 0, 0) = (7, 0, 0)
        let pt_inner = torus.evaluate(Point2::new(0.0, PI));
        assert!((pt_inner.x - 7.0).abs() < 1e-10);

        // u=0, v=π/2: top of tube, at (R, 0, r) = (10, 0, 3)
        let pt_top = torus.evaluate(Point2::new(0.0, PI / 2.0));
        assert!((pt_top.x - 10.0).abs() < 1e-10);
        assert!((pt_top.z - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_torus_normal() {
        let torus = TorusSurface::new(10.0, 3.0);
        // At u=0, v=0 (outer equator), normal should point in +x direction
        let n = torus.normal(Point2::new(0.0, 0.0));
        assert!((n.as_ref().x - 1.0).abs() < 1e-10);

        // At u=0, v=π/2 (top of tube at x-axis), normal should point in +z
        let n_top = torus.normal(Point2::new(0.0, PI / 2.0));
        assert!((n_top.as_ref().z - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_torus_partials() {
        let torus = TorusSurface::with_axis(Point3::new(1.0, 0.0, -2.0), Vec3::new(1.0, 0.0, 1.0), 10.0, 3.0);
        let uv = Point2::new(0.5, 0.3);
        check_partials(&torus, uv);
        check_normal(&torus, uv);
        check_implicit(&torus, uv);
        check_implicit(&torus, Point2::new(4.0, 2.5));
    }

    #[test]
    fn test_torus_position_of() {
        let torus = TorusSurface::with_axis(Point3::new(1.0, 0.0, -2.0), Vec3::new(1.0, 0.0, 1.0), 10.0, 3.0);
        for i in 0..12 {
            let uv = Point2::new(0.5 * i as f64, 6.1 - 0.5 * i as f64);
            let p = torus.evaluate(uv);
            let back = torus.position_of(&p);
            assert!(back.x >= 0.0 && back.x < TAU && back.y >= 0.0 && back.y < TAU);
            assert!((torus.evaluate(back) - p).norm() < 1e-10);
        }
    }

    #[test]
    fn test_torus_transform() {
        let torus = TorusSurface::new(10.0, 3.0);
        let t = Transform::translation(100.0, 0.0, 0.0);
        let torus2 = torus.transform(&t).unwrap();
        let pt = torus2.evaluate(Point2::new(0.0, 0.0));
        assert!((pt.x - 113.0).abs() < 1e-10);
    }
}
