use std::any::Any;
use std::f64::consts::FRAC_PI_2;

use conix_math::{Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform, Vec3, TAU};

use crate::{try_dir, Surface, SurfaceKind};

/// A spherical surface defined by center and radius.
///
/// Parameterization: `P(u, v) = center + radius * (cos(v) * (cos(u) * x + sin(u) * y) + sin(v) * z)`
///
/// Where `u ∈ [0, 2π)` is longitude and `v ∈ [-π/2, π/2]` is latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereSurface {
    /// Center of the sphere.
    pub center: Point3,
    /// Radius of the sphere.
    pub radius: f64,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Axis direction (north pole).
    pub axis: Dir3,
}

impl SphereSurface {
    /// Create a sphere centered at origin with the given radius.
    pub fn new(radius: f64) -> Self {
        Self::with_center(Point3::origin(), radius)
    }

    /// Create a sphere with a custom center.
    pub fn with_center(center: Point3, radius: f64) -> Self {
        Self {
            center,
            radius,
            ref_dir: Dir3::new_normalize(Vec3::x()),
            axis: Dir3::new_normalize(Vec3::z()),
        }
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }

    fn equatorial(&self, u: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir()
    }
}

impl Surface for SphereSurface {
    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        self.center
            + self.radius * (cos_v * self.equatorial(uv.x) + sin_v * self.axis.as_ref())
    }

    fn normal(&self, uv: Point2) -> Dir3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        Dir3::new_normalize(cos_v * self.equatorial(uv.x) + sin_v * self.axis.as_ref())
    }

    fn d_du(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let cos_v = uv.y.cos();
        self.radius * cos_v * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d_dv(&self, uv: Point2) -> Vec3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        self.radius * (-sin_v * self.equatorial(uv.x) + cos_v * self.axis.as_ref())
    }

    fn d2_du2(&self, uv: Point2) -> Vec3 {
        -self.radius * uv.y.cos() * self.equatorial(uv.x)
    }

    fn d2_dudv(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        -self.radius * uv.y.sin() * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d2_dv2(&self, uv: Point2) -> Vec3 {
        let (sin_v, cos_v) = uv.y.sin_cos();
        -self.radius * (cos_v * self.equatorial(uv.x) + sin_v * self.axis.as_ref())
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, TAU), (-FRAC_PI_2, FRAC_PI_2))
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::u_only(TAU)
    }

    fn position_of(&self, p: &Point3) -> Point2 {
        let q = p - self.center;
        let z = q.dot(self.axis.as_ref());
        let x = q.dot(self.ref_dir.as_ref());
        let y = q.dot(&self.y_dir());
        let u = y.atan2(x).rem_euclid(TAU);
        let v = z.atan2(x.hypot(y));
        Point2::new(if u >= TAU { 0.0 } else { u }, v)
    }

    /// `(|p - c|² - r²) / 2r`.
    fn implicit(&self) -> Option<ImplicitPolynomial> {
        if self.radius <= 0.0 {
            return None;
        }
        let mut f = ImplicitPolynomial::constant(-self.radius * self.radius);
        for i in 0..3 {
            let d = ImplicitPolynomial::variable(i)
                .add(&ImplicitPolynomial::constant(-self.center[i]));
            f = f.add(&d.pow(2));
        }
        Some(f.scale(0.5 / self.radius))
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::Sphere
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
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        let new_axis = try_dir(&t.apply_vec(self.axis.as_ref()))?;
        // Scale factor affects radius; use the length of the transformed ref_dir
        let scale = new_ref.norm();
        let new_ref = try_dir(&(new_ref - new_ref.dot(new_axis.as_ref()) * new_axis.as_ref()))?;
        Some(Box::new(SphereSurface {
            center: new_center,
            radius: self.radius * scale,
            ref_dir: new_ref,
            axis: new_axis,
        }))
    }
}
