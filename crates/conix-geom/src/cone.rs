use std::any::Any;

use conix_math::{Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform, Vec3, TAU};

use crate::{reference_direction, try_dir, Surface, SurfaceKind};

/// A conical surface defined by an apex, axis, and half-angle.
///
/// Parameterization: `P(u, v) = apex + v * (cos(half_angle) * axis + sin(half_angle) * (cos(u) * x + sin(u) * y))`
///
/// Where `u ∈ [0, 2π)` is the angular parameter and `v ≥ 0` is the distance from apex along the cone.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeSurface {
    /// Apex (tip) of the cone.
    pub apex: Point3,
    /// Unit direction along the cone axis (from apex toward base).
    pub axis: Dir3,
    /// Reference direction for u=0 (perpendicular to axis).
    pub ref_dir: Dir3,
    /// Half-angle of the cone in radians.
    pub half_angle: f64,
}

impl ConeSurface {
    /// Create a cone with apex at origin, axis along Z, with the given half-angle.
    pub fn new(half_angle: f64) -> Self {
        Self {
            apex: Point3::origin(),
            axis: Dir3::new_normalize(Vec3::z()),
            ref_dir: Dir3::new_normalize(Vec3::x()),
            half_angle,
        }
    }

    /// Create a cone with a custom apex and axis; `None` for a zero axis.
    pub fn with_axis(apex: Point3, axis: Vec3, half_angle: f64) -> Option<Self> {
        let a = try_dir(&axis)?;
        Some(Self {
            apex,
            axis: a,
            ref_dir: reference_direction(&a),
            half_angle,
        })
    }

    fn y_dir(&self) -> Vec3 {
        self.axis.as_ref().cross(self.ref_dir.as_ref())
    }

    fn radial(&self, u: f64) -> Vec3 {
        let (sin_u, cos_u) = u.sin_cos();
        cos_u * self.ref_dir.as_ref() + sin_u * self.y_dir()
    }

    /// Radius of the circular cross-section at generator distance `v`.
    pub fn radius_at(&self, v: f64) -> f64 {
        v * self.half_angle.sin()
    }
}

impl Surface for ConeSurface {
    fn evaluate(&self, uv: Point2) -> Point3 {
        let (sa, ca) = self.half_angle.sin_cos();
        self.apex + uv.y * (ca * self.axis.as_ref() + sa * self.radial(uv.x))
    }

    fn normal(&self, uv: Point2) -> Dir3 {
        let (sa, ca) = self.half_angle.sin_cos();
        // Normal is perpendicular to the cone surface
        Dir3::new_normalize(ca * self.radial(uv.x) - sa * self.axis.as_ref())
    }

    fn d_du(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        let sa = self.half_angle.sin();
        uv.y * sa * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d_dv(&self, uv: Point2) -> Vec3 {
        let (sa, ca) = self.half_angle.sin_cos();
        ca * self.axis.as_ref() + sa * self.radial(uv.x)
    }

    fn d2_du2(&self, uv: Point2) -> Vec3 {
        -uv.y * self.half_angle.sin() * self.radial(uv.x)
    }

    fn d2_dudv(&self, uv: Point2) -> Vec3 {
        let (sin_u, cos_u) = uv.x.sin_cos();
        self.half_angle.sin() * (-sin_u * self.ref_dir.as_ref() + cos_u * self.y_dir())
    }

    fn d2_dv2(&self, _uv: Point2) -> Vec3 {
        Vec3::zeros()
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        ((0.0, TAU), (0.0, 1e10))
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::u_only(TAU)
    }

    fn position_of(&self, p: &Point3) -> Point2 {
        let q = p - self.apex;
        let h = q.dot(self.axis.as_ref());
        let radial = q - h * self.axis.as_ref();
        let u = radial
            .dot(&self.y_dir())
            .atan2(radial.dot(self.ref_dir.as_ref()))
            .rem_euclid(TAU);
        let (sa, ca) = self.half_angle.sin_cos();
        Point2::new(if u >= TAU { 0.0 } else { u }, h * ca + radial.norm() * sa)
    }

    /// `(cos²α |q|² - (q·a)²) / sin 2α` with `q = p - apex`: the double cone,
    /// with `|F|` equal to distance times distance-from-apex.
    fn implicit(&self) -> Option<ImplicitPolynomial> {
        let s2 = (2.0 * self.half_angle).sin();
        if s2.abs() < 1e-12 {
            return None;
        }
        let q: [ImplicitPolynomial; 3] = [0, 1, 2].map(|i| {
            ImplicitPolynomial::variable(i).add(&ImplicitPolynomial::constant(-self.apex[i]))
        });
        let a = self.axis.as_ref();
        let h = q[0].scale(a.x).add(&q[1].scale(a.y)).add(&q[2].scale(a.z));
        let q2 = q[0].pow(2).add(&q[1].pow(2)).add(&q[2].pow(2));
        let ca = self.half_angle.cos();
        Some(q2.scale(ca * ca).add(&h.pow(2).scale(-1.0)).scale(1.0 / s2))
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::Cone
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
        let new_apex = t.apply_point(&self.apex);
        let new_axis = try_dir(&t.apply_vec(self.axis.as_ref()))?;
        let new_ref = t.apply_vec(self.ref_dir.as_ref());
        let new_ref = try_dir(&(new_ref - new_ref.dot(new_axis.as_ref()) * new_axis.as_ref()))?;
        // Half-angle is preserved under similarity transforms only
        Some(Box::new(ConeSurface {
            apex: new_apex,
            axis: new_axis,
            ref_dir: new_ref,
            half_angle: self.half_angle,
        }))
    }
}
