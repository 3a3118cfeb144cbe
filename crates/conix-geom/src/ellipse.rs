//! Ellipses, circles, and their arcs in 3D.

use std::any::Any;
use std::sync::{Arc, Mutex};

use conix_math::{
    adjust_periodic_value, BoundingBox3, Dir3, MathError, Point3, Transform, Vec3, TAU,
};

use crate::{quadrature, reference_direction, try_dir, Curve3d, CurveKind, Ellipse2d, Plane};

/// Relative slack when comparing a sweep against a full turn.
const TURN_EPS: f64 = 1e-12;

/// Derived data for one projection plane.
#[derive(Debug, Clone)]
pub struct ProjectionData {
    /// The plane projected onto.
    pub plane: Plane,
    /// The curve's image in the plane's (u, v) coordinates.
    pub ellipse: Ellipse2d,
    /// Points of the arc where the projected u or v coordinate is extremal.
    pub extremes: Vec<Point3>,
}

/// An ellipse, circle, or elliptical arc.
///
/// `P(t) = center + cos(a) * major + sin(a) * minor` with
/// `a = start + t * sweep` and `t ∈ [0, 1]`. `major` and `minor` are
/// conjugate semi-diameters (not necessarily perpendicular or ordered by
/// length). `|sweep| == 2π` is a closed curve.
#[derive(Debug)]
pub struct Ellipse3d {
    center: Point3,
    major: Vec3,
    minor: Vec3,
    normal: Dir3,
    start: f64,
    sweep: f64,
    projection: Mutex<Option<Arc<ProjectionData>>>,
}

impl Clone for Ellipse3d {
    fn clone(&self) -> Self {
        Self {
            center: self.center,
            major: self.major,
            minor: self.minor,
            normal: self.normal,
            start: self.start,
            sweep: self.sweep,
            projection: Mutex::new(None),
        }
    }
}

fn normalize_sweep(sweep: f64) -> Option<f64> {
    if !sweep.is_finite() || sweep == 0.0 || sweep.abs() > TAU * (1.0 + 1e-9) {
        return None;
    }
    if (sweep.abs() - TAU).abs() <= TAU * 1e-9 {
        Some(TAU.copysign(sweep))
    } else {
        Some(sweep)
    }
}

impl Ellipse3d {
    /// Create an ellipse or arc from conjugate semi-diameters.
    ///
    /// `None` for zero-length or parallel axes, a zero sweep, or a sweep
    /// larger than one turn.
    pub fn new(center: Point3, major: Vec3, minor: Vec3, start: f64, sweep: f64) -> Option<Self> {
        let (a, b) = (major.norm(), minor.norm());
        if !(a.is_finite() && b.is_finite() && start.is_finite()) || a <= 1e-300 || b <= 1e-300 {
            return None;
        }
        let n = major.cross(&minor);
        if n.norm() <= 1e-12 * a * b {
            return None;
        }
        Some(Self {
            center,
            major,
            minor,
            normal: try_dir(&n)?,
            start,
            sweep: normalize_sweep(sweep)?,
            projection: Mutex::new(None),
        })
    }

    /// Full circle in the plane with the given normal.
    pub fn circle(center: Point3, normal: Vec3, radius: f64) -> Option<Self> {
        Self::arc(center, normal, radius, 0.0, TAU)
    }

    /// Circular arc in the plane with the given normal.
    pub fn arc(center: Point3, normal: Vec3, radius: f64, start: f64, sweep: f64) -> Option<Self> {
        let n = try_dir(&normal)?;
        let x = reference_direction(&n);
        let y = n.as_ref().cross(x.as_ref());
        Self::new(center, radius * x.as_ref(), radius * y, start, sweep)
    }

    /// Circular arc from `a` through `b` to `c`; `None` if the points are
    /// collinear or coincident.
    pub fn through_points(a: Point3, b: Point3, c: Point3) -> Option<Self> {
        let (ab, ac) = (b - a, c - a);
        let n = ab.cross(&ac);
        let n2 = n.norm_squared();
        if n2 <= 1e-24 * ab.norm_squared() * ac.norm_squared() {
            return None;
        }
        let offset = (ab.norm_squared() * ac.cross(&n) + ac.norm_squared() * n.cross(&ab))
            / (2.0 * n2);
        let center = a + offset;
        let radius = offset.norm();
        let nd = try_dir(&n)?;
        let x = -offset / radius;
        let y = nd.as_ref().cross(&x);
        let angle = |p: &Point3| {
            let d = p - center;
            d.dot(&y).atan2(d.dot(&x)).rem_euclid(TAU)
        };
        // a sits at angle 0 and the turn direction is counter-clockwise about n
        let sweep = angle(&c);
        Self::new(center, radius * x, radius * y, 0.0, if sweep == 0.0 { TAU } else { sweep })
    }

    /// Center point.
    pub fn center(&self) -> Point3 {
        self.center
    }

    /// Semi-diameter at angle 0.
    pub fn major_axis(&self) -> Vec3 {
        self.major
    }

    /// Semi-diameter at angle π/2.
    pub fn minor_axis(&self) -> Vec3 {
        self.minor
    }

    /// Unit normal `major × minor`.
    pub fn normal(&self) -> Dir3 {
        self.normal
    }

    /// The supporting plane.
    pub fn plane(&self) -> Plane {
        Plane::new(self.center, self.major, self.minor)
    }

    /// Start angle.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Signed sweep angle.
    pub fn sweep(&self) -> f64 {
        self.sweep
    }

    /// Whether the curve is a full turn.
    pub fn is_closed(&self) -> bool {
        self.sweep.abs() >= TAU * (1.0 - TURN_EPS)
    }

    /// Whether the semi-diameters are equal and perpendicular.
    pub fn is_circle(&self) -> bool {
        self.radius().is_some()
    }

    /// Radius when the curve is circular.
    pub fn radius(&self) -> Option<f64> {
        let (a, b) = (self.major.norm(), self.minor.norm());
        let round = (a - b).abs() <= 1e-9 * a && self.major.dot(&self.minor).abs() <= 1e-9 * a * b;
        round.then_some(a)
    }

    /// Angle at curve parameter `t`.
    pub fn angle_at(&self, t: f64) -> f64 {
        self.start + t * self.sweep
    }

    /// Point at angle `a`.
    pub fn point_at_angle(&self, a: f64) -> Point3 {
        let (s, c) = a.sin_cos();
        self.center + c * self.major + s * self.minor
    }

    /// Curve parameter of angle `a`, measured forward along the sweep.
    /// Values above 1 mean `a` lies outside an open arc.
    pub fn param_of_angle(&self, a: f64) -> f64 {
        let delta = if self.sweep > 0.0 {
            (a - self.start).rem_euclid(TAU)
        } else {
            (self.start - a).rem_euclid(TAU)
        };
        // Start angle of a closed curve maps to 0, never to 1
        let delta = if delta >= TAU { 0.0 } else { delta };
        delta / self.sweep.abs()
    }

    /// Angle of a point in the conjugate frame (exact for points on the curve).
    pub fn angle_of(&self, p: &Point3) -> f64 {
        let q = p - self.center;
        let (aa, ab, bb) = (
            self.major.dot(&self.major),
            self.major.dot(&self.minor),
            self.minor.dot(&self.minor),
        );
        let (qa, qb) = (q.dot(&self.major), q.dot(&self.minor));
        let det = aa * bb - ab * ab;
        let alpha = (qa * bb - qb * ab) / det;
        let beta = (qb * aa - qa * ab) / det;
        beta.atan2(alpha)
    }

    /// Point at t = 0.
    pub fn start_point(&self) -> Point3 {
        self.point_at_angle(self.start)
    }

    /// Point at t = 1.
    pub fn end_point(&self) -> Point3 {
        self.point_at_angle(self.start + self.sweep)
    }

    /// Split at `t ∈ (0, 1)` into two arcs that together trace this curve.
    pub fn split(&self, t: f64) -> Option<(Self, Self)> {
        if !(t > 1e-12 && t < 1.0 - 1e-12) {
            return None;
        }
        let first = Self::new(self.center, self.major, self.minor, self.start, t * self.sweep)?;
        let second = Self::new(
            self.center,
            self.major,
            self.minor,
            self.angle_at(t),
            (1.0 - t) * self.sweep,
        )?;
        Some((first, second))
    }

    /// Join with an arc that continues this one on the same ellipse.
    pub fn join(&self, other: &Ellipse3d) -> Option<Self> {
        let scale = self.major.norm().max(self.minor.norm());
        let tol = 1e-9 * scale.max(1.0);
        let same_shape = (self.center - other.center).norm() <= tol
            && (self.major - other.major).norm() <= tol
            && (self.minor - other.minor).norm() <= tol;
        if !same_shape || self.sweep.signum() != other.sweep.signum() {
            return None;
        }
        let end = self.start + self.sweep;
        let gap = adjust_periodic_value(other.start - end, -0.5 * TAU, 0.5 * TAU, TAU);
        if gap.abs() > 1e-9 {
            return None;
        }
        let total = self.sweep + other.sweep;
        if total.abs() > TAU * (1.0 + 1e-9) {
            return None;
        }
        Self::new(self.center, self.major, self.minor, self.start, total)
    }

    /// The same arc traversed backwards.
    pub fn reversed(&self) -> Self {
        let mut out = self.clone();
        out.reverse();
        out
    }

    /// Reverse the traversal direction in place.
    pub fn reverse(&mut self) {
        self.start += self.sweep;
        self.sweep = -self.sweep;
        self.projection = Mutex::new(None);
    }

    /// Change the sweep, clamped to one turn; a zero sweep is ignored.
    pub fn set_sweep(&mut self, sweep: f64) {
        if let Some(s) = normalize_sweep(sweep.clamp(-TAU, TAU)) {
            self.sweep = s;
            self.projection = Mutex::new(None);
        }
    }

    /// Apply an affine transform to the defining data.
    pub fn modify(&mut self, t: &Transform) -> Result<(), MathError> {
        if !t.is_invertible() {
            return Err(MathError::Singular);
        }
        let major = t.apply_vec(&self.major);
        let minor = t.apply_vec(&self.minor);
        let normal = try_dir(&major.cross(&minor)).ok_or(MathError::Singular)?;
        self.center = t.apply_point(&self.center);
        self.major = major;
        self.minor = minor;
        self.normal = normal;
        self.projection = Mutex::new(None);
        Ok(())
    }

    /// Perpendicular semi-axes `(major, minor)` with `|major| >= |minor|`.
    pub fn principal_axes(&self) -> (Vec3, Vec3) {
        let (a, b) = (self.major, self.minor);
        // |P - c|² is extremal where tan 2θ = 2 a·b / (a·a - b·b)
        let theta = 0.5 * (2.0 * a.dot(&b)).atan2(a.dot(&a) - b.dot(&b));
        let (s, c) = theta.sin_cos();
        let p = c * a + s * b;
        let q = -s * a + c * b;
        if p.norm() >= q.norm() {
            (p, q)
        } else {
            (q, p)
        }
    }

    /// Cached projection onto `plane`.
    pub fn project(&self, plane: &Plane) -> Arc<ProjectionData> {
        let mut cache = match self.projection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(data) = cache.as_ref() {
            if data.plane == *plane {
                return Arc::clone(data);
            }
        }
        let data = Arc::new(self.compute_projection(plane));
        *cache = Some(Arc::clone(&data));
        data
    }

    /// Whether a projection is currently cached.
    pub fn has_cached_projection(&self) -> bool {
        match self.projection.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn compute_projection(&self, plane: &Plane) -> ProjectionData {
        let a = plane.project_vec(&self.major);
        let b = plane.project_vec(&self.minor);
        let ellipse = Ellipse2d {
            center: plane.project(&self.center),
            major: a,
            minor: b,
            start: self.start,
            sweep: self.sweep,
        };
        let mut extremes = Vec::new();
        for (ai, bi) in [(a.x, b.x), (a.y, b.y)] {
            if ai.hypot(bi) <= 1e-300 {
                continue;
            }
            let base = bi.atan2(ai);
            for angle in [base, base + std::f64::consts::PI] {
                if self.param_of_angle(angle) <= 1.0 + 1e-12 {
                    extremes.push(self.point_at_angle(angle));
                }
            }
        }
        ProjectionData {
            plane: plane.clone(),
            ellipse,
            extremes,
        }
    }
}

impl Curve3d for Ellipse3d {
    fn evaluate(&self, t: f64) -> Point3 {
        self.point_at_angle(self.angle_at(t))
    }

    fn tangent(&self, t: f64) -> Vec3 {
        let (s, c) = self.angle_at(t).sin_cos();
        self.sweep * (-s * self.major + c * self.minor)
    }

    fn second_derivative(&self, t: f64) -> Vec3 {
        let (s, c) = self.angle_at(t).sin_cos();
        -self.sweep * self.sweep * (c * self.major + s * self.minor)
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::Ellipse
    }

    fn clone_box(&self) -> Box<dyn Curve3d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn suggested_segments(&self) -> usize {
        ((self.sweep.abs() / TAU * 32.0).ceil() as usize).max(4)
    }

    fn position_of(&self, p: &Point3) -> f64 {
        let t = self.param_of_angle(self.angle_of(p));
        let mut t = if t <= 1.0 {
            t
        } else if (self.start_point() - p).norm() <= (self.end_point() - p).norm() {
            0.0
        } else {
            1.0
        };
        if self.is_circle() {
            return t;
        }
        // Conjugate-frame angle is exact only on the curve
        for _ in 0..8 {
            let diff = self.evaluate(t) - p;
            let d1 = self.tangent(t);
            let h = d1.norm_squared() + diff.dot(&self.second_derivative(t));
            if h <= 1e-300 {
                break;
            }
            t = (t - diff.dot(&d1) / h).clamp(0.0, 1.0);
        }
        t
    }

    fn length(&self) -> f64 {
        match self.radius() {
            Some(r) => r * self.sweep.abs(),
            None => quadrature::integrate(
                |t| self.tangent(t).norm(),
                0.0,
                1.0,
                4 * self.suggested_segments(),
            ),
        }
    }

    fn approximate(&self, chord_tolerance: f64) -> Vec<Point3> {
        let a = self.principal_axes().0.norm();
        // Sagitta a(1 - cos(Δ/2)) bounds the chord error of an angular step Δ
        let step = if chord_tolerance >= a {
            std::f64::consts::FRAC_PI_2
        } else {
            (2.0 * (1.0 - chord_tolerance / a).acos()).clamp(1e-6, std::f64::consts::FRAC_PI_2)
        };
        let n = ((self.sweep.abs() / step).ceil() as usize).max(1);
        (0..=n)
            .map(|i| self.evaluate(i as f64 / n as f64))
            .collect()
    }

    fn bounding_box(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::from_points([self.start_point(), self.end_point()].iter());
        for i in 0..3 {
            let (ai, bi) = (self.major[i], self.minor[i]);
            if ai.hypot(bi) <= 1e-300 {
                continue;
            }
            let base = bi.atan2(ai);
            for angle in [base, base + std::f64::consts::PI] {
                if self.param_of_angle(angle) <= 1.0 {
                    bbox.include_point(&self.point_at_angle(angle));
                }
            }
        }
        bbox
    }

    fn trimmed(&self, t0: f64, t1: f64) -> Box<dyn Curve3d> {
        match Self::new(
            self.center,
            self.major,
            self.minor,
            self.angle_at(t0),
            (t1 - t0) * self.sweep,
        ) {
            Some(e) => Box::new(e),
            None => Box::new(crate::Trimmed3d::new(self.clone_box(), t0, t1)),
        }
    }
}
