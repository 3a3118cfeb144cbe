//! Tensor-product B-spline surfaces.
//!
//! The free-form surface of the core. It has no implicit equation, so
//! intersections against it are traced numerically; when both operands are
//! B-splines the tracer samples their bounding boxes.

use std::any::Any;

use conix_math::{
    BoundingBox3, BoundingRect, Dir3, ImplicitPolynomial, Periodicity, Point2, Point3, Transform,
    Vec3,
};

use crate::bspline::{ders_basis_functions, find_span, validate_knots};
use crate::{try_dir, Surface, SurfaceKind};

/// Coarse grid used to seed [`Surface::position_of`].
const PROJECTION_GRID: usize = 16;

/// A non-rational tensor-product B-spline surface.
///
/// Control points are stored in row-major order: `points[v_idx * n_u + u_idx]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineSurface {
    /// Control points in row-major order.
    pub control_points: Vec<Point3>,
    /// Number of control points in the u direction.
    pub n_u: usize,
    /// Number of control points in the v direction.
    pub n_v: usize,
    /// Knot vector in u. Length = n_u + degree_u + 1.
    pub knots_u: Vec<f64>,
    /// Knot vector in v. Length = n_v + degree_v + 1.
    pub knots_v: Vec<f64>,
    /// Polynomial degree in u.
    pub degree_u: usize,
    /// Polynomial degree in v.
    pub degree_v: usize,
}

/// Clamped knots with uniformly spaced interior knots on `[0, 1]`.
fn clamped_uniform_knots(n: usize, degree: usize) -> Vec<f64> {
    let spans = n.saturating_sub(degree).max(1);
    let mut knots = vec![0.0; degree + 1];
    knots.extend((1..spans).map(|k| k as f64 / spans as f64));
    knots.extend(std::iter::repeat(1.0).take(degree + 1));
    knots
}

impl BSplineSurface {
    /// Create a B-spline surface.
    ///
    /// `control_points` is in row-major order: `[v=0,u=0], [v=0,u=1], ..., [v=1,u=0], ...`.
    /// `None` if the counts or knot vectors are inconsistent.
    pub fn new(
        control_points: Vec<Point3>,
        n_u: usize,
        n_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Option<Self> {
        let consistent = control_points.len() == n_u * n_v
            && degree_u >= 1
            && degree_v >= 1
            && validate_knots(&knots_u, n_u, degree_u)
            && validate_knots(&knots_v, n_v, degree_v);
        consistent.then_some(Self {
            control_points,
            n_u,
            n_v,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
        })
    }

    /// Clamped surface over `[0, 1]²` with uniform interior knots.
    pub fn clamped_uniform(
        control_points: Vec<Point3>,
        n_u: usize,
        n_v: usize,
        degree_u: usize,
        degree_v: usize,
    ) -> Option<Self> {
        let knots_u = clamped_uniform_knots(n_u, degree_u);
        let knots_v = clamped_uniform_knots(n_v, degree_v);
        Self::new(control_points, n_u, n_v, knots_u, knots_v, degree_u, degree_v)
    }

    /// Get a control point at `(u_idx, v_idx)`.
    fn cp(&self, u_idx: usize, v_idx: usize) -> &Point3 {
        &self.control_points[v_idx * self.n_u + u_idx]
    }

    /// Mixed partial derivative `∂^(ku+kv) S / ∂u^ku ∂v^kv` at `uv`,
    /// with `uv` clamped to the domain.
    pub fn derivative(&self, uv: Point2, ku: usize, kv: usize) -> Vec3 {
        let ((u0, u1), (v0, v1)) = self.parameter_domain();
        let u = uv.x.clamp(u0, u1);
        let v = uv.y.clamp(v0, v1);
        let span_u = find_span(&self.knots_u, self.n_u - 1, self.degree_u, u);
        let span_v = find_span(&self.knots_v, self.n_v - 1, self.degree_v, v);
        let bu = ders_basis_functions(&self.knots_u, span_u, self.degree_u, u, ku);
        let bv = ders_basis_functions(&self.knots_v, span_v, self.degree_v, v, kv);

        let mut out = Vec3::zeros();
        for (j, &wv) in bv[kv].iter().enumerate() {
            let v_idx = span_v - self.degree_v + j;
            for (i, &wu) in bu[ku].iter().enumerate() {
                let u_idx = span_u - self.degree_u + i;
                out += wu * wv * self.cp(u_idx, v_idx).coords;
            }
        }
        out
    }

    /// Parameter domain.
    pub fn parameter_domain(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.knots_u[self.degree_u], self.knots_u[self.n_u]),
            (self.knots_v[self.degree_v], self.knots_v[self.n_v]),
        )
    }

    fn clamp(&self, uv: Point2) -> Point2 {
        let ((u0, u1), (v0, v1)) = self.parameter_domain();
        Point2::new(uv.x.clamp(u0, u1), uv.y.clamp(v0, v1))
    }

    /// One Newton step on `|S(uv) - p|² / 2`, Gauss-Newton when the full
    /// Hessian is not positive definite.
    fn projection_step(&self, uv: Point2, p: &Point3) -> Option<Point2> {
        let d = self.evaluate(uv) - p;
        let (su, sv) = (self.d_du(uv), self.d_dv(uv));
        let g = [d.dot(&su), d.dot(&sv)];
        let gauss = [su.dot(&su), su.dot(&sv), sv.dot(&sv)];
        let full = [
            gauss[0] + d.dot(&self.d2_du2(uv)),
            gauss[1] + d.dot(&self.d2_dudv(uv)),
            gauss[2] + d.dot(&self.d2_dv2(uv)),
        ];
        let solve = |h: [f64; 3]| {
            let det = h[0] * h[2] - h[1] * h[1];
            (h[0] > 0.0 && det > 1e-24 * (h[0] * h[2]).max(1e-300)).then(|| {
                Point2::new(
                    uv.x - (h[2] * g[0] - h[1] * g[1]) / det,
                    uv.y - (h[0] * g[1] - h[1] * g[0]) / det,
                )
            })
        };
        solve(full).or_else(|| solve(gauss)).map(|next| self.clamp(next))
    }
}

impl Surface for BSplineSurface {
    fn evaluate(&self, uv: Point2) -> Point3 {
        Point3::from(self.derivative(uv, 0, 0))
    }

    fn normal(&self, uv: Point2) -> Dir3 {
        if let Some(n) = try_dir(&self.d_du(uv).cross(&self.d_dv(uv))) {
            return n;
        }
        // Collapsed edge: borrow the normal from just inside the domain
        let ((u0, u1), (v0, v1)) = self.parameter_domain();
        let inward = Point2::new(
            uv.x + 1e-6 * ((u0 + u1) / 2.0 - uv.x),
            uv.y + 1e-6 * ((v0 + v1) / 2.0 - uv.y),
        );
        try_dir(&self.d_du(inward).cross(&self.d_dv(inward)))
            .unwrap_or_else(|| Dir3::new_unchecked(Vec3::z()))
    }

    fn d_du(&self, uv: Point2) -> Vec3 {
        self.derivative(uv, 1, 0)
    }

    fn d_dv(&self, uv: Point2) -> Vec3 {
        self.derivative(uv, 0, 1)
    }

    fn d2_du2(&self, uv: Point2) -> Vec3 {
        self.derivative(uv, 2, 0)
    }

    fn d2_dudv(&self, uv: Point2) -> Vec3 {
        self.derivative(uv, 1, 1)
    }

    fn d2_dv2(&self, uv: Point2) -> Vec3 {
        self.derivative(uv, 0, 2)
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        self.parameter_domain()
    }

    fn periodicity(&self) -> Periodicity {
        Periodicity::NONE
    }

    /// Nearest grid sample refined by Newton iteration, clamped to the
    /// domain.
    fn position_of(&self, p: &Point3) -> Point2 {
        let ((u0, u1), (v0, v1)) = self.parameter_domain();
        let n = PROJECTION_GRID;
        let node = |i: usize, j: usize| {
            Point2::new(
                u0 + (u1 - u0) * i as f64 / n as f64,
                v0 + (v1 - v0) * j as f64 / n as f64,
            )
        };
        let mut best = node(0, 0);
        let mut best_d = f64::INFINITY;
        for i in 0..=n {
            for j in 0..=n {
                let uv = node(i, j);
                let d = (self.evaluate(uv) - p).norm_squared();
                if d < best_d {
                    best = uv;
                    best_d = d;
                }
            }
        }

        let eps = 1e-14 * (u1 - u0).max(v1 - v0);
        let mut uv = best;
        for _ in 0..32 {
            let Some(next) = self.projection_step(uv, p) else {
                break;
            };
            let moved = (next - uv).norm();
            uv = next;
            if moved <= eps {
                break;
            }
        }
        uv
    }

    fn implicit(&self) -> Option<ImplicitPolynomial> {
        None
    }

    fn surface_type(&self) -> SurfaceKind {
        SurfaceKind::BSpline
    }

    fn clone_box(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// B-splines are affinely invariant: the control net is mapped.
    fn transform(&self, t: &Transform) -> Option<Box<dyn Surface>> {
        Some(Box::new(Self {
            control_points: self.control_points.iter().map(|p| t.apply_point(p)).collect(),
            ..self.clone()
        }))
    }

    /// Box of the control points whose basis functions are non-zero over
    /// `rect` (convex hull property).
    fn bounding_box(&self, rect: &BoundingRect) -> BoundingBox3 {
        let lo = self.clamp(Point2::new(rect.u_min(), rect.v_min()));
        let hi = self.clamp(Point2::new(rect.u_max(), rect.v_max()));
        let (pu, pv) = (self.degree_u, self.degree_v);
        let su0 = find_span(&self.knots_u, self.n_u - 1, pu, lo.x);
        let su1 = find_span(&self.knots_u, self.n_u - 1, pu, hi.x);
        let sv0 = find_span(&self.knots_v, self.n_v - 1, pv, lo.y);
        let sv1 = find_span(&self.knots_v, self.n_v - 1, pv, hi.y);
        let mut bbox = BoundingBox3::empty();
        for v_idx in sv0 - pv..=sv1 {
            for u_idx in su0 - pu..=su1 {
                bbox.include_point(self.cp(u_idx, v_idx));
            }
        }
        bbox
    }
}
