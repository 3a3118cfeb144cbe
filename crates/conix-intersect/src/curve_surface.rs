//! Curve/surface intersection.

use conix_geom::{Curve3d, CylinderSurface, Ellipse3d, Line3d, Plane, Surface};
use conix_math::{poly, BoundingRect, Point2, Point3, Vec3};
use conix_solve::{NewtonMinimizer, ScalarObjective};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::{
    dedup_by_point, downcast, in_interval, project_point, ImplicitField, IntersectSettings,
    Result,
};

/// A point where a curve meets a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSurfaceHit {
    /// World position (on the curve).
    pub point: Point3,
    /// Curve parameter.
    pub t: f64,
    /// Surface parameters, inside the domain rectangle.
    pub uv: Point2,
}

/// Points where `curve` meets the part of `surface` over `rect`, sorted by
/// curve parameter.
///
/// A curve lying in the surface (a ruling of a cylinder, a line in a plane)
/// has no isolated hits and yields an empty result.
pub fn intersect_curve_surface(
    curve: &dyn Curve3d,
    surface: &dyn Surface,
    rect: &BoundingRect,
    settings: &IntersectSettings,
) -> Result<Vec<CurveSurfaceHit>> {
    settings.validate()?;
    let scale = curve.bounding_box().diagonal().max(1.0);
    let tol = settings.tolerance * scale;

    let params = match closed_form(curve, surface) {
        Some(ts) => ts,
        None => numeric_candidates(curve, surface, settings, tol),
    };

    let mut hits: Vec<CurveSurfaceHit> = params
        .into_iter()
        .filter_map(|t| {
            let t = in_interval(t, curve.domain())?;
            let point = curve.evaluate(t);
            let uv = project_point(surface, &point, rect);
            let on_surface = (surface.evaluate(uv) - point).norm() <= tol;
            (on_surface && rect.contains_rel(&uv, 1e-6)).then_some(CurveSurfaceHit { point, t, uv })
        })
        .collect();
    hits.sort_by(|a, b| a.t.total_cmp(&b.t));
    let hits = dedup_by_point(hits, 10.0 * tol, |h| h.point);
    debug!(
        curve = ?curve.curve_type(),
        surface = ?surface.surface_type(),
        hits = hits.len(),
        "curve/surface intersection"
    );
    Ok(hits)
}

/// Curve parameters from a closed form, `None` when the pair has none.
fn closed_form(curve: &dyn Curve3d, surface: &dyn Surface) -> Option<Vec<f64>> {
    let any = curve.as_any();
    if let Some(line) = any.downcast_ref::<Line3d>() {
        if let Some(cyl) = downcast::<CylinderSurface>(surface) {
            return Some(line_cylinder(line, cyl));
        }
        return line_implicit(line, surface);
    }
    if let Some(e) = any.downcast_ref::<Ellipse3d>() {
        if let Some(plane) = downcast::<Plane>(surface) {
            return Some(ellipse_plane(e, plane));
        }
    }
    None
}

/// `x² + y² = 1` in the cylinder's local frame; exact for elliptical
/// cross-sections too.
pub(crate) fn line_cylinder(line: &Line3d, cyl: &CylinderSurface) -> Vec<f64> {
    let o = cyl.placement().to_local(&line.origin);
    let d = cyl.placement().vec_to_local(&line.direction);
    poly::solve_quadratic(
        d.x * d.x + d.y * d.y,
        2.0 * (o.x * d.x + o.y * d.y),
        o.x * o.x + o.y * o.y - 1.0,
    )
}

/// Roots of the implicit polynomial restricted to the line (planes,
/// spheres, cones, tori).
pub(crate) fn line_implicit(line: &Line3d, surface: &dyn Surface) -> Option<Vec<f64>> {
    let f = surface.implicit()?;
    let c = f.along_line(&line.origin, &line.direction);
    match c.len() {
        1 => Some(Vec::new()),
        2 => Some(poly::solve_linear(c[0], c[1])),
        3 => Some(poly::solve_quadratic(c[0], c[1], c[2])),
        4 => Some(poly::solve_cubic(c[0], c[1], c[2], c[3])),
        5 => Some(poly::solve_quartic(c[0], c[1], c[2], c[3], c[4])),
        _ => None,
    }
}

/// `n·(c + cos θ·M + sin θ·m − o) = 0`.
fn ellipse_plane(e: &Ellipse3d, plane: &Plane) -> Vec<f64> {
    let n = plane.normal_dir.as_ref();
    poly::solve_trig(
        n.dot(&e.major_axis()),
        n.dot(&e.minor_axis()),
        n.dot(&(plane.origin - e.center())),
    )
    .into_iter()
    .map(|theta| e.param_of_angle(theta))
    .collect()
}

/// `C(t) − S(u, v)` over `[t, u, v]`.
/// `|C(t) - S(u, v)|²` over `[t, u, v]`.
struct CurveSurfaceDistance<'a> {
    curve: &'a dyn Curve3d,
    surface: &'a dyn Surface,
}

impl CurveSurfaceDistance<'_> {
    fn gap(&self, x: &DVector<f64>) -> Vec3 {
        self.curve.evaluate(x[0]) - self.surface.evaluate(Point2::new(x[1], x[2]))
    }
}

impl ScalarObjective for CurveSurfaceDistance<'_> {
    fn dimension(&self) -> usize {
        3
    }

    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        Some(self.gap(x).norm_squared())
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let d = self.gap(x);
        let uv = Point2::new(x[1], x[2]);
        Some(DVector::from_vec(vec![
            2.0 * d.dot(&self.curve.tangent(x[0])),
            -2.0 * d.dot(&self.surface.d_du(uv)),
            -2.0 * d.dot(&self.surface.d_dv(uv)),
        ]))
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let d = self.gap(x);
        let uv = Point2::new(x[1], x[2]);
        let ct = self.curve.tangent(x[0]);
        let (su, sv) = (self.surface.d_du(uv), self.surface.d_dv(uv));
        let htt = 2.0 * (ct.dot(&ct) + d.dot(&self.curve.second_derivative(x[0])));
        let htu = -2.0 * ct.dot(&su);
        let htv = -2.0 * ct.dot(&sv);
        let huu = 2.0 * (su.dot(&su) - d.dot(&self.surface.d2_du2(uv)));
        let huv = 2.0 * (su.dot(&sv) - d.dot(&self.surface.d2_dudv(uv)));
        let hvv = 2.0 * (sv.dot(&sv) - d.dot(&self.surface.d2_dv2(uv)));
        Some(DMatrix::from_row_slice(
            3,
            3,
            &[htt, htu, htv, htu, huu, huv, htv, huv, hvv],
        ))
    }
}

/// Seeds from sign changes (and near-zero minima) of the implicit polynomial
/// along the curve, or from distance minima when the surface has none;
/// each seed polished by Newton iteration on the squared distance.
fn numeric_candidates(
    curve: &dyn Curve3d,
    surface: &dyn Surface,
    settings: &IntersectSettings,
    tol: f64,
) -> Vec<f64> {
    let n = (2 * curve.suggested_segments()).clamp(32, 256);
    let (t0, t1) = curve.domain();
    let ts: Vec<f64> = (0..=n).map(|i| t0 + (t1 - t0) * i as f64 / n as f64).collect();
    let pts: Vec<Point3> = ts.iter().map(|t| curve.evaluate(*t)).collect();
    let chord = pts
        .windows(2)
        .map(|w| (w[1] - w[0]).norm())
        .fold(0.0, f64::max);

    let seeds: Vec<f64> = match ImplicitField::of(surface) {
        Some(field) => {
            let f: Vec<f64> = pts.iter().map(|p| field.value(p)).collect();
            let mut seeds = Vec::new();
            for k in 0..n {
                if f[k] == 0.0 || f[k].signum() != f[k + 1].signum() {
                    seeds.push(bisect(|t| field.value(&curve.evaluate(t)), ts[k], ts[k + 1]));
                }
            }
            // Tangential contact leaves no sign change
            for k in 1..n {
                let d = field.polynomial().distance_estimate(&pts[k]).abs();
                if f[k].abs() <= f[k - 1].abs() && f[k].abs() <= f[k + 1].abs() && d <= chord {
                    seeds.push(ts[k]);
                }
            }
            seeds
        }
        None => {
            let d: Vec<f64> = pts
                .iter()
                .map(|p| (surface.evaluate(surface.position_of(p)) - p).norm())
                .collect();
            (0..=n)
                .filter(|&k| {
                    let left = k == 0 || d[k] <= d[k - 1];
                    let right = k == n || d[k] <= d[k + 1];
                    left && right && d[k] <= chord
                })
                .map(|k| ts[k])
                .collect()
        }
    };

    let solver = NewtonMinimizer::new(settings.solver.clone());
    let objective = CurveSurfaceDistance { curve, surface };
    seeds
        .into_iter()
        .filter_map(|t| {
            let uv = surface.position_of(&curve.evaluate(t));
            match solver.minimize(&objective, DVector::from_vec(vec![t, uv.x, uv.y])) {
                Ok(sol) if sol.residual.sqrt() <= tol => Some(sol.params[0]),
                Ok(sol) => {
                    trace!(t, distance = sol.residual.sqrt(), "curve/surface seed did not meet");
                    None
                }
                Err(err) => {
                    trace!(t, %err, "curve/surface seed solve failed");
                    None
                }
            }
        })
        .collect()
}

/// Root of `f` in `[a, b]` where `f(a)` and `f(b)` differ in sign.
pub(crate) fn bisect(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let mut fa = f(a);
    if fa == 0.0 {
        return a;
    }
    for _ in 0..60 {
        let m = 0.5 * (a + b);
        let fm = f(m);
        if fm == 0.0 {
            return m;
        }
        if fm.signum() == fa.signum() {
            a = m;
            fa = fm;
        } else {
            b = m;
        }
    }
    0.5 * (a + b)
}
