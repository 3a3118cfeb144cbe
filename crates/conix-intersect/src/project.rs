//! Mapping world points and curves into a surface's parameter rectangle.

use conix_geom::{BSplineCurve2d, Curve2d, Curve3d, Ellipse3d, Line2d, Line3d, Plane, Surface};
use conix_math::{
    adjust_periodic, unwrap_periodic, BoundingRect, Periodicity, Point2, Point3,
};
use conix_solve::{NewtonMinimizer, ScalarObjective};
use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::downcast;

/// `|S(u, v) - target|²` with analytic derivatives.
struct SquaredDistance<'a> {
    surface: &'a dyn Surface,
    target: Point3,
}

impl ScalarObjective for SquaredDistance<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        let uv = Point2::new(x[0], x[1]);
        Some((self.surface.evaluate(uv) - self.target).norm_squared())
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let uv = Point2::new(x[0], x[1]);
        let d = self.surface.evaluate(uv) - self.target;
        Some(DVector::from_vec(vec![
            2.0 * d.dot(&self.surface.d_du(uv)),
            2.0 * d.dot(&self.surface.d_dv(uv)),
        ]))
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let uv = Point2::new(x[0], x[1]);
        let s = self.surface;
        let d = s.evaluate(uv) - self.target;
        let (su, sv) = (s.d_du(uv), s.d_dv(uv));
        let huu = 2.0 * (su.dot(&su) + d.dot(&s.d2_du2(uv)));
        let huv = 2.0 * (su.dot(&sv) + d.dot(&s.d2_dudv(uv)));
        let hvv = 2.0 * (sv.dot(&sv) + d.dot(&s.d2_dv2(uv)));
        Some(DMatrix::from_row_slice(2, 2, &[huu, huv, huv, hvv]))
    }
}

/// Parameters on `surface` of the point closest to `p`, shifted by whole
/// periods into `rect`.
///
/// `position_of` provides the seed; a Newton solve on the squared distance
/// refines it for surfaces where the inverse map is not a true projection
/// (elliptical cylinders, points off the surface). The result is not clamped
/// on non-periodic axes.
pub fn project_point(surface: &dyn Surface, p: &Point3, rect: &BoundingRect) -> Point2 {
    let periodicity = surface.periodicity();
    let seed = adjust_periodic(surface.position_of(p), rect, &periodicity);
    let objective = SquaredDistance {
        surface,
        target: *p,
    };
    let refined = NewtonMinimizer::default()
        .minimize(&objective, DVector::from_vec(vec![seed.x, seed.y]))
        .ok()
        .map(|sol| Point2::new(sol.params[0], sol.params[1]))
        .filter(|uv| {
            (surface.evaluate(*uv) - p).norm() <= (surface.evaluate(seed) - p).norm()
        });
    match refined {
        Some(uv) => adjust_periodic(uv, rect, &periodicity),
        None => {
            trace!(?p, "projection refinement rejected; keeping seed");
            seed
        }
    }
}

/// The image of `curve` in the parameter space of `surface`, sharing the
/// curve's parameter.
///
/// Lines and ellipses on planes map exactly. Other images are sampled at
/// `samples + 1` stations, unwrapped across periodic seams, and shifted so
/// the start lies in `rect`; an image that is affine in the curve parameter
/// (rulings and parallels of revolved surfaces) becomes a [`Line2d`],
/// anything else an interpolating B-spline. `None` only when the samples
/// cannot be interpolated.
pub fn project_curve(
    surface: &dyn Surface,
    curve: &dyn Curve3d,
    rect: &BoundingRect,
    samples: usize,
) -> Option<Box<dyn Curve2d>> {
    if let Some(plane) = downcast::<Plane>(surface) {
        if let Some(image) = plane_image(plane, curve) {
            return Some(image);
        }
    }
    let (t0, t1) = curve.domain();
    let n = samples.max(2);
    let ts: Vec<f64> = (0..=n)
        .map(|i| t0 + (t1 - t0) * i as f64 / n as f64)
        .collect();
    let mut uvs = Vec::with_capacity(ts.len());
    let mut singular = Vec::with_capacity(ts.len());
    for &t in &ts {
        let uv = surface.position_of(&curve.evaluate(t));
        let su = surface.d_du(uv).norm();
        singular.push(su <= 1e-12 * (1.0 + surface.d_dv(uv).norm()));
        uvs.push(uv);
    }
    fill_singular_u(&mut uvs, &singular);
    unwrap_into_rect(&mut uvs, rect, &surface.periodicity());

    if (t0, t1) == (0.0, 1.0) {
        let line = Line2d::from_points(uvs[0], uvs[n]);
        let scale = uvs.iter().fold(1.0_f64, |m, uv| m.max(uv.coords.amax()));
        let affine = ts
            .iter()
            .zip(&uvs)
            .all(|(t, uv)| (line.evaluate(*t) - uv).norm() <= 1e-9 * scale);
        if affine {
            return Some(Box::new(line));
        }
    }
    let spline = BSplineCurve2d::interpolate(&uvs, &ts)?;
    Some(Box::new(spline))
}

fn plane_image(plane: &Plane, curve: &dyn Curve3d) -> Option<Box<dyn Curve2d>> {
    let any = curve.as_any();
    if let Some(line) = any.downcast_ref::<Line3d>() {
        return Some(Box::new(Line2d::from_points(
            plane.project(&line.origin),
            plane.project(&line.end()),
        )));
    }
    let ellipse = any.downcast_ref::<Ellipse3d>()?;
    Some(Box::new(ellipse.project(plane).ellipse.clone()))
}

/// At singular points (poles, apex) `u` is arbitrary; borrow it from the
/// nearest regular neighbour.
fn fill_singular_u(uvs: &mut [Point2], singular: &[bool]) {
    if singular.iter().all(|s| *s) {
        return;
    }
    for i in 0..uvs.len() {
        if !singular[i] {
            continue;
        }
        let before = (0..i).rev().find(|&j| !singular[j]);
        let after = (i + 1..uvs.len()).find(|&j| !singular[j]);
        let source = match (before, after) {
            (Some(b), Some(a)) if a - i < i - b => a,
            (Some(b), _) => b,
            (None, Some(a)) => a,
            (None, None) => continue,
        };
        uvs[i].x = uvs[source].x;
    }
}

/// Make consecutive samples continuous across periodic seams, then shift
/// the whole run by whole periods so it overlaps `rect` as much as it can.
/// A run no wider than the rectangle lands entirely inside it.
pub(crate) fn unwrap_into_rect(uvs: &mut [Point2], rect: &BoundingRect, periodicity: &Periodicity) {
    if uvs.is_empty() {
        return;
    }
    for i in 1..uvs.len() {
        let prev = uvs[i - 1];
        if let Some(p) = periodicity.u {
            uvs[i].x = unwrap_periodic(prev.x, uvs[i].x, p);
        }
        if let Some(p) = periodicity.v {
            uvs[i].y = unwrap_periodic(prev.y, uvs[i].y, p);
        }
    }
    if let Some(p) = periodicity.u {
        let (lo, hi) = span(uvs.iter().map(|uv| uv.x));
        let shift = period_shift(lo, hi, rect.u_min(), rect.u_max(), p);
        uvs.iter_mut().for_each(|uv| uv.x += shift);
    }
    if let Some(p) = periodicity.v {
        let (lo, hi) = span(uvs.iter().map(|uv| uv.y));
        let shift = period_shift(lo, hi, rect.v_min(), rect.v_max(), p);
        uvs.iter_mut().for_each(|uv| uv.y += shift);
    }
}

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)))
}

/// Whole-period shift moving `[lo, hi]` onto `[r0, r1]`.
///
/// Candidates are the smallest shift putting `lo` at or above `r0` and the
/// one a period below it; the larger overlap wins, the first on ties.
fn period_shift(lo: f64, hi: f64, r0: f64, r1: f64, period: f64) -> f64 {
    if !(period > 0.0 && lo.is_finite() && hi.is_finite()) {
        return 0.0;
    }
    let eps = 1e-9 * period;
    let up = ((r0 - eps - lo) / period).ceil() * period;
    let overlap = |s: f64| (hi + s).min(r1) - (lo + s).max(r0);
    let down = up - period;
    if overlap(down) > overlap(up) + eps {
        down
    } else {
        up
    }
}
