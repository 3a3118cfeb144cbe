//! Cutting intersection curves down to the parameter rectangles.

use conix_geom::{Curve3d, DualSurfaceCurve, Line3d, Surface};
use conix_math::{adjust_periodic, unwrap_periodic, BoundingRect, Point2};

use super::Problem;

/// Relative margin of the inside test.
const INSIDE_REL: f64 = 1e-9;

/// Whether a parameter point lies in `rect`, up to whole periods.
pub(super) fn inside(s: &dyn Surface, rect: &BoundingRect, uv: Point2) -> bool {
    rect.contains_rel(&adjust_periodic(uv, rect, &s.periodicity()), INSIDE_REL)
}

/// The part of an unbounded line inside both rectangles, reparameterized
/// to `[0, 1]`; `None` when it misses either one.
pub(super) fn bound_line(p: &Problem, line: &Line3d) -> Option<Line3d> {
    let (lo_a, hi_a) = line_interval(line, p.a, p.rect_a)?;
    let (lo_b, hi_b) = line_interval(line, p.b, p.rect_b)?;
    let (lo, hi) = (lo_a.max(lo_b), hi_a.min(hi_b));
    if !(lo.is_finite() && hi.is_finite()) || hi - lo <= 1e-12 {
        return None;
    }
    Some(Line3d {
        origin: line.evaluate(lo),
        direction: (hi - lo) * line.direction,
    })
}

/// Line parameters mapping into `rect`, assuming the line's image in the
/// parameter space is affine. `None` when it is not.
fn line_interval(line: &Line3d, s: &dyn Surface, rect: &BoundingRect) -> Option<(f64, f64)> {
    let per = s.periodicity();
    let unwrap = |prev: Point2, uv: Point2| {
        Point2::new(
            per.u.map_or(uv.x, |q| unwrap_periodic(prev.x, uv.x, q)),
            per.v.map_or(uv.y, |q| unwrap_periodic(prev.y, uv.y, q)),
        )
    };
    let uv0 = s.position_of(&line.origin);
    let uv_half = unwrap(uv0, s.position_of(&line.evaluate(0.5)));
    let uv1 = unwrap(uv_half, s.position_of(&line.evaluate(1.0)));
    let mid = Point2::from((uv0.coords + uv1.coords) * 0.5);
    if (uv_half - mid).norm() > 1e-9 * (1.0 + uv0.coords.norm() + uv1.coords.norm()) {
        return None;
    }

    let shift = adjust_periodic(uv0, rect, &per) - uv0;
    let (uv0, uv1) = (uv0 + shift, uv1 + shift);
    let full = [
        per.u.is_some_and(|q| rect.width() >= q * (1.0 - 1e-12)),
        per.v.is_some_and(|q| rect.height() >= q * (1.0 - 1e-12)),
    ];
    let bounds = [(rect.u_min(), rect.u_max()), (rect.v_min(), rect.v_max())];

    let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
    for axis in 0..2 {
        if full[axis] {
            continue;
        }
        let (min, max) = bounds[axis];
        let eps = INSIDE_REL * (max - min).max(1.0);
        let (x0, dx) = (uv0[axis], uv1[axis] - uv0[axis]);
        if dx.abs() <= 1e-14 * (1.0 + x0.abs()) {
            if x0 < min - eps || x0 > max + eps {
                return Some((1.0, 0.0));
            }
            continue;
        }
        let (s0, s1) = ((min - x0) / dx, (max - x0) / dx);
        lo = lo.max(s0.min(s1));
        hi = hi.min(s0.max(s1));
    }
    Some((lo, hi))
}

/// Pieces of `dual` inside both rectangles.
///
/// Inside runs are found on `clip_samples` stations and their ends refined
/// by bisection. A closed curve whose inside run wraps past its start
/// comes back as two pieces.
pub(super) fn clip_to_rects(p: &Problem, dual: DualSurfaceCurve) -> Vec<DualSurfaceCurve> {
    let n = p.settings.clip_samples;
    let (t0, t1) = dual.domain();
    let at = |i: usize| t0 + (t1 - t0) * i as f64 / n as f64;
    let is_inside = |t: f64| {
        let sp = dual.point_at(t);
        inside(p.a, p.rect_a, sp.uv_a) && inside(p.b, p.rect_b, sp.uv_b)
    };
    let flags: Vec<bool> = (0..=n).map(|i| is_inside(at(i))).collect();
    if flags.iter().all(|&f| f) {
        return vec![dual];
    }

    let boundary = |outside: f64, inside: f64| {
        let (mut out, mut inn) = (outside, inside);
        for _ in 0..50 {
            let mid = 0.5 * (out + inn);
            if is_inside(mid) {
                inn = mid;
            } else {
                out = mid;
            }
        }
        inn
    };

    let min_len = 1e-6 * (t1 - t0).abs();
    let mut pieces = Vec::new();
    let mut i = 0;
    while i <= n {
        if !flags[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && flags[i + 1] {
            i += 1;
        }
        let end = i;
        let enter = if start == 0 { t0 } else { boundary(at(start - 1), at(start)) };
        let exit = if end == n { t1 } else { boundary(at(end + 1), at(end)) };
        if (exit - enter).abs() > min_len {
            pieces.push(dual.trimmed(enter, exit));
        }
        i += 1;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntersectSettings;
    use conix_geom::{CylinderSurface, Plane, SphereSurface};
    use conix_math::{Point3, Vec3, TAU};

    fn problem<'a>(
        a: &'a dyn Surface,
        rect_a: &'a BoundingRect,
        b: &'a dyn Surface,
        rect_b: &'a BoundingRect,
        settings: &'a IntersectSettings,
    ) -> Problem<'a> {
        Problem {
            a,
            rect_a,
            b,
            rect_b,
            settings,
            scale: 1.0,
            tol: 1e-7,
        }
    }

    #[test]
    fn test_inside_uses_periods() {
        let cyl = CylinderSurface::new(1.0);
        let rect = BoundingRect::new(0.0, 1.0, -1.0, 1.0).unwrap();
        assert!(inside(&cyl, &rect, Point2::new(0.5 + TAU, 0.0)));
        assert!(!inside(&cyl, &rect, Point2::new(2.0, 0.0)));
    }

    #[test]
    fn test_bound_line_ruling() {
        let plane = Plane::from_normal(Point3::new(1.0, 0.0, 0.0), Vec3::x());
        let cyl = CylinderSurface::new(1.0);
        let prect = BoundingRect::new(-5.0, 5.0, -5.0, 5.0).unwrap();
        let crect = BoundingRect::new(-1.0, 1.0, -2.0, 3.0).unwrap();
        let settings = IntersectSettings::default();
        let p = problem(&plane, &prect, &cyl, &crect, &settings);
        let line = cyl.ruling(0.0);
        let bounded = bound_line(&p, &line).unwrap();
        let (s, e) = (bounded.evaluate(0.0), bounded.evaluate(1.0));
        assert!((s.z.min(e.z) + 2.0).abs() < 1e-9);
        assert!((s.z.max(e.z) - 3.0).abs() < 1e-9);

        let outside = cyl.ruling(2.0);
        assert!(bound_line(&p, &outside).is_none());
    }

    #[test]
    fn test_clip_keeps_inside_arc() {
        let plane = Plane::xy();
        let sphere = SphereSurface::new(1.0);
        let prect = BoundingRect::new(-2.0, 2.0, 0.0, 2.0).unwrap();
        let srect = BoundingRect::new(0.0, TAU, -TAU / 4.0, TAU / 4.0).unwrap();
        let settings = IntersectSettings::default();
        let p = problem(&plane, &prect, &sphere, &srect, &settings);
        let equator = crate::intersect_surfaces(
            &plane,
            &BoundingRect::new(-2.0, 2.0, -2.0, 2.0).unwrap(),
            &sphere,
            &srect,
            &settings,
        )
        .unwrap()
        .remove(0);
        let pieces = clip_to_rects(&p, equator);
        assert_eq!(pieces.len(), 1);
        let arc = &pieces[0];
        for k in 0..=8 {
            let q = arc.curve.evaluate(k as f64 / 8.0);
            assert!(q.y >= -1e-6);
        }
        assert!((arc.curve.length() - TAU / 2.0).abs() < 1e-4);
    }
}
