//! Curve/curve intersection.
//!
//! Lines and ellipses are solved in closed form; any other pairing is
//! handled by Newton's method on the squared distance from a grid of seeds.

use conix_geom::{Curve3d, Ellipse3d, Line3d};
use conix_math::{poly, Point3, Vec3};
use conix_solve::{NewtonMinimizer, ScalarObjective};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::{dedup_by_point, in_interval, IntersectSettings, Result};

/// A point shared by two curves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveCurveHit {
    /// World position (midpoint of the two curve points).
    pub point: Point3,
    /// Parameter on the first curve.
    pub t_a: f64,
    /// Parameter on the second curve.
    pub t_b: f64,
}

/// Points where `a` and `b` meet within their parameter domains, sorted by
/// `t_a`.
///
/// Overlapping curves (collinear lines, coincident ellipses) have no
/// isolated hits and yield an empty result.
pub fn intersect_curves(
    a: &dyn Curve3d,
    b: &dyn Curve3d,
    settings: &IntersectSettings,
) -> Result<Vec<CurveCurveHit>> {
    settings.validate()?;
    let scale = a
        .bounding_box()
        .diagonal()
        .max(b.bounding_box().diagonal())
        .max(1.0);
    let tol = settings.tolerance * scale;

    let candidates = match (Analytic::of(a), Analytic::of(b)) {
        (Analytic::Line(l1), Analytic::Line(l2)) => line_line(l1, l2).into_iter().collect(),
        (Analytic::Line(l), Analytic::Ellipse(e)) => line_ellipse(l, e, tol),
        (Analytic::Ellipse(e), Analytic::Line(l)) => line_ellipse(l, e, tol)
            .into_iter()
            .map(|(s, t)| (t, s))
            .collect(),
        (Analytic::Ellipse(e1), Analytic::Ellipse(e2)) => ellipse_ellipse(e1, e2, tol),
        _ => newton_candidates(a, b, settings, tol),
    };

    let mut hits: Vec<CurveCurveHit> = candidates
        .into_iter()
        .filter_map(|(ta, tb)| {
            let t_a = in_interval(ta, a.domain())?;
            let t_b = in_interval(tb, b.domain())?;
            let (pa, pb) = (a.evaluate(t_a), b.evaluate(t_b));
            ((pa - pb).norm() <= tol).then(|| CurveCurveHit {
                point: nalgebra::center(&pa, &pb),
                t_a,
                t_b,
            })
        })
        .collect();
    hits.sort_by(|x, y| x.t_a.total_cmp(&y.t_a));
    let hits = dedup_by_point(hits, 10.0 * tol, |h| h.point);
    debug!(
        kind_a = ?a.curve_type(),
        kind_b = ?b.curve_type(),
        hits = hits.len(),
        "curve/curve intersection"
    );
    Ok(hits)
}

enum Analytic<'a> {
    Line(&'a Line3d),
    Ellipse(&'a Ellipse3d),
    Other,
}

impl<'a> Analytic<'a> {
    fn of(c: &'a dyn Curve3d) -> Self {
        let any = c.as_any();
        if let Some(l) = any.downcast_ref::<Line3d>() {
            Self::Line(l)
        } else if let Some(e) = any.downcast_ref::<Ellipse3d>() {
            Self::Ellipse(e)
        } else {
            Self::Other
        }
    }
}

/// Coordinates of `v` in the ellipse's conjugate frame: `v = α·major + β·minor`
/// for vectors in the ellipse plane.
pub(crate) fn conjugate_coords(e: &Ellipse3d, v: &Vec3) -> (f64, f64) {
    let (m, n) = (e.major_axis(), e.minor_axis());
    let (aa, ab, bb) = (m.dot(&m), m.dot(&n), n.dot(&n));
    let (qa, qb) = (v.dot(&m), v.dot(&n));
    let det = aa * bb - ab * ab;
    ((qa * bb - qb * ab) / det, (qb * aa - qa * ab) / det)
}

/// Parameters of the closest approach of two lines; `None` when parallel.
fn line_line(l1: &Line3d, l2: &Line3d) -> Option<(f64, f64)> {
    let (d1, d2) = (l1.direction, l2.direction);
    let w = l1.origin - l2.origin;
    let (a, b, c) = (d1.dot(&d1), d1.dot(&d2), d2.dot(&d2));
    let (d, e) = (d1.dot(&w), d2.dot(&w));
    let den = a * c - b * b;
    if den <= 1e-14 * a * c {
        return None;
    }
    Some(((b * e - c * d) / den, (a * e - b * d) / den))
}

/// `(t_line, t_ellipse)` candidates.
fn line_ellipse(l: &Line3d, e: &Ellipse3d, tol: f64) -> Vec<(f64, f64)> {
    let n = e.normal();
    let c = e.center();
    let dn = n.dot(&l.direction);
    if dn.abs() > 1e-12 * l.direction.norm() {
        // Plane cut, then on-curve test
        let s = n.dot(&(c - l.origin)) / dn;
        let q = l.evaluate(s);
        let theta = e.angle_of(&q);
        if (e.point_at_angle(theta) - q).norm() > tol {
            return Vec::new();
        }
        return vec![(s, e.param_of_angle(theta))];
    }
    if n.dot(&(l.origin - c)).abs() > tol {
        return Vec::new();
    }
    // Coplanar: α(s)² + β(s)² = 1
    let (a0, b0) = conjugate_coords(e, &(l.origin - c));
    let (a1, b1) = conjugate_coords(e, &l.direction);
    poly::solve_quadratic(
        a1 * a1 + b1 * b1,
        2.0 * (a0 * a1 + b0 * b1),
        a0 * a0 + b0 * b0 - 1.0,
    )
    .into_iter()
    .map(|s| {
        let theta = (b0 + s * b1).atan2(a0 + s * a1);
        (s, e.param_of_angle(theta))
    })
    .collect()
}

/// `(t_1, t_2)` candidates for two ellipses.
fn ellipse_ellipse(e1: &Ellipse3d, e2: &Ellipse3d, tol: f64) -> Vec<(f64, f64)> {
    let (n1, n2) = (e1.normal(), e2.normal());
    let (c1, c2) = (e1.center(), e2.center());
    let (m1, k1) = (e1.major_axis(), e1.minor_axis());

    let angles: Vec<f64> = if n1.cross(&n2).norm() > 1e-9 {
        // Points of e1 on the plane of e2
        poly::solve_trig(n2.dot(&m1), n2.dot(&k1), n2.dot(&(c2 - c1)))
    } else if n2.dot(&(c1 - c2)).abs() > tol {
        Vec::new()
    } else {
        coplanar_ellipse_angles(e1, e2, tol)
    };

    angles
        .into_iter()
        .filter_map(|theta| {
            let q = e1.point_at_angle(theta);
            let phi = e2.angle_of(&q);
            ((e2.point_at_angle(phi) - q).norm() <= tol)
                .then(|| (e1.param_of_angle(theta), e2.param_of_angle(phi)))
        })
        .collect()
}

/// Angles of e1 on the (coplanar) e2, via the half-angle substitution
/// `w = tan(θ/2)`. `θ = π` has no finite `w` and is checked directly by
/// its distance to e2.
fn coplanar_ellipse_angles(e1: &Ellipse3d, e2: &Ellipse3d, tol: f64) -> Vec<f64> {
    let (ac, bc) = conjugate_coords(e2, &(e1.center() - e2.center()));
    let (am, bm) = conjugate_coords(e2, &e1.major_axis());
    let (ak, bk) = conjugate_coords(e2, &e1.minor_axis());
    // (1 + w²)·α(θ) as a quadratic in w, highest degree first
    let pa = [ac - am, 2.0 * ak, ac + am];
    let pb = [bc - bm, 2.0 * bk, bc + bm];
    let sa = poly_square(&pa);
    let sb = poly_square(&pb);
    let one = poly_square(&[1.0, 0.0, 1.0]);
    let q: Vec<f64> = (0..5).map(|i| sa[i] + sb[i] - one[i]).collect();
    let scale = sa.iter().chain(&sb).fold(1.0_f64, |m, c| m.max(c.abs()));
    if q.iter().all(|c| c.abs() <= 1e-12 * scale) {
        trace!("coincident ellipses have no isolated intersections");
        return Vec::new();
    }
    let mut angles: Vec<f64> = poly::solve_quartic(q[0], q[1], q[2], q[3], q[4])
        .into_iter()
        .map(|w| 2.0 * w.atan())
        .collect();
    let q_pi = e1.point_at_angle(std::f64::consts::PI);
    if (e2.point_at_angle(e2.angle_of(&q_pi)) - q_pi).norm() <= tol {
        angles.push(std::f64::consts::PI);
    }
    angles
}

fn poly_square(p: &[f64; 3]) -> [f64; 5] {
    let mut out = [0.0; 5];
    for i in 0..3 {
        for j in 0..3 {
            out[i + j] += p[i] * p[j];
        }
    }
    out
}

/// `|A(s) - B(t)|²` over both curve parameters.
struct CurveDistance<'a> {
    a: &'a dyn Curve3d,
    b: &'a dyn Curve3d,
}

impl ScalarObjective for CurveDistance<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn value(&self, x: &DVector<f64>) -> Option<f64> {
        Some((self.a.evaluate(x[0]) - self.b.evaluate(x[1])).norm_squared())
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let d = self.a.evaluate(x[0]) - self.b.evaluate(x[1]);
        Some(DVector::from_vec(vec![
            2.0 * d.dot(&self.a.tangent(x[0])),
            -2.0 * d.dot(&self.b.tangent(x[1])),
        ]))
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let d = self.a.evaluate(x[0]) - self.b.evaluate(x[1]);
        let (ta, tb) = (self.a.tangent(x[0]), self.b.tangent(x[1]));
        let hss = 2.0 * (ta.dot(&ta) + d.dot(&self.a.second_derivative(x[0])));
        let hst = -2.0 * ta.dot(&tb);
        let htt = 2.0 * (tb.dot(&tb) - d.dot(&self.b.second_derivative(x[1])));
        Some(DMatrix::from_row_slice(2, 2, &[hss, hst, hst, htt]))
    }
}

/// Evenly spaced samples of a curve with the largest chord between them.
fn sample_curve(c: &dyn Curve3d, n: usize) -> (Vec<f64>, Vec<Point3>, f64) {
    let (t0, t1) = c.domain();
    let ts: Vec<f64> = (0..=n).map(|i| t0 + (t1 - t0) * i as f64 / n as f64).collect();
    let pts: Vec<Point3> = ts.iter().map(|t| c.evaluate(*t)).collect();
    let chord = pts
        .windows(2)
        .map(|w| (w[1] - w[0]).norm())
        .fold(0.0, f64::max);
    (ts, pts, chord)
}

fn newton_candidates(
    a: &dyn Curve3d,
    b: &dyn Curve3d,
    settings: &IntersectSettings,
    tol: f64,
) -> Vec<(f64, f64)> {
    let na = (2 * a.suggested_segments()).clamp(16, 128);
    let nb = (2 * b.suggested_segments()).clamp(16, 128);
    let (ta, pa, ca) = sample_curve(a, na);
    let (tb, pb, cb) = sample_curve(b, nb);
    let reach = ca + cb + tol;

    let dist = |i: usize, j: usize| (pa[i] - pb[j]).norm();
    let mut seeds = Vec::new();
    for i in 0..=na {
        for j in 0..=nb {
            let d = dist(i, j);
            if d > reach {
                continue;
            }
            let local_min = (i.saturating_sub(1)..=(i + 1).min(na)).all(|k| {
                (j.saturating_sub(1)..=(j + 1).min(nb)).all(|l| dist(k, l) >= d)
            });
            if local_min {
                seeds.push((d, i, j));
            }
        }
    }
    seeds.sort_by(|x, y| x.0.total_cmp(&y.0));
    seeds.truncate(32);

    let solver = NewtonMinimizer::new(settings.solver.clone());
    let objective = CurveDistance { a, b };
    seeds
        .into_iter()
        .filter_map(|(_, i, j)| {
            match solver.minimize(&objective, DVector::from_vec(vec![ta[i], tb[j]])) {
                Ok(sol) if sol.residual.sqrt() <= tol => Some((sol.params[0], sol.params[1])),
                Ok(sol) => {
                    trace!(i, j, distance = sol.residual.sqrt(), "curve seed did not meet");
                    None
                }
                Err(err) => {
                    trace!(i, j, %err, "curve seed solve failed");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_geom::BSplineCurve;
    use conix_math::TAU;

    fn run(a: &dyn Curve3d, b: &dyn Curve3d) -> Vec<CurveCurveHit> {
        intersect_curves(a, b, &IntersectSettings::default()).unwrap()
    }

    #[test]
    fn test_crossing_segments() {
        let a = Line3d::from_points(Point3::origin(), Point3::new(2.0, 2.0, 0.0));
        let b = Line3d::from_points(Point3::new(0.0, 2.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        let hits = run(&a, &b);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((hits[0].t_a - 0.5).abs() < 1e-12);
        assert!((hits[0].t_b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_skew_and_parallel_lines_miss() {
        let a = Line3d::from_points(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let skew = Line3d::from_points(Point3::new(0.5, -1.0, 1.0), Point3::new(0.5, 1.0, 1.0));
        let parallel = Line3d::from_points(Point3::new(0.0, 1.0, 0.0), Point3::new(1.0, 1.0, 0.0));
        assert!(run(&a, &skew).is_empty());
        assert!(run(&a, &parallel).is_empty());
    }

    #[test]
    fn test_segments_outside_interval() {
        let a = Line3d::from_points(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let b = Line3d::from_points(Point3::new(2.0, -1.0, 0.0), Point3::new(2.0, 1.0, 0.0));
        assert!(run(&a, &b).is_empty());
    }

    #[test]
    fn test_line_through_coplanar_circle() {
        let circle = Ellipse3d::circle(Point3::origin(), Vec3::z(), 1.0).unwrap();
        let line = Line3d::from_points(Point3::new(-2.0, 0.5, 0.0), Point3::new(2.0, 0.5, 0.0));
        let hits = run(&line, &circle);
        assert_eq!(hits.len(), 2);
        let x = 0.75f64.sqrt();
        assert!((hits[0].point - Point3::new(-x, 0.5, 0.0)).norm() < 1e-9);
        assert!((hits[1].point - Point3::new(x, 0.5, 0.0)).norm() < 1e-9);
        for h in &hits {
            assert!((circle.evaluate(h.t_b) - h.point).norm() < 1e-9);
        }
    }

    #[test]
    fn test_line_piercing_circle_plane() {
        let circle = Ellipse3d::circle(Point3::origin(), Vec3::z(), 1.0).unwrap();
        let through = Line3d::from_points(Point3::new(0.0, 1.0, -1.0), Point3::new(0.0, 1.0, 1.0));
        let inside = Line3d::from_points(Point3::new(0.0, 0.5, -1.0), Point3::new(0.0, 0.5, 1.0));
        let hits = run(&circle, &through);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].t_b - 0.5).abs() < 1e-12);
        assert!(run(&circle, &inside).is_empty());
    }

    #[test]
    fn test_coplanar_circles() {
        let a = Ellipse3d::circle(Point3::origin(), Vec3::z(), 1.0).unwrap();
        let b = Ellipse3d::circle(Point3::new(1.0, 0.0, 0.0), Vec3::z(), 1.0).unwrap();
        let hits = run(&a, &b);
        assert_eq!(hits.len(), 2);
        for h in &hits {
            assert!((h.point.x - 0.5).abs() < 1e-9);
            assert!((h.point.y.abs() - 0.75f64.sqrt()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tangent_circles_at_half_turn() {
        // The contact sits at angle π of the first circle
        let a = Ellipse3d::new(Point3::origin(), Vec3::x(), Vec3::y(), 0.0, TAU).unwrap();
        let b = Ellipse3d::circle(Point3::new(-2.0, 0.0, 0.0), Vec3::z(), 1.0).unwrap();
        let hits = run(&a, &b);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point - Point3::new(-1.0, 0.0, 0.0)).norm() < 1e-9);
        assert!((hits[0].t_a - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_large_circles_touching_at_half_turn() {
        // A 1e-5 gap is within tolerance at this size
        let r = 1000.0;
        let a = Ellipse3d::new(Point3::origin(), r * Vec3::x(), r * Vec3::y(), 0.0, TAU).unwrap();
        let b = Ellipse3d::circle(Point3::new(-2.0 * r - 1e-5, 0.0, 0.0), Vec3::z(), r).unwrap();
        let hits = run(&a, &b);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].point - Point3::new(-r, 0.0, 0.0)).norm() < 1e-4);
        assert!((hits[0].t_a - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_coincident_circles_have_no_isolated_hits() {
        let a = Ellipse3d::circle(Point3::origin(), Vec3::z(), 1.0).unwrap();
        assert!(run(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_perpendicular_circles() {
        let a = Ellipse3d::new(Point3::origin(), Vec3::x(), Vec3::y(), 0.0, TAU).unwrap();
        let b = Ellipse3d::new(Point3::origin(), Vec3::x(), Vec3::z(), 0.0, TAU).unwrap();
        let hits = run(&a, &b);
        assert_eq!(hits.len(), 2);
        for h in &hits {
            assert!((h.point.x.abs() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spline_against_line() {
        let pts: Vec<Point3> = (0..=20)
            .map(|i| {
                let x = -1.0 + i as f64 / 10.0;
                Point3::new(x, x * x, 0.0)
            })
            .collect();
        let spline = BSplineCurve::interpolate_chord(&pts).unwrap();
        let line = Line3d::from_points(Point3::new(-2.0, 0.25, 0.0), Point3::new(2.0, 0.25, 0.0));
        let hits = run(&spline, &line);
        assert_eq!(hits.len(), 2);
        for h in &hits {
            assert!((spline.evaluate(h.t_a) - line.evaluate(h.t_b)).norm() < 1e-6);
            assert!((h.point.x.abs() - 0.5).abs() < 1e-3);
        }
    }
}
