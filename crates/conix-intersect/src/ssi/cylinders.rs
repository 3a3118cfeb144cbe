//! Intersection of two circular cylinders.
//!
//! Parallel axes give rulings. Equal radii with intersecting axes give the
//! two ellipses of a Steinmetz pair. Everything else is swept along the
//! rulings of the narrower cylinder: each ruling meets the wider cylinder
//! in at most two points, which form the lower and upper branches.

use std::f64::consts::{FRAC_PI_2, PI};

use conix_geom::{CylinderSurface, Ellipse3d, Line3d, Surface, SurfacePoint};
use conix_math::{poly, Dir3, Point2, Point3, Vec3, TAU};
use tracing::debug;

use super::{Piece, Problem};

/// Axes closer to parallel than this are treated as parallel.
const PARALLEL_SIN: f64 = 1e-9;

/// `None` when either cylinder is elliptical.
pub(super) fn cylinder_cylinder(
    p: &Problem,
    c1: &CylinderSurface,
    c2: &CylinderSurface,
) -> Option<Vec<Piece>> {
    let (o1, a1, r1) = c1.circular_axis()?;
    let (o2, a2, r2) = c2.circular_axis()?;
    let tol = p.tol;
    let (a1, a2) = (*a1.as_ref(), *a2.as_ref());

    if a1.cross(&a2).norm() <= PARALLEL_SIN {
        return Some(parallel(o1, a1, r1, o2, r2, tol));
    }

    // Closest points of the two axes
    let w0 = o1 - o2;
    let b = a1.dot(&a2);
    let den = 1.0 - b * b;
    let (d1, d2) = (a1.dot(&w0), a2.dot(&w0));
    let f1 = o1 + ((b * d2 - d1) / den) * a1;
    let f2 = o2 + ((d2 - b * d1) / den) * a2;
    let gap = (f1 - f2).norm();

    if (r1 - r2).abs() <= tol && gap <= tol {
        debug!(radius = r1, "steinmetz pair");
        return Some(steinmetz(nalgebra::center(&f1, &f2), a1, a2, r1));
    }
    Some(sweep(p, c1, c2))
}

/// Rulings shared by cylinders with parallel axes.
fn parallel(o1: Point3, axis: Vec3, r1: f64, o2: Point3, r2: f64, tol: f64) -> Vec<Piece> {
    let rel = o2 - o1;
    let perp = rel - rel.dot(&axis) * axis;
    let d = perp.norm();
    if d <= tol {
        // Coaxial: disjoint or coincident
        return Vec::new();
    }
    if d > r1 + r2 + tol || d < (r1 - r2).abs() - tol {
        return Vec::new();
    }
    let e = perp / d;
    let f = axis.cross(&e);
    let x = (d * d + r1 * r1 - r2 * r2) / (2.0 * d);
    let tangent = (d - (r1 + r2)).abs() <= tol || (d - (r1 - r2).abs()).abs() <= tol;
    let ys = if tangent {
        vec![0.0]
    } else {
        let y = (r1 * r1 - x * x).max(0.0).sqrt();
        vec![-y, y]
    };
    ys.into_iter()
        .map(|y| {
            Piece::Exact(Box::new(Line3d {
                origin: o1 + x * e + y * f,
                direction: axis,
            }))
        })
        .collect()
}

/// Four half-ellipse arcs meeting at the two points where the cylinders
/// touch.
///
/// The ellipses lie in the planes through the axis crossing that are
/// perpendicular to `a1 - a2` and `a1 + a2`.
fn steinmetz(center: Point3, a1: Vec3, a2: Vec3, r: f64) -> Vec<Piece> {
    let n = a1.cross(&a2).normalize();
    let (plus, minus) = (a1 + a2, a1 - a2);
    // cos and sin of half the angle between the axes
    let (half_cos, half_sin) = (plus.norm() / 2.0, minus.norm() / 2.0);
    let ellipses = [
        ((r / half_sin) * plus.normalize(), r * n),
        ((r / half_cos) * minus.normalize(), r * n),
    ];
    let mut out = Vec::with_capacity(4);
    for (major, minor) in ellipses {
        for start in [-FRAC_PI_2, FRAC_PI_2] {
            if let Some(e) = Ellipse3d::new(center, major, minor, start, PI) {
                out.push(Piece::Exact(Box::new(e)));
            }
        }
    }
    out
}

/// The narrower cylinder and which operand it is.
struct Narrow<'a> {
    cyl: &'a CylinderSurface,
    is_a: bool,
}

/// Sweep the rulings of the narrower cylinder.
fn sweep(p: &Problem, c1: &CylinderSurface, c2: &CylinderSurface) -> Vec<Piece> {
    let (narrow, wide) = if c1.radii().0 <= c2.radii().0 {
        (Narrow { cyl: c1, is_a: true }, c2)
    } else {
        (Narrow { cyl: c2, is_a: false }, c1)
    };
    let Some((o_n, a_n, r)) = narrow.cyl.circular_axis() else {
        return Vec::new();
    };
    let Some((o_w, a_w, big_r)) = wide.circular_axis() else {
        return Vec::new();
    };
    let tol = p.tol;
    let nhat = a_n.as_ref().cross(a_w.as_ref()).normalize();
    let frame = narrow.cyl.placement().forward();

    // Signed offset of the narrow ruling at u along the common normal:
    // h(u) = h0 + hx·cos u + hy·sin u
    let h0 = (o_n - o_w).dot(&nhat);
    let (hx, hy) = (frame.axis(0).dot(&nhat), frame.axis(1).dot(&nhat));
    let d = h0.abs();
    if d >= big_r + r - tol {
        return Vec::new();
    }
    let sigma = if h0 >= 0.0 { 1.0 } else { -1.0 };
    let peak = (sigma * hy).atan2(sigma * hx);
    let m = p.settings.ruling_samples();

    let ruling = |u: f64| ruling_hits(narrow.cyl, o_w, a_w, big_r, u);
    let point = |u: f64, v: f64| {
        let uv_n = Point2::new(u, v);
        let q = narrow.cyl.evaluate(uv_n);
        let uv_w = wide.position_of(&q);
        let (uv_a, uv_b) = if narrow.is_a { (uv_n, uv_w) } else { (uv_w, uv_n) };
        SurfacePoint {
            point: q,
            uv_a,
            uv_b,
        }
    };

    if d <= big_r - r + tol {
        // Full penetration: two closed loops; internal tangency starts both
        // loops at the shared point.
        let tangent = d >= big_r - r - tol;
        debug!(tangent, "cylinder sweep, full penetration");
        let us: Vec<f64> = (0..=m)
            .map(|i| {
                let s = i as f64 / m as f64;
                let s = if tangent { cosine_spacing(s) } else { s };
                peak + TAU * s
            })
            .collect();
        let mut lower = Vec::with_capacity(m + 1);
        let mut upper = Vec::with_capacity(m + 1);
        for &u in &us {
            let (vl, vu) = ruling(u);
            lower.push(point(u, vl));
            upper.push(point(u, vu));
        }
        return vec![Piece::Sampled(lower), Piece::Sampled(upper)];
    }

    // Half penetration: rulings with σ·h(u) <= R form one arc of u
    // centered on the minimum of σ·h.
    let roots = poly::solve_trig(sigma * hx, sigma * hy, big_r - sigma * h0);
    if roots.len() < 2 {
        return Vec::new();
    }
    let low = peak + PI;
    let wrap = |u: f64| (u - low + PI).rem_euclid(TAU) - PI;
    let (d0, d1) = (wrap(roots[0]), wrap(roots[1]));
    let (start, end) = (low + d0.min(d1), low + d0.max(d1));
    debug!(start, end, "cylinder sweep, half penetration");

    let us: Vec<f64> = (0..=m)
        .map(|i| start + (end - start) * cosine_spacing(i as f64 / m as f64))
        .collect();
    let mut lower = Vec::with_capacity(m + 1);
    let mut upper = Vec::with_capacity(m + 1);
    for &u in &us {
        let (vl, vu) = ruling(u);
        lower.push(point(u, vl));
        upper.push(point(u, vu));
    }
    // One loop: forward along the lower branch, back along the upper
    let mut closed = lower;
    closed.extend(upper.into_iter().rev().skip(1));
    vec![Piece::Sampled(closed)]
}

/// `(1 - cos πs) / 2`: clusters samples at both ends of `[0, 1]`.
fn cosine_spacing(s: f64) -> f64 {
    0.5 * (1.0 - (PI * s).cos())
}

/// Lower and upper `v` where the ruling of `narrow` at `u` meets the wide
/// cylinder through `o_w` along `a_w` with radius `big_r`. Slightly
/// negative discriminants at the branch ends are clamped to zero.
fn ruling_hits(
    narrow: &CylinderSurface,
    o_w: Point3,
    a_w: Dir3,
    big_r: f64,
    u: f64,
) -> (f64, f64) {
    let a_w = a_w.as_ref();
    let q = narrow.evaluate(Point2::new(u, 0.0)) - o_w;
    let dq = narrow.axis();
    let q_perp = q - q.dot(a_w) * a_w;
    let dq_perp = dq - dq.dot(a_w) * a_w;
    let a = dq_perp.norm_squared();
    let b = 2.0 * q_perp.dot(&dq_perp);
    let c = q_perp.norm_squared() - big_r * big_r;
    let disc = (b * b - 4.0 * a * c).max(0.0).sqrt();
    ((-b - disc) / (2.0 * a), (-b + disc) / (2.0 * a))
}
