//! Marching tracer for surface pairs without a closed form.
//!
//! Seeds come from cylinder rulings, torus meridians, and sign changes of
//! each implicit form sampled over the other surface. Points where the
//! surfaces touch split the rectangles, so no fragment runs through one.
//! Inside each sub-rectangle pair the tracer marches from every unconsumed
//! seed in both directions; fragments whose ends meet away from touching
//! points are merged afterwards.

use conix_geom::{Curve3d, CylinderSurface, Ellipse3d, Surface, SurfacePoint, TorusSurface};
use conix_math::{
    adjust_periodic, unwrap_periodic, BoundingRect, Periodicity, Point2, Point3, Vec2, Vec3, TAU,
};
use conix_solve::{Bounds, LeastSquaresModel, LevenbergMarquardt, ResidualFn, TrustRegion};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use super::{bbox, Piece, Problem};
use crate::curve_surface::{bisect, intersect_curve_surface, line_cylinder, line_implicit};
use crate::{dedup_by_point, downcast, ImplicitField};

/// Largest tangent turn accepted in one marching step, in radians.
const MAX_TURN: f64 = 0.15;

/// Most touching points used to split the rectangles.
const MAX_TOUCHING: usize = 8;

// =============================================================================
// Point refinement
// =============================================================================

/// `A(ua, va) - B(ub, vb)`, plus `(A - q)·t` when a marching plane is set.
pub(super) struct PairGap<'a> {
    a: &'a dyn Surface,
    b: &'a dyn Surface,
    plane: Option<(Point3, Vec3)>,
}

impl LeastSquaresModel for PairGap<'_> {
    fn num_params(&self) -> usize {
        4
    }

    fn num_residuals(&self) -> usize {
        3 + usize::from(self.plane.is_some())
    }

    fn residual(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let (uv_a, uv_b) = unpack(x);
        let pa = self.a.evaluate(uv_a);
        let gap = pa - self.b.evaluate(uv_b);
        let mut r = DVector::zeros(self.num_residuals());
        for i in 0..3 {
            r[i] = gap[i];
        }
        if let Some((q, t)) = &self.plane {
            r[3] = (pa - q).dot(t);
        }
        Some(r)
    }

    fn jacobian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        let (uv_a, uv_b) = unpack(x);
        let (au, av) = (self.a.d_du(uv_a), self.a.d_dv(uv_a));
        let (bu, bv) = (self.b.d_du(uv_b), self.b.d_dv(uv_b));
        let mut j = DMatrix::zeros(self.num_residuals(), 4);
        for i in 0..3 {
            j[(i, 0)] = au[i];
            j[(i, 1)] = av[i];
            j[(i, 2)] = -bu[i];
            j[(i, 3)] = -bv[i];
        }
        if let Some((_, t)) = &self.plane {
            j[(3, 0)] = au.dot(t);
            j[(3, 1)] = av.dot(t);
        }
        Some(j)
    }
}

fn pack(uv_a: Point2, uv_b: Point2) -> DVector<f64> {
    DVector::from_vec(vec![uv_a.x, uv_a.y, uv_b.x, uv_b.y])
}

fn unpack(x: &DVector<f64>) -> (Point2, Point2) {
    (Point2::new(x[0], x[1]), Point2::new(x[2], x[3]))
}

/// Accept a solved parameter vector when every residual is within the
/// tolerance.
fn accept(p: &Problem, model: &PairGap, x: &DVector<f64>) -> Option<SurfacePoint> {
    let r = model.residual(x)?;
    if !(r.norm() <= p.tol) {
        return None;
    }
    let (uv_a, uv_b) = unpack(x);
    Some(SurfacePoint {
        point: nalgebra::center(&p.a.evaluate(uv_a), &p.b.evaluate(uv_b)),
        uv_a,
        uv_b,
    })
}

/// Polish a parameter guess onto the intersection, optionally constrained
/// to a plane.
pub(super) fn refine(
    p: &Problem,
    uv_a: Point2,
    uv_b: Point2,
    plane: Option<(Point3, Vec3)>,
) -> Option<SurfacePoint> {
    let model = PairGap {
        a: p.a,
        b: p.b,
        plane,
    };
    let sol = LevenbergMarquardt::new(p.settings.solver.clone())
        .solve(&model, pack(uv_a, uv_b))
        .ok()?;
    accept(p, &model, &sol.params)
}

/// Axes of `rect` spanning at least a whole period.
fn full_axes(per: &Periodicity, rect: &BoundingRect) -> [bool; 2] {
    [
        per.u.is_some_and(|q| rect.width() >= q * (1.0 - 1e-9)),
        per.v.is_some_and(|q| rect.height() >= q * (1.0 - 1e-9)),
    ]
}

/// Polish a seed guess with the parameters held inside the rectangles.
fn refine_bounded(p: &Problem, uv_a: Point2, uv_b: Point2) -> Option<SurfacePoint> {
    let mut lower = Vec::with_capacity(4);
    let mut upper = Vec::with_capacity(4);
    for (s, rect) in [(p.a, p.rect_a), (p.b, p.rect_b)] {
        let full = full_axes(&s.periodicity(), rect);
        let ranges = [(rect.u_min(), rect.u_max()), (rect.v_min(), rect.v_max())];
        for axis in 0..2 {
            let (lo, hi) = if full[axis] {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                ranges[axis]
            };
            lower.push(lo);
            upper.push(hi);
        }
    }
    let bounds = Bounds::new(DVector::from_vec(lower), DVector::from_vec(upper)).ok()?;
    let model = PairGap {
        a: p.a,
        b: p.b,
        plane: None,
    };
    let sol = TrustRegion::new(p.settings.solver.clone())
        .solve(&model, pack(uv_a, uv_b), &bounds)
        .ok()?;
    accept(p, &model, &sol.params)
}

/// Shift both parameter points into their rectangles by whole periods.
fn normalize(p: &Problem, sp: SurfacePoint) -> SurfacePoint {
    SurfacePoint {
        uv_a: adjust_periodic(sp.uv_a, p.rect_a, &p.a.periodicity()),
        uv_b: adjust_periodic(sp.uv_b, p.rect_b, &p.b.periodicity()),
        ..sp
    }
}

/// `target` with its parameters unwrapped to lie next to `reference`.
fn continuous(p: &Problem, reference: &SurfacePoint, target: &SurfacePoint) -> SurfacePoint {
    SurfacePoint {
        uv_a: unwrap_near(&p.a.periodicity(), reference.uv_a, target.uv_a),
        uv_b: unwrap_near(&p.b.periodicity(), reference.uv_b, target.uv_b),
        ..*target
    }
}

fn unwrap_near(per: &Periodicity, reference: Point2, uv: Point2) -> Point2 {
    Point2::new(
        per.u.map_or(uv.x, |q| unwrap_periodic(reference.x, uv.x, q)),
        per.v.map_or(uv.y, |q| unwrap_periodic(reference.y, uv.y, q)),
    )
}

// =============================================================================
// Seeds
// =============================================================================

type Guess = (Point2, Point2);

fn swap_guesses(guesses: Vec<Guess>) -> Vec<Guess> {
    guesses.into_iter().map(|(a, b)| (b, a)).collect()
}

/// Rulings of a cylinder `a` crossed with `b`.
fn ruling_seeds(p: &Problem) -> Vec<Guess> {
    let Some(cyl) = downcast::<CylinderSurface>(p.a) else {
        return Vec::new();
    };
    let n = p.settings.seed_grid;
    let mut out = Vec::new();
    for k in 0..n {
        let u = p.rect_a.u_min() + (k as f64 + 0.5) / n as f64 * p.rect_a.width();
        let line = cyl.ruling(u);
        let ts = match downcast::<CylinderSurface>(p.b) {
            Some(other) => line_cylinder(&line, other),
            None => line_implicit(&line, p.b).unwrap_or_default(),
        };
        for s in ts {
            let q = line.evaluate(s);
            out.push((Point2::new(u, s), p.b.position_of(&q)));
        }
    }
    out
}

/// Meridian circles of a torus `b` crossed with `a`.
fn meridian_seeds(p: &Problem) -> Vec<Guess> {
    let Some(torus) = downcast::<TorusSurface>(p.b) else {
        return Vec::new();
    };
    let n = p.settings.cross_sections;
    let mut out = Vec::new();
    for k in 0..n {
        let u = p.rect_b.u_min() + (k as f64 + 0.5) / n as f64 * p.rect_b.width();
        let (center, radial, r) = torus.meridian(u);
        // Circle angle equals the torus v
        let Some(circle) = Ellipse3d::new(center, r * radial, r * torus.axis.as_ref(), 0.0, TAU)
        else {
            continue;
        };
        let hits = intersect_curve_surface(&circle, p.a, p.rect_a, p.settings).unwrap_or_default();
        out.extend(hits.into_iter().map(|h| (h.uv, Point2::new(u, TAU * h.t))));
    }
    out
}

/// Zeros of `b`'s implicit form along the grid lines of `a`'s rectangle.
fn sign_change_seeds(p: &Problem, fb: &ImplicitField) -> Vec<Guess> {
    let g = p.settings.seed_grid;
    let node = |i: usize, j: usize| p.rect_a.lerp(i as f64 / g as f64, j as f64 / g as f64);
    let f_at = |uv: Point2| fb.value(&p.a.evaluate(uv));
    let values: Vec<f64> = (0..=g)
        .flat_map(|i| (0..=g).map(move |j| (i, j)))
        .map(|(i, j)| f_at(node(i, j)))
        .collect();
    let idx = |i: usize, j: usize| i * (g + 1) + j;

    let mut out = Vec::new();
    for i in 0..=g {
        for j in 0..=g {
            for (di, dj) in [(1, 0), (0, 1)] {
                let (i1, j1) = (i + di, j + dj);
                if i1 > g || j1 > g {
                    continue;
                }
                let (f0, f1) = (values[idx(i, j)], values[idx(i1, j1)]);
                if f0 * f1 > 0.0 {
                    continue;
                }
                let (n0, n1) = (node(i, j), node(i1, j1));
                let s = bisect(|s| f_at(n0 + s * (n1 - n0)), 0.0, 1.0);
                let uv = n0 + s * (n1 - n0);
                out.push((uv, p.b.position_of(&p.a.evaluate(uv))));
            }
        }
    }
    out
}

/// Polished seeds inside both rectangles, one per neighbourhood.
fn seeds(p: &Problem, fa: Option<&ImplicitField>, fb: Option<&ImplicitField>) -> Vec<SurfacePoint> {
    let q = p.swapped();
    let mut guesses = ruling_seeds(p);
    guesses.extend(swap_guesses(ruling_seeds(&q)));
    guesses.extend(meridian_seeds(p));
    guesses.extend(swap_guesses(meridian_seeds(&q)));
    if let Some(fb) = fb {
        guesses.extend(sign_change_seeds(p, fb));
    }
    if let Some(fa) = fa {
        guesses.extend(swap_guesses(sign_change_seeds(&q, fa)));
    }
    trace!(guesses = guesses.len(), "seed guesses");

    let polished: Vec<SurfacePoint> = guesses
        .into_iter()
        .filter_map(|(a, b)| refine_bounded(p, a, b))
        .map(|sp| normalize(p, sp))
        .filter(|sp| p.rect_a.contains_rel(&sp.uv_a, 1e-9) && p.rect_b.contains_rel(&sp.uv_b, 1e-9))
        .collect();
    dedup_by_point(polished, 0.05 * p.step(), |sp| sp.point)
}

// =============================================================================
// Touching points
// =============================================================================

/// Points where the surfaces touch: both implicit forms vanish and their
/// gradients are parallel.
fn touching_points(p: &Problem, fa: &ImplicitField, fb: &ImplicitField) -> Vec<SurfacePoint> {
    let g = p.settings.seed_grid;
    let node = |i: usize, j: usize| p.rect_a.lerp(i as f64 / g as f64, j as f64 / g as f64);
    let distance = |q: &Point3| {
        let grad = fb.gradient(q).norm();
        if grad > 1e-300 {
            fb.value(q).abs() / grad
        } else {
            f64::INFINITY
        }
    };

    // Grid nodes close to b with nearly parallel normals, local minima only
    let mut candidates: Vec<(f64, Point3)> = Vec::new();
    for i in 0..=g {
        for j in 0..=g {
            let uv = node(i, j);
            let q = p.a.evaluate(uv);
            let d = distance(&q);
            let cell = (p.a.evaluate(node((i + 1).min(g), j)) - p.a.evaluate(node(i.saturating_sub(1), j)))
                .norm()
                .max(
                    (p.a.evaluate(node(i, (j + 1).min(g))) - p.a.evaluate(node(i, j.saturating_sub(1))))
                        .norm(),
                );
            if !(d <= cell) {
                continue;
            }
            let gb = fb.gradient(&q).normalize();
            if p.a.normal(uv).as_ref().cross(&gb).norm() > 0.3 {
                continue;
            }
            let neighbours = [
                (i.wrapping_sub(1), j),
                (i + 1, j),
                (i, j.wrapping_sub(1)),
                (i, j + 1),
            ];
            let minimum = neighbours
                .iter()
                .filter(|(ni, nj)| *ni <= g && *nj <= g)
                .all(|&(ni, nj)| distance(&p.a.evaluate(node(ni, nj))) >= d);
            if minimum {
                candidates.push((d, q));
            }
        }
    }
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));
    candidates.truncate(4 * MAX_TOUCHING);

    let weight = p.scale;
    let model = ResidualFn::new(3, 5, |x: &DVector<f64>| {
        let q = Point3::new(x[0], x[1], x[2]);
        let (ga, gb) = (fa.gradient(&q), fb.gradient(&q));
        let (na, nb) = (ga.norm(), gb.norm());
        if na <= 1e-300 || nb <= 1e-300 {
            return None;
        }
        let c = ga.cross(&gb) * (weight / (na * nb));
        Some(DVector::from_vec(vec![
            fa.value(&q) / na,
            fb.value(&q) / nb,
            c.x,
            c.y,
            c.z,
        ]))
    });
    let solver = LevenbergMarquardt::new(p.settings.solver.clone());

    let mut found = Vec::new();
    for (_, q0) in candidates {
        let Ok(sol) = solver.solve(&model, DVector::from_column_slice(q0.coords.as_slice())) else {
            continue;
        };
        if !(sol.residual <= p.tol) {
            continue;
        }
        let q = Point3::new(sol.params[0], sol.params[1], sol.params[2]);
        let uv_a = crate::project_point(p.a, &q, p.rect_a);
        let uv_b = crate::project_point(p.b, &q, p.rect_b);
        let on_a = (p.a.evaluate(uv_a) - q).norm() <= 10.0 * p.tol;
        let on_b = (p.b.evaluate(uv_b) - q).norm() <= 10.0 * p.tol;
        if on_a
            && on_b
            && p.rect_a.contains_rel(&uv_a, 1e-9)
            && p.rect_b.contains_rel(&uv_b, 1e-9)
        {
            found.push(SurfacePoint {
                point: q,
                uv_a,
                uv_b,
            });
        }
    }
    let mut found = dedup_by_point(found, touch_radius(p), |sp| sp.point);
    found.truncate(MAX_TOUCHING);
    found
}

/// Distance within which a point counts as a touching point.
fn touch_radius(p: &Problem) -> f64 {
    (1e3 * p.tol).max(1e-6 * p.scale)
}

// =============================================================================
// Sub-rectangle pairs
// =============================================================================

/// A pair of sub-rectangles traced independently.
struct Domain {
    rect_a: BoundingRect,
    rect_b: BoundingRect,
    full_a: [bool; 2],
    full_b: [bool; 2],
}

impl Domain {
    fn new(p: &Problem, rect_a: BoundingRect, rect_b: BoundingRect) -> Self {
        Self {
            full_a: full_axes(&p.a.periodicity(), &rect_a),
            full_b: full_axes(&p.b.periodicity(), &rect_b),
            rect_a,
            rect_b,
        }
    }

    /// Containment of continuous (not re-wrapped) parameters; full-period
    /// axes never stop.
    fn contains(&self, sp: &SurfacePoint) -> bool {
        within(&self.rect_a, self.full_a, sp.uv_a) && within(&self.rect_b, self.full_b, sp.uv_b)
    }
}

fn within(rect: &BoundingRect, full: [bool; 2], uv: Point2) -> bool {
    let eu = 1e-9 * rect.width().max(1.0);
    let ev = 1e-9 * rect.height().max(1.0);
    (full[0] || (uv.x >= rect.u_min() - eu && uv.x <= rect.u_max() + eu))
        && (full[1] || (uv.y >= rect.v_min() - ev && uv.y <= rect.v_max() + ev))
}

/// Split the rectangles at every touching point.
fn split_domains(p: &Problem, touching: &[SurfacePoint]) -> Vec<Domain> {
    let mut pairs = vec![(*p.rect_a, *p.rect_b)];
    for tp in touching {
        let mut next = Vec::with_capacity(pairs.len() + 15);
        for (ra, rb) in pairs {
            let holds = ra.contains_rel(&tp.uv_a, 1e-9) && rb.contains_rel(&tp.uv_b, 1e-9);
            if !holds {
                next.push((ra, rb));
                continue;
            }
            for sa in ra.split_at(&tp.uv_a) {
                for sb in rb.split_at(&tp.uv_b) {
                    next.push((sa, sb));
                }
            }
        }
        pairs = next;
    }
    pairs
        .into_iter()
        .map(|(ra, rb)| Domain::new(p, ra, rb))
        .collect()
}

// =============================================================================
// Marching
// =============================================================================

struct Fragment {
    points: Vec<SurfacePoint>,
    closed: bool,
}

/// Unit tangent `n_a × n_b`; `None` where the normals are parallel.
fn tangent(p: &Problem, sp: &SurfacePoint) -> Option<Vec3> {
    let c = p.a.normal(sp.uv_a).as_ref().cross(p.b.normal(sp.uv_b).as_ref());
    let n = c.norm();
    (n > 1e-6).then(|| c / n)
}

/// Parameter velocity realizing the world direction `d` on `s`.
fn param_velocity(s: &dyn Surface, uv: Point2, d: &Vec3) -> Vec2 {
    let (su, sv) = (s.d_du(uv), s.d_dv(uv));
    let (e, f, g) = (su.dot(&su), su.dot(&sv), sv.dot(&sv));
    let det = e * g - f * f;
    if det.abs() <= 1e-300 {
        return Vec2::zeros();
    }
    let (bu, bv) = (su.dot(d), sv.dot(d));
    Vec2::new((g * bu - f * bv) / det, (e * bv - f * bu) / det)
}

/// Predict `h` along `dir` and correct onto the curve in the plane
/// through the predicted point.
fn predict_correct(p: &Problem, cur: &SurfacePoint, dir: &Vec3, h: f64) -> Option<SurfacePoint> {
    let q = cur.point + h * dir;
    let guess_a = cur.uv_a + h * param_velocity(p.a, cur.uv_a, dir);
    let guess_b = cur.uv_b + h * param_velocity(p.b, cur.uv_b, dir);
    refine(p, guess_a, guess_b, Some((q, *dir)))
}

/// One accepted step and the length used; halves `h` on failure or when
/// the tangent turns too fast, grows it on easy steps.
fn step(p: &Problem, cur: &SurfacePoint, dir: &Vec3, h: &mut f64) -> Option<(SurfacePoint, f64)> {
    let h_max = p.step();
    let h_min = 1e-6 * h_max;
    while *h >= h_min {
        if let Some(next) = predict_correct(p, cur, dir, *h) {
            let dist = (next.point - cur.point).norm();
            let used = *h;
            match tangent(p, &next) {
                Some(t) => {
                    let turn = t.dot(dir).abs().min(1.0).acos();
                    if turn <= MAX_TURN && dist <= 2.0 * used {
                        if turn < 0.5 * MAX_TURN {
                            *h = (used * 1.5).min(h_max);
                        }
                        return Some((next, used));
                    }
                }
                // Landed on a touching point; the caller stops there
                None if dist <= 2.0 * used => return Some((next, used)),
                None => {}
            }
        }
        *h *= 0.5;
    }
    None
}

/// Last point inside `dom` between `cur` and `cur + h_out·dir`.
fn border_point(
    p: &Problem,
    dom: &Domain,
    cur: &SurfacePoint,
    dir: &Vec3,
    h_out: f64,
) -> Option<SurfacePoint> {
    let (mut lo, mut hi) = (0.0, h_out);
    let mut best = None;
    for _ in 0..40 {
        let mid = 0.5 * (lo + hi);
        match predict_correct(p, cur, dir, mid) {
            Some(sp) if dom.contains(&sp) => {
                lo = mid;
                best = Some(sp);
            }
            _ => hi = mid,
        }
    }
    best
}

/// Distance from `q` to the segment `a`-`b`.
fn segment_distance(q: &Point3, a: &Point3, b: &Point3) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= 1e-300 {
        return (q - a).norm();
    }
    let s = ((q - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (q - (a + s * ab)).norm()
}

/// March from `start` along `sign · (n_a × n_b)` until the domain border,
/// a touching point, loop closure, or the point budget.
fn march(
    p: &Problem,
    dom: &Domain,
    start: SurfacePoint,
    sign: f64,
    touching: &[SurfacePoint],
) -> Fragment {
    let mut pts = vec![start];
    let mut h = p.step();
    let mut prev_dir: Option<Vec3> = None;
    let mut travelled = 0.0;
    let radius = touch_radius(p);

    while pts.len() < p.settings.max_march_points {
        let cur = pts[pts.len() - 1];
        let Some(mut dir) = tangent(p, &cur) else {
            break;
        };
        match prev_dir {
            Some(prev) if dir.dot(&prev) < 0.0 => dir = -dir,
            Some(_) => {}
            None => dir *= sign,
        }
        let Some((next, used)) = step(p, &cur, &dir, &mut h) else {
            trace!(points = pts.len(), "marching step failed");
            break;
        };

        if !dom.contains(&next) {
            if let Some(b) = border_point(p, dom, &cur, &dir, used) {
                pts.push(b);
            }
            return Fragment {
                points: pts,
                closed: false,
            };
        }
        travelled += (next.point - cur.point).norm();

        let crossed = touching.iter().find(|tp| {
            (tp.point - start.point).norm() > radius
                && segment_distance(&tp.point, &cur.point, &next.point) <= 0.5 * used + p.tol
        });
        if let Some(tp) = crossed {
            pts.push(continuous(p, &cur, tp));
            return Fragment {
                points: pts,
                closed: false,
            };
        }

        if pts.len() > 3
            && travelled > 2.0 * used
            && segment_distance(&start.point, &cur.point, &next.point) <= 0.5 * used
        {
            pts.push(continuous(p, &cur, &start));
            return Fragment {
                points: pts,
                closed: true,
            };
        }
        pts.push(next);
        prev_dir = Some(dir);
    }
    Fragment {
        points: pts,
        closed: false,
    }
}

/// Trace the fragment through `seed`: forward first, then backward unless
/// the forward march closed a loop.
fn trace_seed(p: &Problem, dom: &Domain, seed: SurfacePoint, touching: &[SurfacePoint]) -> Fragment {
    let forward = march(p, dom, seed, 1.0, touching);
    if forward.closed {
        return forward;
    }
    let backward = march(p, dom, seed, -1.0, touching);
    let mut points: Vec<SurfacePoint> = backward.points.into_iter().rev().collect();
    points.pop();
    points.extend(forward.points);
    Fragment {
        points,
        closed: false,
    }
}

fn near_polyline(q: &Point3, pts: &[SurfacePoint], reach: f64) -> bool {
    match pts {
        [] => false,
        [only] => (q - only.point).norm() <= reach,
        _ => pts
            .windows(2)
            .any(|w| segment_distance(q, &w[0].point, &w[1].point) <= reach),
    }
}

fn polyline_length(pts: &[SurfacePoint]) -> f64 {
    pts.windows(2).map(|w| (w[1].point - w[0].point).norm()).sum()
}

// =============================================================================
// Merging
// =============================================================================

/// Shift every parameter point of `pts` by whole periods so that
/// `pts[index]` lines up with `reference`.
fn align(p: &Problem, pts: &mut [SurfacePoint], index: usize, reference: &SurfacePoint) {
    let target = continuous(p, reference, &pts[index]);
    let (da, db) = (target.uv_a - pts[index].uv_a, target.uv_b - pts[index].uv_b);
    for sp in pts.iter_mut() {
        sp.uv_a += da;
        sp.uv_b += db;
    }
}

/// Join open fragments whose ends meet away from touching points, then
/// close fragments whose two ends meet.
fn merge_fragments(p: &Problem, fragments: Vec<Fragment>, touching: &[SurfacePoint]) -> Vec<Fragment> {
    let join_tol = (1e3 * p.tol).max(1e-9 * p.scale);
    let radius = touch_radius(p);
    let at_touch = |q: &Point3| touching.iter().any(|t| (t.point - q).norm() <= radius);
    let meets = |x: &SurfacePoint, y: &SurfacePoint| {
        (x.point - y.point).norm() <= join_tol && !at_touch(&x.point)
    };

    let (mut done, mut open): (Vec<Fragment>, Vec<Fragment>) =
        fragments.into_iter().partition(|f| f.closed);
    'outer: loop {
        for i in 0..open.len() {
            for j in 0..open.len() {
                if i == j {
                    continue;
                }
                let (ei, sj) = (open[i].points[open[i].points.len() - 1], open[j].points[0]);
                let ej = open[j].points[open[j].points.len() - 1];
                let si = open[i].points[0];
                // Orient j so that it continues i's end
                let reverse = if meets(&ei, &sj) {
                    false
                } else if meets(&ei, &ej) {
                    true
                } else if meets(&si, &sj) || meets(&si, &ej) {
                    // Handled when the pair is visited with i reversed
                    open[i].points.reverse();
                    continue 'outer;
                } else {
                    continue;
                };
                let mut tail = open.swap_remove(j).points;
                if reverse {
                    tail.reverse();
                }
                let i = if i == open.len() { j } else { i };
                let junction = open[i].points[open[i].points.len() - 1];
                align(p, &mut tail, 0, &junction);
                open[i].points.extend(tail.into_iter().skip(1));
                continue 'outer;
            }
        }
        break;
    }

    for mut f in open {
        let n = f.points.len();
        if n > 3 && meets(&f.points[0], &f.points[n - 1]) {
            let first = f.points[0];
            f.points[n - 1] = continuous(p, &f.points[n - 2], &first);
            f.closed = true;
        }
        done.push(f);
    }
    done
}

// =============================================================================
// Driver
// =============================================================================

/// Trace every intersection branch of a pair without a closed form.
pub(super) fn trace(p: &Problem) -> Vec<Piece> {
    let fa = ImplicitField::of(p.a);
    let fb = ImplicitField::of(p.b);
    if fa.is_none() && fb.is_none() {
        debug!("no implicit form on either surface, sampling boxes");
        return bbox::trace_by_boxes(p);
    }

    let seeds = seeds(p, fa.as_ref(), fb.as_ref());
    if seeds.is_empty() {
        debug!("no seeds");
        return Vec::new();
    }
    let touching = match (&fa, &fb) {
        (Some(fa), Some(fb)) => touching_points(p, fa, fb),
        _ => Vec::new(),
    };
    let domains = split_domains(p, &touching);
    debug!(
        seeds = seeds.len(),
        touching = touching.len(),
        domains = domains.len(),
        "tracing"
    );

    let reach = (0.05 * p.step()).max(10.0 * p.tol);
    let mut fragments = Vec::new();
    for dom in &domains {
        let members: Vec<usize> = (0..seeds.len()).filter(|&i| dom.contains(&seeds[i])).collect();
        let mut consumed = vec![false; members.len()];
        for k in 0..members.len() {
            if consumed[k] {
                continue;
            }
            consumed[k] = true;
            let fragment = trace_seed(p, dom, seeds[members[k]], &touching);
            for (m, &idx) in members.iter().enumerate() {
                if !consumed[m] && near_polyline(&seeds[idx].point, &fragment.points, reach) {
                    consumed[m] = true;
                }
            }
            if fragment.points.len() >= 2 {
                fragments.push(fragment);
            }
        }
    }

    let merged = merge_fragments(p, fragments, &touching);
    debug!(fragments = merged.len(), "traced");
    merged
        .into_iter()
        .filter(|f| polyline_length(&f.points) > 10.0 * p.tol)
        .map(|f| Piece::Sampled(f.points))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntersectSettings;
    use conix_geom::{ConeSurface, SphereSurface};

    fn sphere_rect() -> BoundingRect {
        BoundingRect::new(0.0, TAU, -TAU / 4.0, TAU / 4.0).unwrap()
    }

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
            scale: 4.0,
            tol: 4e-7,
        }
    }

    #[test]
    fn test_pair_gap_jacobian_matches_finite_differences() {
        let a = SphereSurface::new(1.0);
        let b = CylinderSurface::new(0.5);
        let model = PairGap {
            a: &a,
            b: &b,
            plane: Some((Point3::new(0.1, 0.2, 0.3), Vec3::new(0.0, 0.6, 0.8))),
        };
        let x = DVector::from_vec(vec![0.4, 0.3, 1.1, 0.7]);
        let analytic = model.jacobian(&x).unwrap();
        let numeric = conix_solve::finite_difference_jacobian(&model, &x).unwrap();
        assert!((analytic - numeric).amax() < 1e-6);
    }

    #[test]
    fn test_refine_lands_on_both_surfaces() {
        let a = SphereSurface::new(1.0);
        let b = CylinderSurface::with_axis(Point3::new(0.5, 0.0, 0.0), Vec3::z(), 0.5);
        let (ra, rb) = (sphere_rect(), BoundingRect::new(0.0, TAU, -2.0, 2.0).unwrap());
        let settings = IntersectSettings::default();
        let p = problem(&a, &ra, &b, &rb, &settings);
        let sp = refine(&p, Point2::new(0.5, 0.4), Point2::new(1.0, 0.4), None).unwrap();
        assert!((sp.point.coords.norm() - 1.0).abs() < 1e-7);
        assert!(((sp.point.x - 0.5).hypot(sp.point.y) - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_touching_point_found() {
        // Sphere resting on the outside of a cone's side touches it once
        let cone = ConeSurface::new(std::f64::consts::FRAC_PI_4);
        let sphere = SphereSurface::with_center(Point3::new(2.0, 0.0, 0.0), 2f64.sqrt());
        let rc = BoundingRect::new(0.0, TAU, 0.5, 6.0).unwrap();
        let rs = sphere_rect();
        let settings = IntersectSettings::default();
        let p = problem(&cone, &rc, &sphere, &rs, &settings);
        let fa = ImplicitField::of(&cone).unwrap();
        let fb = ImplicitField::of(&sphere).unwrap();
        let found = touching_points(&p, &fa, &fb);
        assert_eq!(found.len(), 1);
        assert!((found[0].point - Point3::new(1.0, 0.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_split_domains_at_touching_point() {
        let a = SphereSurface::new(1.0);
        let b = SphereSurface::new(2.0);
        let (ra, rb) = (sphere_rect(), sphere_rect());
        let settings = IntersectSettings::default();
        let p = problem(&a, &ra, &b, &rb, &settings);
        let tp = SurfacePoint {
            point: Point3::origin(),
            uv_a: Point2::new(1.0, 0.2),
            uv_b: Point2::new(2.0, -0.3),
        };
        assert_eq!(split_domains(&p, &[tp]).len(), 16);
        assert_eq!(split_domains(&p, &[]).len(), 1);
    }

    #[test]
    fn test_segment_distance() {
        let a = Point3::origin();
        let b = Point3::new(2.0, 0.0, 0.0);
        assert!((segment_distance(&Point3::new(1.0, 1.0, 0.0), &a, &b) - 1.0).abs() < 1e-15);
        assert!((segment_distance(&Point3::new(3.0, 0.0, 0.0), &a, &b) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_trace_sphere_cone_circle() {
        // Cone z = ρ meets the unit sphere on the circle ρ = z = 1/√2
        let cone = ConeSurface::new(std::f64::consts::FRAC_PI_4);
        let sphere = SphereSurface::new(1.0);
        let rc = BoundingRect::new(0.0, TAU, 0.1, 3.0).unwrap();
        let rs = sphere_rect();
        let settings = IntersectSettings::default();
        let p = problem(&cone, &rc, &sphere, &rs, &settings);
        let pieces = trace(&p);
        assert_eq!(pieces.len(), 1);
        let Piece::Sampled(pts) = &pieces[0] else { panic!("expected samples") };
        for sp in pts {
            assert!((sp.point.z - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        }
        let first = pts[0].point;
        let last = pts[pts.len() - 1].point;
        assert!((first - last).norm() < 1e-6);
    }
}
