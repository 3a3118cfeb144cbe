//! Non-rational B-spline curves through sampled points.
//!
//! Traced intersection curves are stored as global interpolants: the curve
//! passes through every sample at a prescribed parameter, with averaged
//! knots and a dense linear solve for the control points.

use std::any::Any;

use conix_math::{Point2, Point3, Vec2, Vec3};
use nalgebra::{DMatrix, SVector};

use crate::{Curve2d, Curve3d, CurveKind};

/// Highest degree used for interpolation.
const MAX_INTERPOLATION_DEGREE: usize = 3;

// =============================================================================
// Knot vector utilities
// =============================================================================

/// Validate a knot vector: non-decreasing, length = n_control_points + degree + 1.
pub(crate) fn validate_knots(knots: &[f64], n_points: usize, degree: usize) -> bool {
    if n_points <= degree || knots.len() != n_points + degree + 1 {
        return false;
    }
    knots.windows(2).all(|w| w[0] <= w[1]) && knots[degree] < knots[n_points]
}

/// Find the knot span index for parameter `t`.
///
/// Returns `i` such that `knots[i] <= t < knots[i+1]`, clamped to valid range.
/// For `t` at the end of the domain, returns the last valid span.
pub(crate) fn find_span(knots: &[f64], n: usize, degree: usize, t: f64) -> usize {
    // n = number of control points - 1 (last index)
    if t >= knots[n + 1] {
        return n; // last valid span
    }
    if t <= knots[degree] {
        return degree; // first valid span
    }
    // Binary search
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Basis function values and derivatives up to order `n` at `t`.
///
/// `ders[k][j]` is the k-th derivative of `N[span - degree + j]`.
pub(crate) fn ders_basis_functions(knots: &[f64], span: usize, degree: usize, t: f64, n: usize) -> Vec<Vec<f64>> {
    let p = degree;
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            ndu[j][r] = right[r + 1] + left[j - r];
            // Zero-length knot interval
            let temp = if ndu[j][r].abs() < 1e-30 {
                0.0
            } else {
                ndu[r][j - 1] / ndu[j][r]
            };
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; n + 1];
    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }
    let div = |num: f64, den: f64| if den.abs() < 1e-30 { 0.0 } else { num / den };
    let top = n.min(p);
    for r in 0..=p {
        let mut a = [vec![0.0; p + 1], vec![0.0; p + 1]];
        let (mut s1, mut s2) = (0usize, 1usize);
        a[0][0] = 1.0;
        for k in 1..=top {
            let mut d = 0.0;
            let rk = r as isize - k as isize;
            let pk = p - k;
            if rk >= 0 {
                let rk = rk as usize;
                a[s2][0] = div(a[s1][0], ndu[pk + 1][rk]);
                d = a[s2][0] * ndu[rk][pk];
            }
            let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
            let j2 = if r as isize - 1 <= pk as isize { k - 1 } else { p - r };
            for j in j1..=j2 {
                let idx = (rk + j as isize) as usize;
                a[s2][j] = div(a[s1][j] - a[s1][j - 1], ndu[pk + 1][idx]);
                d += a[s2][j] * ndu[idx][pk];
            }
            if r <= pk {
                a[s2][k] = div(-a[s1][k - 1], ndu[pk + 1][r]);
                d += a[s2][k] * ndu[r][pk];
            }
            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }
    let mut factor = p as f64;
    for k in 1..=top {
        for value in ders[k].iter_mut() {
            *value *= factor;
        }
        factor *= (p - k) as f64;
    }
    ders
}

/// Clamped knots for interpolation at `params` by averaging.
fn averaged_knots(params: &[f64], degree: usize) -> Vec<f64> {
    let n = params.len() - 1;
    let p = degree;
    let mut knots = vec![0.0; n + p + 2];
    for i in 0..=p {
        knots[i] = params[0];
        knots[n + 1 + i] = params[n];
    }
    for j in 1..=(n - p) {
        knots[j + p] = params[j..j + p].iter().sum::<f64>() / p as f64;
    }
    knots
}

/// Evaluate derivative `order` of a curve with control points given by `cp`.
fn eval_derivative<const D: usize>(
    cp: impl Fn(usize) -> SVector<f64, D>,
    n_points: usize,
    knots: &[f64],
    degree: usize,
    t: f64,
    order: usize,
) -> SVector<f64, D> {
    let n = n_points - 1;
    let t = t.clamp(knots[degree], knots[n + 1]);
    let span = find_span(knots, n, degree, t);
    let ders = ders_basis_functions(knots, span, degree, t, order);
    let mut out = SVector::<f64, D>::zeros();
    for (j, &b) in ders[order].iter().enumerate() {
        out += b * cp(span - degree + j);
    }
    out
}

/// Global interpolation: knots and control points passing through
/// `points[k]` at `params[k]`. `None` unless the parameters are finite and
/// strictly increasing with at least two points.
fn interpolate<const D: usize>(
    points: &[SVector<f64, D>],
    params: &[f64],
) -> Option<(Vec<SVector<f64, D>>, Vec<f64>, usize)> {
    if points.len() < 2 || points.len() != params.len() {
        return None;
    }
    if params.iter().any(|t| !t.is_finite()) || params.windows(2).any(|w| w[1] <= w[0]) {
        return None;
    }
    let n = points.len() - 1;
    let degree = MAX_INTERPOLATION_DEGREE.min(n);
    let knots = averaged_knots(params, degree);
    let mut a = DMatrix::<f64>::zeros(n + 1, n + 1);
    for (k, &t) in params.iter().enumerate() {
        let span = find_span(&knots, n, degree, t);
        let basis = ders_basis_functions(&knots, span, degree, t, 0);
        for (j, &b) in basis[0].iter().enumerate() {
            a[(k, span - degree + j)] = b;
        }
    }
    let mut rhs = DMatrix::<f64>::zeros(n + 1, D);
    for (k, p) in points.iter().enumerate() {
        for d in 0..D {
            rhs[(k, d)] = p[d];
        }
    }
    let solution = a.lu().solve(&rhs)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let control = (0..=n)
        .map(|i| SVector::<f64, D>::from_fn(|d, _| solution[(i, d)]))
        .collect();
    Some((control, knots, degree))
}

/// Chord-length parameters normalized to `[0, 1]`; `None` when all points
/// coincide or two consecutive points coincide.
pub(crate) fn chord_length_params<const D: usize>(points: &[SVector<f64, D>]) -> Option<Vec<f64>> {
    if points.len() < 2 {
        return None;
    }
    let mut params = Vec::with_capacity(points.len());
    params.push(0.0);
    let mut acc = 0.0;
    for w in points.windows(2) {
        let d = (w[1] - w[0]).norm();
        if d <= 1e-14 {
            return None;
        }
        acc += d;
        params.push(acc);
    }
    Some(params.into_iter().map(|t| t / acc).collect())
}

// =============================================================================
// B-spline curve (3D)
// =============================================================================

/// A non-rational B-spline curve in 3D.
///
/// Defined by control points, a knot vector, and a polynomial degree.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineCurve {
    /// Control points in 3D.
    pub control_points: Vec<Point3>,
    /// Knot vector. Length = control_points.len() + degree + 1.
    pub knots: Vec<f64>,
    /// Polynomial degree (order = degree + 1).
    pub degree: usize,
}

impl BSplineCurve {
    /// Create a B-spline curve; `None` for an inconsistent knot vector.
    pub fn new(control_points: Vec<Point3>, knots: Vec<f64>, degree: usize) -> Option<Self> {
        validate_knots(&knots, control_points.len(), degree).then_some(Self {
            control_points,
            knots,
            degree,
        })
    }

    /// Interpolate `points` at the given strictly increasing parameters.
    pub fn interpolate(points: &[Point3], params: &[f64]) -> Option<Self> {
        let coords: Vec<Vec3> = points.iter().map(|p| p.coords).collect();
        let (control, knots, degree) = interpolate(&coords, params)?;
        Some(Self {
            control_points: control.into_iter().map(Point3::from).collect(),
            knots,
            degree,
        })
    }

    /// Interpolate with chord-length parameters on `[0, 1]`.
    pub fn interpolate_chord(points: &[Point3]) -> Option<Self> {
        let coords: Vec<Vec3> = points.iter().map(|p| p.coords).collect();
        let params = chord_length_params(&coords)?;
        Self::interpolate(points, &params)
    }

    /// Evaluate the curve at parameter `t`.
    pub fn eval(&self, t: f64) -> Point3 {
        Point3::from(self.derivative(t, 0))
    }

    /// Derivative of the given order at `t`.
    pub fn derivative(&self, t: f64, order: usize) -> Vec3 {
        eval_derivative(
            |i| self.control_points[i].coords,
            self.control_points.len(),
            &self.knots,
            self.degree,
            t,
            order,
        )
    }

    /// Parameter domain `(t_min, t_max)`.
    pub fn parameter_domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.control_points.len()],
        )
    }
}

impl Curve3d for BSplineCurve {
    fn evaluate(&self, t: f64) -> Point3 {
        self.eval(t)
    }

    fn tangent(&self, t: f64) -> Vec3 {
        self.derivative(t, 1)
    }

    fn second_derivative(&self, t: f64) -> Vec3 {
        self.derivative(t, 2)
    }

    fn domain(&self) -> (f64, f64) {
        self.parameter_domain()
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::BSpline
    }

    fn clone_box(&self) -> Box<dyn Curve3d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn suggested_segments(&self) -> usize {
        (4 * self.control_points.len()).max(16)
    }
}

// =============================================================================
// B-spline curve (2D)
// =============================================================================

/// A non-rational B-spline curve in a surface's parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineCurve2d {
    /// Control points in 2D.
    pub control_points: Vec<Point2>,
    /// Knot vector. Length = control_points.len() + degree + 1.
    pub knots: Vec<f64>,
    /// Polynomial degree.
    pub degree: usize,
}

impl BSplineCurve2d {
    /// Create a 2D B-spline curve; `None` for an inconsistent knot vector.
    pub fn new(control_points: Vec<Point2>, knots: Vec<f64>, degree: usize) -> Option<Self> {
        validate_knots(&knots, control_points.len(), degree).then_some(Self {
            control_points,
            knots,
            degree,
        })
    }

    /// Interpolate `points` at the given strictly increasing parameters.
    pub fn interpolate(points: &[Point2], params: &[f64]) -> Option<Self> {
        let coords: Vec<Vec2> = points.iter().map(|p| p.coords).collect();
        let (control, knots, degree) = interpolate(&coords, params)?;
        Some(Self {
            control_points: control.into_iter().map(Point2::from).collect(),
            knots,
            degree,
        })
    }

    /// Derivative of the given order at `t`.
    pub fn derivative(&self, t: f64, order: usize) -> Vec2 {
        eval_derivative(
            |i| self.control_points[i].coords,
            self.control_points.len(),
            &self.knots,
            self.degree,
            t,
            order,
        )
    }
}

impl Curve2d for BSplineCurve2d {
    fn evaluate(&self, t: f64) -> Point2 {
        Point2::from(self.derivative(t, 0))
    }

    fn tangent(&self, t: f64) -> Vec2 {
        self.derivative(t, 1)
    }

    fn domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.control_points.len()],
        )
    }

    fn curve_type(&self) -> CurveKind {
        CurveKind::BSpline
    }

    fn clone_box(&self) -> Box<dyn Curve2d> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
