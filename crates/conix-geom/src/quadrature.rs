//! Sampled fallbacks shared by the curve types: Gauss–Legendre arc length,
//! closest-point search, and adaptive polyline approximation.

use conix_math::Point3;

use crate::Curve3d;

/// 5-point Gauss–Legendre nodes on `[-1, 1]`.
const GL_NODES: [f64; 5] = [
    -0.906_179_845_938_664,
    -0.538_469_310_105_683,
    0.0,
    0.538_469_310_105_683,
    0.906_179_845_938_664,
];

/// Matching Gauss–Legendre weights.
const GL_WEIGHTS: [f64; 5] = [
    0.236_926_885_056_189,
    0.478_628_670_499_366,
    0.568_888_888_888_889,
    0.478_628_670_499_366,
    0.236_926_885_056_189,
];

/// Maximum bisection depth of the adaptive polyline.
const MAX_DEPTH: u32 = 14;

/// Composite 5-point Gauss–Legendre quadrature of `f` over `[a, b]`.
pub fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64, segments: usize) -> f64 {
    let segments = segments.max(1);
    let h = (b - a) / segments as f64;
    let mut sum = 0.0;
    for k in 0..segments {
        let mid = a + (k as f64 + 0.5) * h;
        for (x, w) in GL_NODES.iter().zip(GL_WEIGHTS.iter()) {
            sum += w * f(mid + 0.5 * h * x);
        }
    }
    0.5 * h * sum
}

/// Closest parameter by dense sampling followed by Newton iteration on
/// `(C(t) - p) · C'(t) = 0`, clamped to the domain.
pub fn closest_parameter<C: Curve3d + ?Sized>(curve: &C, p: &Point3) -> f64 {
    let (t0, t1) = curve.domain();
    let n = 4 * curve.suggested_segments().max(4);
    let mut best_t = t0;
    let mut best_d = f64::INFINITY;
    for i in 0..=n {
        let t = t0 + (t1 - t0) * i as f64 / n as f64;
        let d = (curve.evaluate(t) - p).norm_squared();
        if d < best_d {
            best_d = d;
            best_t = t;
        }
    }
    let mut t = best_t;
    for _ in 0..20 {
        let diff = curve.evaluate(t) - p;
        let d1 = curve.tangent(t);
        let d2 = curve.second_derivative(t);
        let g = diff.dot(&d1);
        let h = d1.norm_squared() + diff.dot(&d2);
        if h.abs() < 1e-300 {
            break;
        }
        let next = (t - g / h).clamp(t0, t1);
        let done = (next - t).abs() <= 1e-14 * (1.0 + t.abs());
        t = next;
        if done {
            break;
        }
    }
    if (curve.evaluate(t) - p).norm_squared() <= best_d {
        t
    } else {
        best_t
    }
}

/// Uniform start at `suggested_segments`, then bisect every chord whose
/// midpoint deviates by more than `tol`.
pub fn adaptive_polyline<C: Curve3d + ?Sized>(curve: &C, tol: f64) -> Vec<Point3> {
    let (t0, t1) = curve.domain();
    let n = curve.suggested_segments().max(1);
    let mut out = vec![curve.evaluate(t0)];
    for i in 0..n {
        let a = t0 + (t1 - t0) * i as f64 / n as f64;
        let b = t0 + (t1 - t0) * (i + 1) as f64 / n as f64;
        refine(curve, a, b, tol, 0, &mut out);
    }
    out
}

fn refine<C: Curve3d + ?Sized>(
    curve: &C,
    a: f64,
    b: f64,
    tol: f64,
    depth: u32,
    out: &mut Vec<Point3>,
) {
    let pa = curve.evaluate(a);
    let pb = curve.evaluate(b);
    let m = 0.5 * (a + b);
    let pm = curve.evaluate(m);
    let chord_mid = nalgebra::center(&pa, &pb);
    if depth < MAX_DEPTH && tol.is_finite() && (pm - chord_mid).norm() > tol {
        refine(curve, a, m, tol, depth + 1, out);
        refine(curve, m, b, tol, depth + 1, out);
    } else {
        out.push(pb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrate_polynomial_exact() {
        // 5-point rule integrates degree 9 exactly
        let v = integrate(|x| x.powi(9) + 3.0 * x * x, 0.0, 2.0, 1);
        let exact = 2.0_f64.powi(10) / 10.0 + 8.0;
        assert!((v - exact).abs() < 1e-9);
    }

    #[test]
    fn test_integrate_sine() {
        let v = integrate(f64::sin, 0.0, std::f64::consts::PI, 8);
        assert!((v - 2.0).abs() < 1e-12);
    }
}
