//! Real roots of low-degree polynomials.
//!
//! Closed-form solutions (quadratic, Cardano cubic, Ferrari quartic), each
//! followed by a few Newton steps on the original polynomial to recover the
//! precision lost in the closed form. Coefficients are given highest degree
//! first. Returned roots are real, sorted ascending, and deduplicated.

use crate::TAU;

/// Number of Newton polishing steps applied to every closed-form root.
const POLISH_STEPS: usize = 4;

/// Evaluate a polynomial (highest degree first) with Horner's rule.
pub fn eval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Evaluate a polynomial and its derivative.
pub fn eval_with_derivative(coeffs: &[f64], x: f64) -> (f64, f64) {
    let mut p = 0.0;
    let mut dp = 0.0;
    for &c in coeffs {
        dp = dp * x + p;
        p = p * x + c;
    }
    (p, dp)
}

fn polish(coeffs: &[f64], mut x: f64) -> f64 {
    let mut best = eval(coeffs, x).abs();
    for _ in 0..POLISH_STEPS {
        let (p, dp) = eval_with_derivative(coeffs, x);
        if p == 0.0 || dp.abs() < 1e-300 {
            break;
        }
        let next = x - p / dp;
        let val = eval(coeffs, next).abs();
        if !next.is_finite() || val >= best {
            break;
        }
        x = next;
        best = val;
    }
    x
}

fn finish(coeffs: &[f64], roots: Vec<f64>) -> Vec<f64> {
    let mut out: Vec<f64> = roots
        .into_iter()
        .filter(|r| r.is_finite())
        .map(|r| polish(coeffs, r))
        .collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs())));
    out
}

fn max_abs(coeffs: &[f64]) -> f64 {
    coeffs.iter().fold(0.0_f64, |m, c| m.max(c.abs()))
}

/// Real roots of `a x + b = 0`.
pub fn solve_linear(a: f64, b: f64) -> Vec<f64> {
    if a.abs() <= 1e-300 {
        return Vec::new();
    }
    vec![-b / a]
}

/// Real roots of `a x² + b x + c = 0`.
///
/// A slightly negative discriminant (relative to the coefficient scale) is
/// treated as a double root so tangent configurations are not lost.
pub fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    let scale = max_abs(&[a, b, c]);
    if scale == 0.0 {
        return Vec::new();
    }
    if a.abs() <= 1e-14 * scale {
        return solve_linear(b, c);
    }
    let disc = b * b - 4.0 * a * c;
    let disc_scale = b * b + (4.0 * a * c).abs();
    let roots = if disc < -1e-12 * disc_scale {
        Vec::new()
    } else if disc <= 1e-12 * disc_scale {
        vec![-b / (2.0 * a)]
    } else {
        // Numerically stable form avoids cancellation
        let q = -0.5 * (b + b.signum() * disc.sqrt());
        if q == 0.0 {
            vec![0.0]
        } else {
            vec![q / a, c / q]
        }
    };
    finish(&[a, b, c], roots)
}

/// Real roots of `a x³ + b x² + c x + d = 0`.
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    let scale = max_abs(&[a, b, c, d]);
    if scale == 0.0 {
        return Vec::new();
    }
    if a.abs() <= 1e-14 * scale {
        return solve_quadratic(b, c, d);
    }
    let (b, c, d) = (b / a, c / a, d / a);
    // Depressed cubic t³ + p t + q with x = t - b/3
    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);
    let disc_scale = (q / 2.0).powi(2) + (p / 3.0).powi(3).abs();

    let ts = if p.abs() <= 1e-14 * (1.0 + b * b) && q.abs() <= 1e-14 * (1.0 + b.abs().powi(3)) {
        vec![0.0]
    } else if disc.abs() <= 1e-12 * disc_scale {
        // Double root
        vec![3.0 * q / p, -1.5 * q / p]
    } else if disc > 0.0 {
        let sq = disc.sqrt();
        vec![(-q / 2.0 + sq).cbrt() + (-q / 2.0 - sq).cbrt()]
    } else {
        let m = 2.0 * (-p / 3.0).sqrt();
        let arg = (3.0 * q / (p * m)).clamp(-1.0, 1.0);
        let theta = arg.acos() / 3.0;
        (0..3)
            .map(|k| m * (theta - TAU * k as f64 / 3.0).cos())
            .collect()
    };
    let roots = ts.into_iter().map(|t| t - shift).collect();
    finish(&[1.0, b, c, d], roots)
}

/// Real roots of `a x⁴ + b x³ + c x² + d x + e = 0` (Ferrari's method).
pub fn solve_quartic(a: f64, b: f64, c: f64, d: f64, e: f64) -> Vec<f64> {
    let scale = max_abs(&[a, b, c, d, e]);
    if scale == 0.0 {
        return Vec::new();
    }
    if a.abs() <= 1e-14 * scale {
        return solve_cubic(b, c, d, e);
    }
    let (b, c, d, e) = (b / a, c / a, d / a, e / a);
    // Depressed quartic y⁴ + p y² + q y + r with x = y - b/4
    let shift = b / 4.0;
    let b2 = b * b;
    let p = c - 3.0 * b2 / 8.0;
    let q = d - b * c / 2.0 + b2 * b / 8.0;
    let r = e - b * d / 4.0 + b2 * c / 16.0 - 3.0 * b2 * b2 / 256.0;
    let coeffs = [1.0, b, c, d, e];

    let mut ys = Vec::with_capacity(4);
    let q_scale = 1.0 + p.abs().powf(1.5) + r.abs().powf(0.75);
    if q.abs() <= 1e-12 * q_scale {
        // Biquadratic: z = y²
        for z in solve_quadratic(1.0, p, r) {
            if z > 0.0 {
                let s = z.sqrt();
                ys.push(s);
                ys.push(-s);
            } else if z > -1e-12 * (1.0 + p.abs()) {
                ys.push(0.0);
            }
        }
    } else {
        // Resolvent cubic 8m³ + 8p m² + (2p² - 8r) m - q² = 0 has a positive root
        let resolvent = solve_cubic(8.0, 8.0 * p, 2.0 * p * p - 8.0 * r, -q * q);
        let m = resolvent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if m.is_nan() || m <= 0.0 {
            return finish(&coeffs, Vec::new());
        }
        let s = (2.0 * m).sqrt();
        let half = p / 2.0 + m;
        let k = q / (2.0 * s);
        // (y² + s y + half - k)(y² - s y + half + k)
        ys.extend(solve_quadratic(1.0, s, half - k));
        ys.extend(solve_quadratic(1.0, -s, half + k));
    }
    let roots = ys.into_iter().map(|y| y - shift).collect();
    finish(&coeffs, roots)
}

/// Angles `θ ∈ [0, 2π)` with `a cos θ + b sin θ = c`.
pub fn solve_trig(a: f64, b: f64, c: f64) -> Vec<f64> {
    let r = a.hypot(b);
    if r <= 1e-300 {
        return Vec::new();
    }
    let ratio = c / r;
    if ratio.abs() > 1.0 + 1e-12 {
        return Vec::new();
    }
    let phi = b.atan2(a);
    let delta = ratio.clamp(-1.0, 1.0).acos();
    let norm = |x: f64| x.rem_euclid(TAU);
    if delta < 1e-9 {
        return vec![norm(phi)];
    }
    let mut out = vec![norm(phi - delta), norm(phi + delta)];
    out.sort_by(|x, y| x.total_cmp(y));
    out
}
