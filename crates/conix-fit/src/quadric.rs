//! General quadric fitting.
//!
//! The algebraic estimate is the right singular vector of the monomial
//! design matrix with the smallest singular value. It is then refined by
//! minimizing Sampson distances `F / |∇F|`, with one extra residual
//! `|k|² - 1` pinning the scale of the coefficient vector `k`.
//!
//! Both stages work on points centred on their centroid and scaled to unit
//! RMS radius; the result is mapped back to world coordinates.

use conix_math::implicit::Monomial;
use conix_math::{ImplicitPolynomial, Point3, Transform, Vec3};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::{centroid, fit_shape, FitOutcome, FitSettings, Result, Shape};

/// Exponents of the ten quadric monomials, in coefficient order.
pub const QUADRIC_MONOMIALS: [[u8; 3]; 10] = [
    [2, 0, 0],
    [0, 2, 0],
    [0, 0, 2],
    [1, 1, 0],
    [1, 0, 1],
    [0, 1, 1],
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    [0, 0, 0],
];

fn monomials(p: &Point3) -> [f64; 10] {
    let (x, y, z) = (p.x, p.y, p.z);
    [x * x, y * y, z * z, x * y, x * z, y * z, x, y, z, 1.0]
}

fn value(k: &DVector<f64>, p: &Point3) -> f64 {
    monomials(p).iter().zip(k.iter()).map(|(m, c)| m * c).sum()
}

fn gradient(k: &DVector<f64>, p: &Point3) -> Vec3 {
    let (x, y, z) = (p.x, p.y, p.z);
    Vec3::new(
        2.0 * k[0] * x + k[3] * y + k[4] * z + k[6],
        2.0 * k[1] * y + k[3] * x + k[5] * z + k[7],
        2.0 * k[2] * z + k[4] * x + k[5] * y + k[8],
    )
}

/// Smallest right singular vector of the design matrix.
fn algebraic(points: &[Point3]) -> Option<DVector<f64>> {
    if points.len() < QUADRIC_MONOMIALS.len() {
        return None;
    }
    let d = DMatrix::from_fn(points.len(), 10, |i, j| monomials(&points[i])[j]);
    let svd = d.svd(false, true);
    let v_t = svd.v_t?;
    let k = v_t.row(svd.singular_values.imin()).transpose();
    let n = k.norm();
    (n > 0.0 && n.is_finite()).then(|| k / n)
}

struct QuadricShape {
    initial: DVector<f64>,
    // Maps world points to the normalized frame.
    to_unit: Transform,
}

impl Shape for QuadricShape {
    type Output = ImplicitPolynomial;

    fn num_params(&self) -> usize {
        10
    }

    fn num_constraints(&self) -> usize {
        1
    }

    fn initial(&self) -> DVector<f64> {
        self.initial.clone()
    }

    fn residuals(&self, k: &DVector<f64>, points: &[Point3]) -> Option<DVector<f64>> {
        let mut r = DVector::zeros(points.len() + 1);
        for (i, p) in points.iter().enumerate() {
            let g = gradient(k, p).norm();
            if g < 1e-300 {
                return None;
            }
            r[i] = value(k, p) / g;
        }
        r[points.len()] = k.norm_squared() - 1.0;
        Some(r)
    }

    fn build(&self, k: &DVector<f64>, _points: &[Point3]) -> Option<ImplicitPolynomial> {
        let unit = ImplicitPolynomial::from_terms(
            QUADRIC_MONOMIALS
                .iter()
                .zip(k.iter())
                .map(|(&exps, &coeff)| Monomial { coeff, exps })
                .collect(),
        );
        let world = unit.compose(&self.to_unit);
        let norm = world.terms().iter().map(|t| t.coeff * t.coeff).sum::<f64>().sqrt();
        (norm > 0.0 && norm.is_finite() && world.degree() == 2).then(|| world.scale(1.0 / norm))
    }
}

/// Fit a general quadric `F(x, y, z) = 0` to `points`.
///
/// The returned polynomial has unit coefficient norm.
pub fn fit_quadric(points: &[Point3], settings: &FitSettings) -> Result<FitOutcome<ImplicitPolynomial>> {
    settings.validate()?;
    let c = centroid(points);
    let rms = (points.iter().map(|p| (p - c).norm_squared()).sum::<f64>() / points.len().max(1) as f64).sqrt();
    if !(rms > 0.0 && rms.is_finite()) {
        return Ok(FitOutcome::failed());
    }
    let s = 1.0 / rms;
    let to_unit = Transform::from_frame(
        &Point3::from(-s * c.coords),
        &Vec3::new(s, 0.0, 0.0),
        &Vec3::new(0.0, s, 0.0),
        &Vec3::new(0.0, 0.0, s),
    );
    let unit: Vec<Point3> = points.iter().map(|p| to_unit.apply_point(p)).collect();

    let Some(initial) = algebraic(&unit) else {
        debug!(points = points.len(), "no algebraic quadric estimate");
        return Ok(FitOutcome::failed());
    };
    let shape = QuadricShape { initial, to_unit };
    Ok(fit_shape("quadric", &shape, &unit, settings))
}
