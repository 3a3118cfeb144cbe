//! Implicit polynomials `F(x, y, z) = 0` in three variables.
//!
//! Surfaces that admit an algebraic equation expose it normalized so that
//! `|F|` approximates the Euclidean distance near the surface. The engine uses
//! the sign of `F` for seeding and its gradient for touching-point analysis.

use nalgebra::Matrix3;

use crate::{Point3, Transform, Vec3};

/// A single term `coeff * x^i * y^j * z^k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Monomial {
    /// Coefficient.
    pub coeff: f64,
    /// Exponents of x, y, z.
    pub exps: [u8; 3],
}

/// A sparse polynomial in x, y, z.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImplicitPolynomial {
    terms: Vec<Monomial>,
}

impl ImplicitPolynomial {
    /// The zero polynomial.
    pub fn zero() -> Self {
        Self { terms: Vec::new() }
    }

    /// A constant.
    pub fn constant(c: f64) -> Self {
        Self::from_terms(vec![Monomial {
            coeff: c,
            exps: [0, 0, 0],
        }])
    }

    /// `a x + b y + c z + d`.
    pub fn linear(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self::from_terms(vec![
            Monomial {
                coeff: a,
                exps: [1, 0, 0],
            },
            Monomial {
                coeff: b,
                exps: [0, 1, 0],
            },
            Monomial {
                coeff: c,
                exps: [0, 0, 1],
            },
            Monomial {
                coeff: d,
                exps: [0, 0, 0],
            },
        ])
    }

    /// The coordinate variable `axis` (0 = x, 1 = y, 2 = z).
    pub fn variable(axis: usize) -> Self {
        let mut exps = [0u8; 3];
        exps[axis.min(2)] = 1;
        Self::from_terms(vec![Monomial { coeff: 1.0, exps }])
    }

    /// Build from arbitrary terms, merging duplicates and dropping zeros.
    pub fn from_terms(mut terms: Vec<Monomial>) -> Self {
        terms.sort_by(|a, b| b.exps.cmp(&a.exps));
        let mut merged: Vec<Monomial> = Vec::with_capacity(terms.len());
        for t in terms {
            match merged.last_mut() {
                Some(last) if last.exps == t.exps => last.coeff += t.coeff,
                _ => merged.push(t),
            }
        }
        merged.retain(|t| t.coeff != 0.0);
        Self { terms: merged }
    }

    /// The terms, sorted by descending exponent tuple.
    pub fn terms(&self) -> &[Monomial] {
        &self.terms
    }

    /// Total degree (0 for the zero polynomial).
    pub fn degree(&self) -> u32 {
        self.terms
            .iter()
            .map(|t| t.exps.iter().map(|&e| e as u32).sum())
            .max()
            .unwrap_or(0)
    }

    /// Sum of two polynomials.
    pub fn add(&self, other: &Self) -> Self {
        let mut terms = self.terms.clone();
        terms.extend_from_slice(&other.terms);
        Self::from_terms(terms)
    }

    /// Product of two polynomials.
    pub fn mul(&self, other: &Self) -> Self {
        let mut terms = Vec::with_capacity(self.terms.len() * other.terms.len());
        for a in &self.terms {
            for b in &other.terms {
                terms.push(Monomial {
                    coeff: a.coeff * b.coeff,
                    exps: [
                        a.exps[0] + b.exps[0],
                        a.exps[1] + b.exps[1],
                        a.exps[2] + b.exps[2],
                    ],
                });
            }
        }
        Self::from_terms(terms)
    }

    /// Multiply by a scalar.
    pub fn scale(&self, s: f64) -> Self {
        Self::from_terms(
            self.terms
                .iter()
                .map(|t| Monomial {
                    coeff: t.coeff * s,
                    exps: t.exps,
                })
                .collect(),
        )
    }

    /// Integer power.
    pub fn pow(&self, n: u32) -> Self {
        let mut out = Self::constant(1.0);
        for _ in 0..n {
            out = out.mul(self);
        }
        out
    }

    /// Substitute each variable by an arbitrary polynomial.
    fn substitute(&self, vars: &[Self; 3]) -> Self {
        // Powers are cached per variable since terms reuse them
        let mut powers: [Vec<Self>; 3] = Default::default();
        for (axis, cache) in powers.iter_mut().enumerate() {
            let max = self.terms.iter().map(|t| t.exps[axis]).max().unwrap_or(0);
            cache.push(Self::constant(1.0));
            for e in 1..=max as usize {
                let next = cache[e - 1].mul(&vars[axis]);
                cache.push(next);
            }
        }
        let mut out = Self::zero();
        for t in &self.terms {
            let term = powers[0][t.exps[0] as usize]
                .mul(&powers[1][t.exps[1] as usize])
                .mul(&powers[2][t.exps[2] as usize])
                .scale(t.coeff);
            out = out.add(&term);
        }
        out
    }

    /// The polynomial `G(p) = F(t(p))`.
    ///
    /// A surface with local equation `F` placed by `forward` has world
    /// equation `F` composed with the inverse transform.
    pub fn compose(&self, t: &Transform) -> Self {
        let m = &t.matrix;
        let vars = [0, 1, 2].map(|row| {
            Self::linear(m[(row, 0)], m[(row, 1)], m[(row, 2)], m[(row, 3)])
        });
        self.substitute(&vars)
    }

    /// Coefficients (highest degree first) of `F(origin + s * dir)` in `s`.
    pub fn along_line(&self, origin: &Point3, dir: &Vec3) -> Vec<f64> {
        // Reuse the x variable as the line parameter
        let vars = [0, 1, 2].map(|i| Self::linear(dir[i], 0.0, 0.0, origin[i]));
        let uni = self.substitute(&vars);
        let degree = uni.degree() as usize;
        let mut coeffs = vec![0.0; degree + 1];
        for t in &uni.terms {
            coeffs[degree - t.exps[0] as usize] += t.coeff;
        }
        coeffs
    }

    /// Value at a point.
    pub fn evaluate(&self, p: &Point3) -> f64 {
        self.terms
            .iter()
            .map(|t| {
                t.coeff
                    * p.x.powi(t.exps[0] as i32)
                    * p.y.powi(t.exps[1] as i32)
                    * p.z.powi(t.exps[2] as i32)
            })
            .sum()
    }

    /// Partial derivative along `axis`.
    pub fn derivative(&self, axis: usize) -> Self {
        let axis = axis.min(2);
        Self::from_terms(
            self.terms
                .iter()
                .filter(|t| t.exps[axis] > 0)
                .map(|t| {
                    let mut exps = t.exps;
                    exps[axis] -= 1;
                    Monomial {
                        coeff: t.coeff * t.exps[axis] as f64,
                        exps,
                    }
                })
                .collect(),
        )
    }

    /// Gradient at a point.
    pub fn gradient(&self, p: &Point3) -> Vec3 {
        Vec3::new(
            self.derivative(0).evaluate(p),
            self.derivative(1).evaluate(p),
            self.derivative(2).evaluate(p),
        )
    }

    /// Hessian at a point.
    pub fn hessian(&self, p: &Point3) -> Matrix3<f64> {
        let mut h = Matrix3::zeros();
        for i in 0..3 {
            let di = self.derivative(i);
            for j in i..3 {
                let v = di.derivative(j).evaluate(p);
                h[(i, j)] = v;
                h[(j, i)] = v;
            }
        }
        h
    }

    /// First-order distance estimate `F / |∇F|`.
    pub fn distance_estimate(&self, p: &Point3) -> f64 {
        let f = self.evaluate(p);
        let g = self.gradient(p).norm();
        if g < 1e-300 {
            f
        } else {
            f / g
        }
    }
}
