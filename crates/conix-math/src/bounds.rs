//! Parameter-space rectangles, periodic seam handling, and 3D boxes.

use serde::{Deserialize, Serialize};

use crate::{MathError, Point2, Point3, Result, Vec3};

// =============================================================================
// Periodicity
// =============================================================================

/// Period of each parameter axis; `None` for a non-periodic axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Periodicity {
    /// Period along u.
    pub u: Option<f64>,
    /// Period along v.
    pub v: Option<f64>,
}

impl Periodicity {
    /// Neither axis is periodic.
    pub const NONE: Self = Self { u: None, v: None };

    /// Only u is periodic, with period `period`.
    pub fn u_only(period: f64) -> Self {
        Self {
            u: Some(period),
            v: None,
        }
    }

    /// Both axes are periodic.
    pub fn both(u: f64, v: f64) -> Self {
        Self {
            u: Some(u),
            v: Some(v),
        }
    }
}

/// Shift `x` by whole multiples of `period` so it falls in `[min, max]`.
///
/// A value already inside `[min - eps, max + eps]` is returned unchanged.
/// Otherwise the shifted value closest to the interval center is returned,
/// so a value that fits nowhere still ends up on the nearest turn.
pub fn adjust_periodic_value(x: f64, min: f64, max: f64, period: f64) -> f64 {
    if !x.is_finite() || period.is_nan() || period <= 0.0 {
        return x;
    }
    let eps = 1e-9 * period.max(1.0);
    if x >= min - eps && x <= max + eps {
        return x;
    }
    let center = 0.5 * (min + max);
    let k = ((center - x) / period).round();
    let shifted = x + k * period;
    // Prefer a candidate that actually lands inside
    for candidate in [shifted, shifted - period, shifted + period] {
        if candidate >= min - eps && candidate <= max + eps {
            return candidate;
        }
    }
    shifted
}

/// Seam adjustment of a parameter point against a domain rectangle.
///
/// Every periodic coordinate is shifted by whole periods into `rect`.
/// This is the single place where `position_of` results are reconciled
/// with a declared domain.
pub fn adjust_periodic(uv: Point2, rect: &BoundingRect, periodicity: &Periodicity) -> Point2 {
    let mut out = uv;
    if let Some(pu) = periodicity.u {
        out.x = adjust_periodic_value(uv.x, rect.u_min, rect.u_max, pu);
    }
    if let Some(pv) = periodicity.v {
        out.y = adjust_periodic_value(uv.y, rect.v_min, rect.v_max, pv);
    }
    out
}

/// Shift `x` by whole periods to the value nearest `prev`.
///
/// Used to keep parameters continuous along a traced curve crossing a seam.
pub fn unwrap_periodic(prev: f64, x: f64, period: f64) -> f64 {
    if period.is_nan() || period <= 0.0 {
        return x;
    }
    x + ((prev - x) / period).round() * period
}

// =============================================================================
// BoundingRect
// =============================================================================

/// Axis-aligned rectangle in a surface's parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RectData")]
pub struct BoundingRect {
    u_min: f64,
    u_max: f64,
    v_min: f64,
    v_max: f64,
}

#[derive(Deserialize)]
struct RectData {
    u_min: f64,
    u_max: f64,
    v_min: f64,
    v_max: f64,
}

impl TryFrom<RectData> for BoundingRect {
    type Error = MathError;

    fn try_from(d: RectData) -> Result<Self> {
        BoundingRect::new(d.u_min, d.u_max, d.v_min, d.v_max)
    }
}

impl BoundingRect {
    /// Create a rectangle, rejecting NaN, inverted, or zero-area input.
    pub fn new(u_min: f64, u_max: f64, v_min: f64, v_max: f64) -> Result<Self> {
        let ok = u_min.is_finite()
            && u_max.is_finite()
            && v_min.is_finite()
            && v_max.is_finite()
            && u_max > u_min
            && v_max > v_min;
        if !ok {
            return Err(MathError::DegenerateRect {
                u_min,
                u_max,
                v_min,
                v_max,
            });
        }
        Ok(Self {
            u_min,
            u_max,
            v_min,
            v_max,
        })
    }

    /// Lower u bound.
    pub fn u_min(&self) -> f64 {
        self.u_min
    }

    /// Upper u bound.
    pub fn u_max(&self) -> f64 {
        self.u_max
    }

    /// Lower v bound.
    pub fn v_min(&self) -> f64 {
        self.v_min
    }

    /// Upper v bound.
    pub fn v_max(&self) -> f64 {
        self.v_max
    }

    /// Extent along u.
    pub fn width(&self) -> f64 {
        self.u_max - self.u_min
    }

    /// Extent along v.
    pub fn height(&self) -> f64 {
        self.v_max - self.v_min
    }

    /// Center point.
    pub fn center(&self) -> Point2 {
        Point2::new(
            0.5 * (self.u_min + self.u_max),
            0.5 * (self.v_min + self.v_max),
        )
    }

    /// Point at fractional position `(s, t)` in `[0,1]²`.
    pub fn lerp(&self, s: f64, t: f64) -> Point2 {
        Point2::new(
            self.u_min + s * self.width(),
            self.v_min + t * self.height(),
        )
    }

    /// Containment test with an absolute margin `eps`.
    pub fn contains(&self, uv: &Point2, eps: f64) -> bool {
        uv.x >= self.u_min - eps
            && uv.x <= self.u_max + eps
            && uv.y >= self.v_min - eps
            && uv.y <= self.v_max + eps
    }

    /// Containment test with a margin relative to the rectangle size.
    pub fn contains_rel(&self, uv: &Point2, rel: f64) -> bool {
        let eps = rel * self.width().max(self.height()).max(1.0);
        self.contains(uv, eps)
    }

    /// Clamp a point into the rectangle.
    pub fn clamp(&self, uv: &Point2) -> Point2 {
        Point2::new(
            uv.x.clamp(self.u_min, self.u_max),
            uv.y.clamp(self.v_min, self.v_max),
        )
    }

    /// Split at `u`; `None` when `u` is not strictly inside.
    pub fn split_u(&self, u: f64) -> Option<(Self, Self)> {
        let margin = 1e-9 * self.width();
        if u <= self.u_min + margin || u >= self.u_max - margin {
            return None;
        }
        Some((
            Self {
                u_max: u,
                ..*self
            },
            Self {
                u_min: u,
                ..*self
            },
        ))
    }

    /// Split at `v`; `None` when `v` is not strictly inside.
    pub fn split_v(&self, v: f64) -> Option<(Self, Self)> {
        let margin = 1e-9 * self.height();
        if v <= self.v_min + margin || v >= self.v_max - margin {
            return None;
        }
        Some((
            Self {
                v_max: v,
                ..*self
            },
            Self {
                v_min: v,
                ..*self
            },
        ))
    }

    /// Split into up to four rectangles at a point; axes where the point is
    /// on or outside the border are left unsplit.
    pub fn split_at(&self, uv: &Point2) -> Vec<Self> {
        let halves = match self.split_u(uv.x) {
            Some((a, b)) => vec![a, b],
            None => vec![*self],
        };
        let mut out = Vec::with_capacity(4);
        for h in halves {
            match h.split_v(uv.y) {
                Some((a, b)) => {
                    out.push(a);
                    out.push(b);
                }
                None => out.push(h),
            }
        }
        out
    }
}

// =============================================================================
// BoundingBox3
// =============================================================================

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl BoundingBox3 {
    /// Create a box from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) box suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest box holding every point.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.include_point(p);
        }
        b
    }

    /// Whether no point has been included.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand this box to include another box.
    pub fn include_box(&mut self, other: &BoundingBox3) {
        if other.is_empty() {
            return;
        }
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Expand the box by a tolerance in all directions.
    pub fn expand(&mut self, tol: f64) {
        self.min.x -= tol;
        self.min.y -= tol;
        self.min.z -= tol;
        self.max.x += tol;
        self.max.y += tol;
        self.max.z += tol;
    }

    /// Test if two boxes overlap (touching counts as overlap).
    pub fn interferes(&self, other: &BoundingBox3) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Overlap of two boxes, `None` when they are disjoint.
    pub fn intersection(&self, other: &BoundingBox3) -> Option<BoundingBox3> {
        if !self.interferes(other) {
            return None;
        }
        Some(BoundingBox3 {
            min: Point3::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            max: Point3::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        })
    }

    /// Point containment (boundary included).
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Length of the diagonal; zero for an empty box.
    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max - self.min).norm()
        }
    }

    /// Parameter interval `[t_enter, t_exit]` of the ray `origin + t * dir`
    /// inside the box (slab method). `None` when the ray misses.
    pub fn ray_interval(&self, origin: &Point3, dir: &Vec3) -> Option<(f64, f64)> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for i in 0..3 {
            let (lo, hi, o, d) = (self.min[i], self.max[i], origin[i], dir[i]);
            if d.abs() < 1e-300 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t1, mut t2) = ((lo - o) * inv, (hi - o) * inv);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}

impl Default for BoundingBox3 {
    fn default() -> Self {
        Self::empty()
    }
}
