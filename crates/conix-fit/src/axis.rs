//! Axis directions as two polar angles.

use conix_math::{orthonormal_basis, Vec3};

/// Orthonormal frame whose equator holds the initial axis.
///
/// `direction(0, 0)` is the initial axis; the poles are perpendicular to it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AxisFrame {
    e1: Vec3,
    e2: Vec3,
    e3: Vec3,
}

impl AxisFrame {
    /// `None` for a zero or non-finite axis.
    pub(crate) fn new(axis: &Vec3) -> Option<Self> {
        let n = axis.norm();
        if !n.is_finite() || n < 1e-300 {
            return None;
        }
        let e1 = axis / n;
        let (e2, e3) = orthonormal_basis(&e1)?;
        Some(Self { e1, e2, e3 })
    }

    /// Unit axis at latitude `theta` and longitude `phi`.
    pub(crate) fn direction(&self, theta: f64, phi: f64) -> Vec3 {
        let (st, ct) = theta.sin_cos();
        let (sp, cp) = phi.sin_cos();
        ct * (cp * self.e1 + sp * self.e2) + st * self.e3
    }

    /// The two equatorial-complement directions, perpendicular to the
    /// initial axis.
    pub(crate) fn transverse(&self) -> (Vec3, Vec3) {
        (self.e2, self.e3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_angles_give_initial_axis() {
        let f = AxisFrame::new(&Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((f.direction(0.0, 0.0) - Vec3::new(0.0, 0.6, 0.8)).norm() < 1e-15);
    }

    #[test]
    fn test_directions_are_unit() {
        let f = AxisFrame::new(&Vec3::new(1.0, -2.0, 0.5)).unwrap();
        for (t, p) in [(0.3, -1.2), (1.5, 2.0), (-0.7, 0.1)] {
            assert!((f.direction(t, p).norm() - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn test_transverse_perpendicular() {
        let a = Vec3::new(1.0, 1.0, 1.0);
        let f = AxisFrame::new(&a).unwrap();
        let (b, c) = f.transverse();
        assert!(b.dot(&a).abs() < 1e-14);
        assert!(c.dot(&a).abs() < 1e-14);
        assert!(b.dot(&c).abs() < 1e-14);
    }

    #[test]
    fn test_zero_axis_rejected() {
        assert!(AxisFrame::new(&Vec3::zeros()).is_none());
    }
}
