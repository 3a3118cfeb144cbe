#![warn(missing_docs)]

//! Math types for the conix geometric core.
//!
//! Thin wrappers around nalgebra providing domain-specific types for
//! parametric geometry: points, vectors, directions, affine transforms
//! with a cached inverse, parameter-space rectangles with periodic seam
//! handling, 3D bounding boxes, polynomial root solvers, and implicit
//! polynomials in `(x, y, z)`.

mod bounds;
mod error;
pub mod implicit;
pub mod poly;

pub use bounds::{
    adjust_periodic, adjust_periodic_value, unwrap_periodic, BoundingBox3, BoundingRect,
    Periodicity,
};
pub use error::{MathError, Result};
pub use implicit::ImplicitPolynomial;

use nalgebra::{Matrix3, Matrix4, Unit, Vector2, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D parameter space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// Full turn in radians.
pub const TAU: f64 = std::f64::consts::TAU;

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Non-uniform scale by `(sx, sy, sz)`.
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = sx;
        m[(1, 1)] = sy;
        m[(2, 2)] = sz;
        Self { matrix: m }
    }

    /// Affine map whose columns are the images of the local axes and whose
    /// translation is `origin`: local `(x, y, z)` maps to
    /// `origin + x * x_axis + y * y_axis + z * z_axis`.
    pub fn from_frame(origin: &Point3, x_axis: &Vec3, y_axis: &Vec3, z_axis: &Vec3) -> Self {
        let mut m = Matrix4::identity();
        for row in 0..3 {
            m[(row, 0)] = x_axis[row];
            m[(row, 1)] = y_axis[row];
            m[(row, 2)] = z_axis[row];
            m[(row, 3)] = origin[row];
        }
        Self { matrix: m }
    }

    /// Rebuild a transform from 16 column-major values.
    pub fn from_column_slice(values: &[f64; 16]) -> Self {
        Self {
            matrix: Matrix4::from_column_slice(values),
        }
    }

    /// The 16 matrix entries in column-major order.
    pub fn to_column_array(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        out.copy_from_slice(self.matrix.as_slice());
        out
    }

    /// Image of the local origin.
    pub fn origin(&self) -> Point3 {
        Point3::new(self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)])
    }

    /// Image of local axis `i` (0 = x, 1 = y, 2 = z) as a vector.
    pub fn axis(&self, i: usize) -> Vec3 {
        Vec3::new(self.matrix[(0, i)], self.matrix[(1, i)], self.matrix[(2, i)])
    }

    /// The upper-left 3x3 linear part.
    pub fn linear(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Compose: `self` then `other` (self * other).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation, applies rotation/scale).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// Whether the linear part is numerically invertible relative to its scale.
    pub fn is_invertible(&self) -> bool {
        let scale = self.axis(0).norm() * self.axis(1).norm() * self.axis(2).norm();
        scale > 0.0 && self.linear().determinant().abs() > 1e-12 * scale
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// An affine placement: a forward transform together with its exact inverse.
///
/// The pair can only be created through [`Placement::new`], which computes the
/// inverse from the forward matrix, so the two never drift apart. Mutation
/// goes through [`Placement::then`], which returns a whole new placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    forward: Transform,
    inverse: Transform,
}

impl Placement {
    /// Build a placement, computing the inverse of `forward`.
    pub fn new(forward: Transform) -> Result<Self> {
        if !forward.is_invertible() {
            return Err(MathError::Singular);
        }
        let inverse = forward.inverse().ok_or(MathError::Singular)?;
        Ok(Self { forward, inverse })
    }

    /// Identity placement.
    pub fn identity() -> Self {
        Self {
            forward: Transform::identity(),
            inverse: Transform::identity(),
        }
    }

    /// Local-to-world transform.
    pub fn forward(&self) -> &Transform {
        &self.forward
    }

    /// World-to-local transform.
    pub fn inverse(&self) -> &Transform {
        &self.inverse
    }

    /// Map a local point to world space.
    pub fn to_world(&self, p: &Point3) -> Point3 {
        self.forward.apply_point(p)
    }

    /// Map a world point to local space.
    pub fn to_local(&self, p: &Point3) -> Point3 {
        self.inverse.apply_point(p)
    }

    /// Map a local vector to world space.
    pub fn vec_to_world(&self, v: &Vec3) -> Vec3 {
        self.forward.apply_vec(v)
    }

    /// Map a world vector to local space.
    pub fn vec_to_local(&self, v: &Vec3) -> Vec3 {
        self.inverse.apply_vec(v)
    }

    /// New placement with `t` applied after this one.
    pub fn then(&self, t: &Transform) -> Result<Self> {
        Self::new(t.then(&self.forward))
    }
}

/// Build an orthonormal pair perpendicular to `n` (which need not be unit).
///
/// Returns `None` for a zero-length input.
pub fn orthonormal_basis(n: &Vec3) -> Option<(Vec3, Vec3)> {
    let len = n.norm();
    if len < 1e-300 {
        return None;
    }
    let n = n / len;
    let arbitrary = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    let x = arbitrary.cross(&n).normalize();
    let y = n.cross(&x);
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = t.apply_point(&p);
        assert!((result - p).norm() < 1e-12);
    }

    #[test]
    fn test_translation() {
        let t = Transform::translation(10.0, 20.0, 30.0);
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = t.apply_point(&p);
        assert!((result.x - 11.0).abs() < 1e-12);
        assert!((result.y - 22.0).abs() < 1e-12);
        assert!((result.z - 33.0).abs() < 1e-12);
    }

    #[test]
    fn test_compose() {
        // then() multiplies self * other, so `other` is applied first
        let t1 = Transform::translation(1.0, 0.0, 0.0);
        let t2 = Transform::scale(2.0, 2.0, 2.0);
        let composed = t2.then(&t1);
        let result = composed.apply_point(&Point3::origin());
        assert!((result.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_frame_columns() {
        let t = Transform::from_frame(
            &Point3::new(1.0, 2.0, 3.0),
            &Vec3::new(2.0, 0.0, 0.0),
            &Vec3::new(0.0, 3.0, 0.0),
            &Vec3::new(0.0, 0.0, 1.0),
        );
        let p = t.apply_point(&Point3::new(1.0, 1.0, 1.0));
        assert!((p - Point3::new(3.0, 5.0, 4.0)).norm() < 1e-12);
        assert!((t.axis(1) - Vec3::new(0.0, 3.0, 0.0)).norm() < 1e-12);
        assert!((t.origin() - Point3::new(1.0, 2.0, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn test_column_array_round_trip() {
        let t = Transform::from_frame(
            &Point3::new(1.0, -2.0, 5.0),
            &Vec3::new(0.0, 0.3, 0.9),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 0.9, -0.3),
        );
        let back = Transform::from_column_slice(&t.to_column_array());
        assert_eq!(t, back);
    }

    #[test]
    fn test_placement_inverse_is_exact() {
        let t = Transform::translation(3.0, 0.0, -1.0)
            .then(&Transform::from_frame(
                &Point3::origin(),
                &Vec3::new(0.7, 0.0, -0.6),
                &Vec3::y(),
                &Vec3::new(0.6, 0.0, 0.7),
            ))
            .then(&Transform::scale(2.0, 0.5, 1.0));
        let placement = Placement::new(t).unwrap();
        let p = Point3::new(0.2, -4.0, 9.0);
        let back = placement.to_local(&placement.to_world(&p));
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_placement_rejects_singular() {
        let t = Transform::scale(1.0, 0.0, 1.0);
        assert!(matches!(Placement::new(t), Err(MathError::Singular)));
    }

    #[test]
    fn test_placement_then_recomputes_inverse() {
        let placement = Placement::identity();
        let moved = placement.then(&Transform::translation(0.0, 5.0, 0.0)).unwrap();
        let local = moved.to_local(&Point3::new(0.0, 5.0, 0.0));
        assert!(local.coords.norm() < 1e-12);
    }

    #[test]
    fn test_orthonormal_basis() {
        let n = Vec3::new(0.3, -2.0, 0.5);
        let (x, y) = orthonormal_basis(&n).unwrap();
        assert!(x.dot(&n).abs() < 1e-12);
        assert!(y.dot(&n).abs() < 1e-12);
        assert!((x.norm() - 1.0).abs() < 1e-12);
        assert!(x.dot(&y).abs() < 1e-12);
        assert!(orthonormal_basis(&Vec3::zeros()).is_none());
    }
}
