//! Closed-form intersections between planes, spheres, tori, and circular
//! cylinders.
//!
//! Results are full lines and circles; bounding to the parameter
//! rectangles happens afterwards. Functions returning `Option` give `None`
//! for configurations without a closed form here.

use conix_geom::{CylinderSurface, Ellipse3d, Line3d, Plane, SphereSurface, TorusSurface};
use conix_math::{poly, Point3, Vec3, TAU};

use super::Piece;

/// Relative threshold for parallel directions.
const PARALLEL_EPS: f64 = 1e-12;

fn full_circle(center: Point3, x: Vec3, y: Vec3, radius: f64) -> Option<Piece> {
    let e = Ellipse3d::new(center, radius * x, radius * y, 0.0, TAU)?;
    Some(Piece::Exact(Box::new(e)))
}

/// Unit vectors spanning the plane perpendicular to a torus axis, with
/// the first one at u = 0.
fn torus_frame(t: &TorusSurface) -> (Vec3, Vec3) {
    let x = *t.ref_dir.as_ref();
    (x, t.axis.as_ref().cross(&x))
}

/// Circle frame of a circular cylinder: unit vectors at u = 0 and u = π/2.
fn cylinder_frame(c: &CylinderSurface) -> (Vec3, Vec3) {
    let f = c.placement().forward();
    (f.axis(0).normalize(), f.axis(1).normalize())
}

// =============================================================================
// Planes
// =============================================================================

/// A line, or nothing for parallel and coincident planes.
pub(super) fn plane_plane(a: &Plane, b: &Plane) -> Vec<Piece> {
    let n1 = a.normal_dir.as_ref();
    let n2 = b.normal_dir.as_ref();
    let dir = n1.cross(n2);
    let len = dir.norm();
    if len < PARALLEL_EPS {
        return Vec::new();
    }

    // Point on both planes in the span of the two normals
    let d1 = n1.dot(&a.origin.coords);
    let d2 = n2.dot(&b.origin.coords);
    let n1n2 = n1.dot(n2);
    let det = 1.0 - n1n2 * n1n2;
    let c1 = (d1 - d2 * n1n2) / det;
    let c2 = (d2 - d1 * n1n2) / det;
    let origin = Point3::from(c1 * n1 + c2 * n2);

    vec![Piece::Exact(Box::new(Line3d {
        origin,
        direction: dir / len,
    }))]
}

/// An ellipse when the plane crosses the axis, rulings when it is
/// parallel to it.
///
/// Works in the cylinder's local frame, where the surface is
/// `x² + y² = 1` and the plane is `m·p = k`.
pub(super) fn plane_cylinder(plane: &Plane, cyl: &CylinderSurface) -> Vec<Piece> {
    let pl = cyl.placement();
    let n = plane.normal_dir.as_ref();
    let m = pl.forward().linear().transpose() * n;
    let k = n.dot(&(plane.origin - cyl.origin()));

    if m.z.abs() <= PARALLEL_EPS * m.norm() {
        // m.x·cos u + m.y·sin u = k
        return poly::solve_trig(m.x, m.y, k)
            .into_iter()
            .map(|u| Piece::Exact(Box::new(cyl.ruling(u))))
            .collect();
    }

    let center = pl.to_world(&Point3::new(0.0, 0.0, k / m.z));
    let major = pl.vec_to_world(&Vec3::new(1.0, 0.0, -m.x / m.z));
    let minor = pl.vec_to_world(&Vec3::new(0.0, 1.0, -m.y / m.z));
    Ellipse3d::new(center, major, minor, 0.0, TAU)
        .map(|e| Piece::Exact(Box::new(e)))
        .into_iter()
        .collect()
}

/// A circle in the plane's own frame; tangency gives nothing.
pub(super) fn plane_sphere(plane: &Plane, sphere: &SphereSurface, tol: f64) -> Vec<Piece> {
    let d = plane.signed_distance(&sphere.center);
    let r = sphere.radius;
    if d.abs() >= r - tol {
        return Vec::new();
    }
    let center = sphere.center - d * plane.normal_dir.as_ref();
    let rho = (r * r - d * d).sqrt();
    full_circle(center, *plane.x_dir.as_ref(), *plane.y_dir.as_ref(), rho)
        .into_iter()
        .collect()
}

/// Circles for a plane perpendicular to the torus axis; `None` otherwise.
pub(super) fn plane_torus(plane: &Plane, torus: &TorusSurface, tol: f64) -> Option<Vec<Piece>> {
    let axis = torus.axis.as_ref();
    if plane.normal_dir.as_ref().cross(axis).norm() > 1e-9 {
        return None;
    }
    let z = axis.dot(&(plane.origin - torus.center));
    let (big_r, r) = (torus.major_radius, torus.minor_radius);
    if z.abs() > r + tol {
        return Some(Vec::new());
    }
    let center = torus.center + z * axis;
    let (x, y) = torus_frame(torus);
    let rho = (r * r - z * z).max(0.0).sqrt();
    let radii: Vec<f64> = if rho <= tol {
        vec![big_r]
    } else {
        [big_r - rho, big_r + rho].into_iter().filter(|&q| q > tol).collect()
    };
    Some(
        radii
            .into_iter()
            .filter_map(|q| full_circle(center, x, y, q))
            .collect(),
    )
}

// =============================================================================
// Spheres
// =============================================================================

/// The circle of two spheres. Concentric, disjoint, nested, and tangent
/// spheres give nothing.
pub(super) fn sphere_sphere(a: &SphereSurface, b: &SphereSurface, tol: f64) -> Vec<Piece> {
    let ab = b.center - a.center;
    let d = ab.norm();
    if d <= tol {
        return Vec::new();
    }
    if d >= a.radius + b.radius - tol || d <= (a.radius - b.radius).abs() + tol {
        return Vec::new();
    }

    // Distance from a's center to the circle plane
    let h = (d * d + a.radius * a.radius - b.radius * b.radius) / (2.0 * d);
    let rho = (a.radius * a.radius - h * h).max(0.0).sqrt();
    let dir = ab / d;
    let center = a.center + h * dir;
    Ellipse3d::circle(center, dir, rho)
        .map(|e| Piece::Exact(Box::new(e)))
        .into_iter()
        .collect()
}

/// Circles of a circular cylinder and a sphere centered on its axis;
/// `None` for any other placement.
pub(super) fn cylinder_sphere(
    cyl: &CylinderSurface,
    sphere: &SphereSurface,
    tol: f64,
) -> Option<Vec<Piece>> {
    let (o, axis, r) = cyl.circular_axis()?;
    let axis = *axis.as_ref();
    let rel = sphere.center - o;
    let foot = o + rel.dot(&axis) * axis;
    if (sphere.center - foot).norm() > tol {
        return None;
    }
    let big_r = sphere.radius;
    if big_r < r - tol {
        return Some(Vec::new());
    }
    let (x, y) = cylinder_frame(cyl);
    let offsets = if (big_r - r).abs() <= tol {
        vec![0.0]
    } else {
        let h = (big_r * big_r - r * r).sqrt();
        vec![-h, h]
    };
    Some(
        offsets
            .into_iter()
            .filter_map(|h| full_circle(foot + h * axis, x, y, r))
            .collect(),
    )
}

// =============================================================================
// Tori
// =============================================================================

/// Circles of a circular cylinder coaxial with a torus; `None` otherwise.
pub(super) fn cylinder_torus(
    cyl: &CylinderSurface,
    torus: &TorusSurface,
    tol: f64,
) -> Option<Vec<Piece>> {
    let (o, axis, rho) = cyl.circular_axis()?;
    let t_axis = torus.axis.as_ref();
    if axis.as_ref().cross(t_axis).norm() > 1e-9 {
        return None;
    }
    let rel = torus.center - o;
    if (rel - rel.dot(axis.as_ref()) * axis.as_ref()).norm() > tol {
        return None;
    }

    // Meridian circle (ρ - R)² + z² = r²
    let d = rho - torus.major_radius;
    let r = torus.minor_radius;
    if d.abs() > r + tol {
        return Some(Vec::new());
    }
    let z = (r * r - d * d).max(0.0).sqrt();
    let heights = if z <= tol { vec![0.0] } else { vec![-z, z] };
    let (x, y) = cylinder_frame(cyl);
    Some(
        heights
            .into_iter()
            .filter_map(|h| full_circle(torus.center + h * t_axis, x, y, rho))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_geom::Curve3d;

    fn exact(piece: &Piece) -> &dyn Curve3d {
        match piece {
            Piece::Exact(c) => c.as_ref(),
            Piece::Sampled(_) => panic!("expected an exact curve"),
        }
    }

    fn ellipse(piece: &Piece) -> &Ellipse3d {
        exact(piece).as_any().downcast_ref::<Ellipse3d>().unwrap()
    }

    #[test]
    fn test_plane_plane_line_on_both() {
        let a = Plane::xy();
        let b = Plane::from_normal(Point3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0));
        let pieces = plane_plane(&a, &b);
        assert_eq!(pieces.len(), 1);
        let c = exact(&pieces[0]);
        for t in [-3.0, 0.0, 2.5] {
            let p = c.evaluate(t);
            assert!(a.signed_distance(&p).abs() < 1e-12);
            assert!(b.signed_distance(&p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_plane_cylinder_oblique_ellipse() {
        let plane = Plane::from_normal(Point3::origin(), Vec3::new(1.0, 0.0, -1.0));
        let cyl = CylinderSurface::new(1.0);
        let pieces = plane_cylinder(&plane, &cyl);
        assert_eq!(pieces.len(), 1);
        let e = ellipse(&pieces[0]);
        assert!((e.major_axis().norm() - 2f64.sqrt()).abs() < 1e-12);
        assert!((e.minor_axis().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_plane_cylinder_parallel_rulings() {
        let plane = Plane::from_normal(Point3::new(0.5, 0.0, 0.0), Vec3::x());
        let cyl = CylinderSurface::new(1.0);
        let pieces = plane_cylinder(&plane, &cyl);
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            let p = exact(piece).evaluate(0.0);
            assert!((p.x - 0.5).abs() < 1e-12);
            assert!((p.x.hypot(p.y) - 1.0).abs() < 1e-12);
        }
        let far = Plane::from_normal(Point3::new(2.0, 0.0, 0.0), Vec3::x());
        assert!(plane_cylinder(&far, &cyl).is_empty());
    }

    #[test]
    fn test_plane_sphere_circle() {
        let plane = Plane::from_normal(Point3::new(0.0, 0.0, 0.6), Vec3::z());
        let pieces = plane_sphere(&plane, &SphereSurface::new(1.0), 1e-9);
        assert_eq!(pieces.len(), 1);
        let e = ellipse(&pieces[0]);
        assert!((e.major_axis().norm() - 0.8).abs() < 1e-12);
        assert!((e.center().z - 0.6).abs() < 1e-12);
        let tangent = Plane::from_normal(Point3::new(0.0, 0.0, 1.0), Vec3::z());
        assert!(plane_sphere(&tangent, &SphereSurface::new(1.0), 1e-9).is_empty());
    }

    #[test]
    fn test_plane_torus_two_circles() {
        let torus = TorusSurface::new(3.0, 1.0);
        let plane = Plane::from_normal(Point3::new(0.0, 0.0, 0.6), Vec3::z());
        let pieces = plane_torus(&plane, &torus, 1e-9).unwrap();
        assert_eq!(pieces.len(), 2);
        assert!((ellipse(&pieces[0]).major_axis().norm() - 2.2).abs() < 1e-12);
        assert!((ellipse(&pieces[1]).major_axis().norm() - 3.8).abs() < 1e-12);

        let top = Plane::from_normal(Point3::new(0.0, 0.0, 1.0), Vec3::z());
        assert_eq!(plane_torus(&top, &torus, 1e-9).unwrap().len(), 1);

        let oblique = Plane::from_normal(Point3::origin(), Vec3::new(1.0, 0.0, 1.0));
        assert!(plane_torus(&oblique, &torus, 1e-9).is_none());
    }

    #[test]
    fn test_sphere_sphere_circle() {
        let a = SphereSurface::new(1.0);
        let b = SphereSurface::with_center(Point3::new(1.0, 0.0, 0.0), 1.0);
        let pieces = sphere_sphere(&a, &b, 1e-9);
        assert_eq!(pieces.len(), 1);
        let e = ellipse(&pieces[0]);
        assert!((e.center().x - 0.5).abs() < 1e-12);
        assert!((e.major_axis().norm() - 0.75f64.sqrt()).abs() < 1e-12);

        let touching = SphereSurface::with_center(Point3::new(2.0, 0.0, 0.0), 1.0);
        assert!(sphere_sphere(&a, &touching, 1e-9).is_empty());
        assert!(sphere_sphere(&a, &SphereSurface::new(2.0), 1e-9).is_empty());
    }

    #[test]
    fn test_cylinder_sphere_coaxial_circles() {
        let cyl = CylinderSurface::new(0.6);
        let pieces = cylinder_sphere(&cyl, &SphereSurface::new(1.0), 1e-9).unwrap();
        assert_eq!(pieces.len(), 2);
        let zs: Vec<f64> = pieces.iter().map(|p| ellipse(p).center().z).collect();
        assert!((zs[0] + 0.8).abs() < 1e-12);
        assert!((zs[1] - 0.8).abs() < 1e-12);

        let off = SphereSurface::with_center(Point3::new(0.5, 0.0, 0.0), 1.0);
        assert!(cylinder_sphere(&cyl, &off, 1e-9).is_none());
        assert!(cylinder_sphere(&CylinderSurface::new(2.0), &SphereSurface::new(1.0), 1e-9)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cylinder_torus_coaxial_circles() {
        let torus = TorusSurface::new(3.0, 1.0);
        let pieces = cylinder_torus(&CylinderSurface::new(3.6), &torus, 1e-9).unwrap();
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            let e = ellipse(piece);
            assert!((e.center().z.abs() - 0.8).abs() < 1e-12);
            assert!((e.major_axis().norm() - 3.6).abs() < 1e-12);
        }
        assert!(cylinder_torus(&CylinderSurface::new(5.0), &torus, 1e-9)
            .unwrap()
            .is_empty());
        let tilted = CylinderSurface::with_axis(Point3::origin(), Vec3::x(), 1.0);
        assert!(cylinder_torus(&tilted, &torus, 1e-9).is_none());
    }
}
