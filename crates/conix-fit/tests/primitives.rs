//! Fits through the public API against clouds sampled from known surfaces.

use conix_fit::{fit_cone, fit_cylinder, fit_quadric, ConeGuess, CylinderGuess, FitSettings};
use conix_geom::{ConeSurface, CylinderSurface, Surface};
use conix_math::{Point2, Point3, Vec3, TAU};

fn grid(s: &dyn Surface, u: (f64, f64), v: (f64, f64), n: usize) -> Vec<Point3> {
    let mut pts = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let a = u.0 + (u.1 - u.0) * i as f64 / n as f64;
            let b = v.0 + (v.1 - v.0) * j as f64 / (n - 1) as f64;
            pts.push(s.evaluate(Point2::new(a, b)));
        }
    }
    pts
}

#[test]
fn test_noise_free_cylinder_recovered() {
    let cyl = CylinderSurface::with_axis(Point3::new(-3.0, 4.0, 1.0), Vec3::new(1.0, 1.0, 0.0), 0.75);
    let pts = grid(&cyl, (0.0, TAU), (-1.0, 1.0), 10);
    let guess = CylinderGuess {
        center: Point3::new(-2.9, 4.0, 1.1),
        axis: Vec3::new(1.0, 0.9, 0.05),
        radius: 0.8,
    };
    let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
    let (c, a, r) = out.primitive.as_ref().unwrap().circular_axis().unwrap();
    let want = Vec3::new(1.0, 1.0, 0.0).normalize();
    assert!((r - 0.75).abs() < 1e-8);
    assert!(a.into_inner().cross(&want).norm() < 1e-8);
    assert!((c - Point3::new(-3.0, 4.0, 1.0)).cross(&want).norm() < 1e-8);
    assert!(out.error < 1e-14);
}

#[test]
fn test_partial_cylinder_patch() {
    // A quarter of the circumference still pins the axis down
    let cyl = CylinderSurface::new(2.0);
    let pts = grid(&cyl, (0.0, TAU / 4.0), (0.0, 3.0), 8);
    let guess = CylinderGuess {
        center: Point3::new(0.1, 0.1, 0.0),
        axis: Vec3::new(0.02, 0.0, 1.0),
        radius: 1.9,
    };
    let out = fit_cylinder(&pts, &guess, &FitSettings::default()).unwrap();
    let (_, _, r) = out.primitive.unwrap().circular_axis().unwrap();
    assert!((r - 2.0).abs() < 1e-6);
}

#[test]
fn test_cone_and_quadric_agree() {
    let cone = ConeSurface::new(0.5);
    let pts = grid(&cone, (0.0, TAU), (1.0, 2.0), 8);
    let out = fit_cone(&pts, &ConeGuess::from(&cone), &FitSettings::default()).unwrap();
    assert!(out.is_fitted());

    let q = fit_quadric(&pts, &FitSettings::default()).unwrap();
    let f = q.primitive.unwrap();
    for v in [1.2, 1.7] {
        let p = cone.evaluate(Point2::new(0.4, v));
        assert!(f.distance_estimate(&p).abs() < 1e-7);
    }
}
