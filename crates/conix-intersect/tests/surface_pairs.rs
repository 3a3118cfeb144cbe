//! End-to-end checks of `intersect_surfaces` on pairs with known answers.

use conix_geom::{
    BSplineSurface, ConeSurface, Curve3d, CylinderSurface, DualSurfaceCurve, Ellipse3d, Line3d, Plane,
    SphereSurface, Surface, TorusSurface,
};
use conix_intersect::{intersect_surfaces, IntersectSettings};
use conix_math::{BoundingRect, Dir3, Point3, Vec3, TAU};

fn cylinder_rect() -> BoundingRect {
    BoundingRect::new(0.0, TAU, -5.0, 5.0).unwrap()
}

fn sphere_rect() -> BoundingRect {
    BoundingRect::new(0.0, TAU, -TAU / 4.0, TAU / 4.0).unwrap()
}

fn torus_rect() -> BoundingRect {
    BoundingRect::new(0.0, TAU, 0.0, TAU).unwrap()
}

fn intersect(
    a: &dyn Surface,
    rect_a: &BoundingRect,
    b: &dyn Surface,
    rect_b: &BoundingRect,
) -> Vec<DualSurfaceCurve> {
    intersect_surfaces(a, rect_a, b, rect_b, &IntersectSettings::default()).unwrap()
}

fn assert_on_both(curves: &[DualSurfaceCurve], a: &dyn Surface, b: &dyn Surface, tol: f64) {
    for c in curves {
        let dev = c.deviation(a, b, 64);
        assert!(dev < tol, "deviation {dev} exceeds {tol}");
    }
}

#[test]
fn test_coaxial_cylinders_do_not_meet() {
    let outer = CylinderSurface::new(2.0);
    let inner = CylinderSurface::new(1.0);
    let r = cylinder_rect();
    assert!(intersect(&outer, &r, &inner, &r).is_empty());
}

#[test]
fn test_parallel_cylinders_meet_in_two_lines() {
    let a = CylinderSurface::new(1.0);
    let b = CylinderSurface::with_axis(Point3::new(1.0, 0.0, 0.0), Vec3::z(), 1.0);
    let r = cylinder_rect();
    let curves = intersect(&a, &r, &b, &r);
    assert_eq!(curves.len(), 2);
    for c in &curves {
        assert!(c.curve.as_any().downcast_ref::<Line3d>().is_some());
        let p = c.start_point();
        assert!((p.x - 0.5).abs() < 1e-9);
        assert!((p.y.abs() - 0.75f64.sqrt()).abs() < 1e-9);
        assert!((c.curve.length() - 10.0).abs() < 1e-6);
    }
    assert_on_both(&curves, &a, &b, 1e-7);
}

#[test]
fn test_steinmetz_cylinders_give_planar_arcs() {
    let a = CylinderSurface::new(1.0);
    let b = CylinderSurface::with_axis(Point3::origin(), Vec3::x(), 1.0);
    let r = cylinder_rect();
    let curves = intersect(&a, &r, &b, &r);
    assert_eq!(curves.len(), 4);
    let across = Vec3::z().cross(&Vec3::x()).normalize();
    for c in &curves {
        let arc = c
            .curve
            .as_any()
            .downcast_ref::<Ellipse3d>()
            .expect("steinmetz branches are elliptic arcs");
        assert!(arc.normal().dot(&across).abs() < 1e-9);
        for k in 0..=16 {
            let q = arc.evaluate(k as f64 / 16.0);
            assert!((q.x * q.x + q.y * q.y - 1.0).abs() < 1e-9);
            assert!((q.y * q.y + q.z * q.z - 1.0).abs() < 1e-9);
        }
    }
    assert_on_both(&curves, &a, &b, 1e-6);
}

#[test]
fn test_oblique_plane_cuts_cylinder_in_ellipse() {
    // The plane z = x
    let plane = Plane::from_normal(Point3::origin(), Vec3::new(1.0, 0.0, -1.0));
    let cyl = CylinderSurface::new(1.0);
    let pr = BoundingRect::new(-5.0, 5.0, -5.0, 5.0).unwrap();
    let curves = intersect(&plane, &pr, &cyl, &cylinder_rect());
    assert_eq!(curves.len(), 1);
    let ellipse = curves[0]
        .curve
        .as_any()
        .downcast_ref::<Ellipse3d>()
        .expect("oblique section is an ellipse");
    assert!(ellipse.is_closed());
    let (major, minor) = (ellipse.major_axis().norm(), ellipse.minor_axis().norm());
    let (big, small) = (major.max(minor), major.min(minor));
    assert!((big - 2f64.sqrt()).abs() < 1e-9);
    assert!((small - 1.0).abs() < 1e-9);
    assert_on_both(&curves, &plane, &cyl, 1e-6);
}

#[test]
fn test_plane_through_sphere_center_gives_great_circle() {
    let plane = Plane::from_normal(Point3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 1.0));
    let sphere = SphereSurface::with_center(Point3::new(1.0, 2.0, 3.0), 2.0);
    let pr = BoundingRect::new(-5.0, 5.0, -5.0, 5.0).unwrap();
    let curves = intersect(&plane, &pr, &sphere, &sphere_rect());
    assert_eq!(curves.len(), 1);
    assert!((curves[0].curve.length() - 2.0 * TAU).abs() < 1e-6);
    assert!(curves[0].is_closed(1e-9));
}

#[test]
fn test_sphere_and_cone_traced() {
    // Unit cone z = r against a sphere centred up the axis
    let cone = ConeSurface::new(std::f64::consts::FRAC_PI_4);
    let sphere = SphereSurface::with_center(Point3::new(0.0, 0.0, 2.0), 1.5);
    let rc = BoundingRect::new(0.0, TAU, 0.1, 6.0).unwrap();
    let curves = intersect(&cone, &rc, &sphere, &sphere_rect());
    assert_eq!(curves.len(), 2);
    assert_on_both(&curves, &cone, &sphere, 1e-5);

    // r² + (r - 2)² = 2.25 has roots r = 1 ± √0.125
    let mut radii: Vec<f64> = curves
        .iter()
        .map(|c| {
            let p = c.start_point();
            (p.x * p.x + p.y * p.y).sqrt()
        })
        .collect();
    radii.sort_by(f64::total_cmp);
    assert!((radii[0] - (1.0 - 0.125f64.sqrt())).abs() < 1e-5);
    assert!((radii[1] - (1.0 + 0.125f64.sqrt())).abs() < 1e-5);
    assert!(curves.iter().all(|c| c.is_closed(1e-5)));
}

fn assert_images_in_rects(curves: &[DualSurfaceCurve], rect_a: &BoundingRect, rect_b: &BoundingRect) {
    // Interpolation may bulge slightly past samples that sit on the boundary
    let eps = 1e-3;
    for c in curves {
        for (image, rect) in [(&c.curve_a, rect_a), (&c.curve_b, rect_b)] {
            let (t0, t1) = image.domain();
            for k in 0..=32 {
                let uv = image.evaluate(t0 + (t1 - t0) * k as f64 / 32.0);
                assert!(
                    rect.contains(&uv, eps),
                    "({}, {}) outside [{}, {}] x [{}, {}]",
                    uv.x,
                    uv.y,
                    rect.u_min(),
                    rect.u_max(),
                    rect.v_min(),
                    rect.v_max()
                );
            }
        }
    }
}

#[test]
fn test_traced_images_stay_in_rects() {
    let cone = ConeSurface::new(std::f64::consts::FRAC_PI_4);
    let sphere = SphereSurface::with_center(Point3::new(0.0, 0.0, 2.0), 1.5);
    let half = TAU / 2.0;
    for (u0, u1) in [(-half, half), (0.0, TAU)] {
        let rc = BoundingRect::new(u0, u1, 0.1, 6.0).unwrap();
        let rs = BoundingRect::new(u0, u1, -TAU / 4.0, TAU / 4.0).unwrap();
        let curves = intersect(&cone, &rc, &sphere, &rs);
        assert_eq!(curves.len(), 2);
        assert_images_in_rects(&curves, &rc, &rs);
        assert_on_both(&curves, &cone, &sphere, 1e-5);
    }
}

#[test]
fn test_internally_tangent_cylinder_images_stay_in_rects() {
    let big = CylinderSurface::new(1.0);
    let small = CylinderSurface::with_axis(Point3::new(0.0, 0.5, 0.0), Vec3::x(), 0.5);
    let r = cylinder_rect();
    let curves = intersect(&big, &r, &small, &r);
    assert!(!curves.is_empty());
    assert_images_in_rects(&curves, &r, &r);
}

#[test]
fn test_viviani_curve() {
    // Cylinder of half the sphere's radius through the sphere's centre;
    // the two touch internally at (1, 0, 0). Poles moved off the curve.
    let sphere = SphereSurface {
        axis: Dir3::new_normalize(Vec3::y()),
        ref_dir: Dir3::new_normalize(Vec3::z()),
        ..SphereSurface::new(1.0)
    };
    let cyl = CylinderSurface::with_axis(Point3::new(0.5, 0.0, 0.0), Vec3::z(), 0.5);
    let curves = intersect(&sphere, &sphere_rect(), &cyl, &cylinder_rect());
    assert!(!curves.is_empty());
    assert_on_both(&curves, &sphere, &cyl, 1e-4);

    // 4·√2·E(1/√2) for the unit sphere
    let expected = 7.640_395_578;
    let total: f64 = curves.iter().map(|c| c.curve.length()).sum();
    assert!((total - expected).abs() < 0.05 * expected, "length {total}");
    for c in &curves {
        for k in 0..=16 {
            let q = c.curve.evaluate(k as f64 / 16.0);
            assert!((q.coords.norm() - 1.0).abs() < 1e-4);
        }
    }
}

#[test]
fn test_cylinder_pierces_torus_tube() {
    let torus = TorusSurface::new(3.0, 1.0);
    let cyl = CylinderSurface::with_axis(Point3::origin(), Vec3::x(), 0.5);
    let curves = intersect(&torus, &torus_rect(), &cyl, &cylinder_rect());
    assert_eq!(curves.len(), 4);
    assert_on_both(&curves, &torus, &cyl, 1e-4);
    // Inner loops span |x| from √3.75 to 3 - √0.75, outer ones from 3 + √0.75 to √15.75
    let (mut inner, mut outer) = (0, 0);
    for c in &curves {
        assert!(c.is_closed(1e-5));
        let (t0, t1) = c.domain();
        let xs: Vec<f64> = (0..=32)
            .map(|k| c.point_at(t0 + (t1 - t0) * k as f64 / 32.0).point.x.abs())
            .collect();
        let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi < 3.0 {
            inner += 1;
            assert!(lo > 3.75f64.sqrt() - 1e-3 && hi < 3.0 - 0.75f64.sqrt() + 1e-3, "inner |x| in [{lo}, {hi}]");
        } else {
            outer += 1;
            assert!(lo > 3.0 + 0.75f64.sqrt() - 1e-3 && hi < 15.75f64.sqrt() + 1e-3, "outer |x| in [{lo}, {hi}]");
        }
    }
    assert_eq!((inner, outer), (2, 2));
}

#[test]
fn test_tangent_pairs_give_nothing() {
    let sphere = SphereSurface::new(1.0);
    let outside = CylinderSurface::with_axis(Point3::new(1.5, 0.0, 0.0), Vec3::z(), 0.5);
    assert!(intersect(&sphere, &sphere_rect(), &outside, &cylinder_rect()).is_empty());

    let other = SphereSurface::with_center(Point3::new(3.0, 0.0, 0.0), 2.0);
    assert!(intersect(&sphere, &sphere_rect(), &other, &sphere_rect()).is_empty());
}

#[test]
fn test_result_clipped_to_rectangles() {
    let plane = Plane::xy();
    let cyl = CylinderSurface::with_axis(Point3::origin(), Vec3::x(), 1.0);
    let pr = BoundingRect::new(-2.0, 2.0, -2.0, 2.0).unwrap();
    let half = BoundingRect::new(0.0, TAU, 0.0, 1.0).unwrap();
    let curves = intersect(&plane, &pr, &cyl, &half);
    for c in &curves {
        for k in 0..=8 {
            let q = c.curve.evaluate(k as f64 / 8.0);
            assert!(q.x >= -1e-9 && q.x <= 1.0 + 1e-9);
        }
    }
    assert_eq!(curves.len(), 2);
}

/// Quadratic Bézier dome over `[0, 2]²`, peak height 0.5 at the center.
fn dome() -> BSplineSurface {
    let pts = (0..9)
        .map(|k| {
            let z = if k == 4 { 2.0 } else { 0.0 };
            Point3::new((k % 3) as f64, (k / 3) as f64, z)
        })
        .collect();
    BSplineSurface::clamped_uniform(pts, 3, 3, 2, 2).unwrap()
}

fn unit_rect() -> BoundingRect {
    BoundingRect::new(0.0, 1.0, 0.0, 1.0).unwrap()
}

fn assert_at_height(curves: &[DualSurfaceCurve], z: f64, tol: f64) {
    for c in curves {
        let (t0, t1) = c.domain();
        for k in 0..=32 {
            let q = c.point_at(t0 + (t1 - t0) * k as f64 / 32.0).point;
            assert!((q.z - z).abs() < tol, "z = {}", q.z);
        }
    }
}

#[test]
fn test_plane_cuts_bspline_dome_in_closed_loop() {
    let patch = dome();
    let plane = Plane::from_normal(Point3::new(0.0, 0.0, 0.2), Vec3::z());
    let rp = BoundingRect::new(-5.0, 5.0, -5.0, 5.0).unwrap();
    let curves = intersect(&patch, &unit_rect(), &plane, &rp);
    assert_eq!(curves.len(), 1);
    assert!(curves[0].is_closed(1e-5));
    assert_on_both(&curves, &patch, &plane, 1e-5);
    assert_at_height(&curves, 0.2, 1e-5);
    assert_images_in_rects(&curves, &unit_rect(), &rp);
}

#[test]
fn test_two_bspline_patches_sampled_by_boxes() {
    let patch = dome();
    // Flat bilinear sheet at z = 0.2 covering the dome
    let sheet = BSplineSurface::clamped_uniform(
        vec![
            Point3::new(-0.5, -0.5, 0.2),
            Point3::new(2.5, -0.5, 0.2),
            Point3::new(-0.5, 2.5, 0.2),
            Point3::new(2.5, 2.5, 0.2),
        ],
        2,
        2,
        1,
        1,
    )
    .unwrap();
    assert!(patch.implicit().is_none() && sheet.implicit().is_none());
    let curves = intersect(&patch, &unit_rect(), &sheet, &unit_rect());
    assert!(!curves.is_empty());
    assert_on_both(&curves, &patch, &sheet, 1e-3);
    assert_at_height(&curves, 0.2, 1e-3);
    // The level set 8·u(1-u)·v(1-v) = 0.2 stays clear of the patch border
    for c in &curves {
        let (t0, t1) = c.domain();
        let uv = c.point_at(0.5 * (t0 + t1)).uv_a;
        assert!(uv.x > 0.05 && uv.x < 0.95 && uv.y > 0.05 && uv.y < 0.95);
    }
}
