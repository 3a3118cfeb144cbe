use criterion::{black_box, criterion_group, criterion_main, Criterion};

use conix_geom::{ConeSurface, CylinderSurface, Plane, SphereSurface, Surface};
use conix_intersect::{intersect_surfaces, IntersectSettings};
use conix_math::{BoundingRect, Point3, Vec3, TAU};

fn run(c: &mut Criterion, name: &str, a: &dyn Surface, ra: &BoundingRect, b: &dyn Surface, rb: &BoundingRect) {
    let settings = IntersectSettings::default();
    c.bench_function(name, |bench| {
        bench.iter(|| intersect_surfaces(black_box(a), ra, black_box(b), rb, &settings))
    });
}

fn bench_closed_forms(c: &mut Criterion) {
    let cyl_rect = BoundingRect::new(0.0, TAU, -5.0, 5.0).unwrap();
    let plane_rect = BoundingRect::new(-5.0, 5.0, -5.0, 5.0).unwrap();

    let plane = Plane::from_normal(Point3::origin(), Vec3::new(1.0, 0.0, -1.0));
    let cyl = CylinderSurface::new(1.0);
    run(c, "plane_cylinder", &plane, &plane_rect, &cyl, &cyl_rect);

    let other = CylinderSurface::with_axis(Point3::origin(), Vec3::x(), 1.0);
    run(c, "steinmetz", &cyl, &cyl_rect, &other, &cyl_rect);

    let offset = CylinderSurface::with_axis(Point3::new(0.3, 0.0, 0.0), Vec3::x(), 0.6);
    run(c, "cylinder_cylinder_sweep", &cyl, &cyl_rect, &offset, &cyl_rect);
}

fn bench_traced(c: &mut Criterion) {
    let sphere_rect = BoundingRect::new(0.0, TAU, -TAU / 4.0, TAU / 4.0).unwrap();
    let cone_rect = BoundingRect::new(0.0, TAU, 0.1, 6.0).unwrap();
    let cone = ConeSurface::new(std::f64::consts::FRAC_PI_4);
    let sphere = SphereSurface::with_center(Point3::new(0.0, 0.0, 2.0), 1.5);
    run(c, "cone_sphere", &cone, &cone_rect, &sphere, &sphere_rect);
}

criterion_group!(benches, bench_closed_forms, bench_traced);
criterion_main!(benches);
