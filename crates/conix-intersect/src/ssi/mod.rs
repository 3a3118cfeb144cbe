//! Surface/surface intersection.
//!
//! Pairs with a closed form produce exact lines, circles, and ellipses;
//! two circular cylinders get a dedicated ruling sweep. Every other pair
//! goes to the marching tracer, which falls back to bounding-box sampling
//! when neither surface has an implicit form. All results are clipped to
//! the two parameter rectangles.

mod analytic;
mod bbox;
mod clip;
mod cylinders;
mod tracer;

use conix_geom::{
    Curve3d, CylinderSurface, DualSurfaceCurve, Line3d, Plane, SphereSurface, Surface,
    SurfaceKind, SurfacePoint, TorusSurface,
};
use conix_math::{BoundingRect, Point2};
use tracing::debug;

use crate::project::{project_curve, unwrap_into_rect};
use crate::{downcast, IntersectSettings, Result};

/// A raw intersection branch before it is tied to both parameter spaces.
#[derive(Debug)]
pub(crate) enum Piece {
    /// Exact world curve; lines may be unbounded and are cut to the
    /// rectangles before projection.
    Exact(Box<dyn Curve3d>),
    /// Ordered samples with parameters on both surfaces.
    Sampled(Vec<SurfacePoint>),
}

impl Piece {
    fn swapped(self) -> Self {
        match self {
            Piece::Exact(c) => Piece::Exact(c),
            Piece::Sampled(pts) => Piece::Sampled(
                pts.into_iter()
                    .map(|p| SurfacePoint {
                        point: p.point,
                        uv_a: p.uv_b,
                        uv_b: p.uv_a,
                    })
                    .collect(),
            ),
        }
    }
}

/// One intersection problem: the operands, their rectangles, and the
/// working scale.
#[derive(Clone, Copy)]
pub(crate) struct Problem<'a> {
    pub a: &'a dyn Surface,
    pub rect_a: &'a BoundingRect,
    pub b: &'a dyn Surface,
    pub rect_b: &'a BoundingRect,
    pub settings: &'a IntersectSettings,
    /// Diagonal of the overlap of the two bounding boxes.
    pub scale: f64,
    /// Absolute distance tolerance.
    pub tol: f64,
}

impl<'a> Problem<'a> {
    pub(crate) fn swapped(&self) -> Problem<'a> {
        Problem {
            a: self.b,
            rect_a: self.rect_b,
            b: self.a,
            rect_b: self.rect_a,
            ..*self
        }
    }

    /// Marching step length.
    pub(crate) fn step(&self) -> f64 {
        self.settings.march_step * self.scale
    }
}

/// Intersect surface `a` over `rect_a` with surface `b` over `rect_b`.
///
/// Each returned curve carries its world geometry and its images in both
/// parameter spaces, all sharing one parameter. Tangential contacts that
/// reduce to isolated points produce no curve. Curves only touching a
/// rectangle border may be dropped.
pub fn intersect_surfaces(
    a: &dyn Surface,
    rect_a: &BoundingRect,
    b: &dyn Surface,
    rect_b: &BoundingRect,
    settings: &IntersectSettings,
) -> Result<Vec<DualSurfaceCurve>> {
    settings.validate()?;
    let mut box_a = a.bounding_box(rect_a);
    let mut box_b = b.bounding_box(rect_b);
    let big = box_a.diagonal().max(box_b.diagonal());
    box_a.expand(1e-9 * big);
    box_b.expand(1e-9 * big);
    let Some(overlap) = box_a.intersection(&box_b) else {
        debug!("bounding boxes disjoint");
        return Ok(Vec::new());
    };
    let scale = overlap.diagonal().max(1e-6 * big).max(1e-12);
    let problem = Problem {
        a,
        rect_a,
        b,
        rect_b,
        settings,
        scale,
        tol: settings.tolerance * scale.max(1.0),
    };

    let curves = match closed_form(&problem) {
        Some(pieces) => {
            debug!(
                a = ?a.surface_type(),
                b = ?b.surface_type(),
                pieces = pieces.len(),
                "closed-form intersection"
            );
            realize(&problem, pieces)
        }
        None => realize(&problem, tracer::trace(&problem)),
    };
    debug!(curves = curves.len(), "surface/surface intersection");
    Ok(curves)
}

fn both<'s, A: 'static, B: 'static>(a: &'s dyn Surface, b: &'s dyn Surface) -> Option<(&'s A, &'s B)> {
    Some((downcast::<A>(a)?, downcast::<B>(b)?))
}

fn mirrored(pieces: Option<Vec<Piece>>) -> Option<Vec<Piece>> {
    pieces.map(|ps| ps.into_iter().map(Piece::swapped).collect())
}

/// Exact branches for pairs that have them; `None` sends the pair to the
/// tracer.
fn closed_form(p: &Problem) -> Option<Vec<Piece>> {
    use SurfaceKind as K;
    let (a, b, tol) = (p.a, p.b, p.tol);
    match (a.surface_type(), b.surface_type()) {
        (K::Plane, K::Plane) => both::<Plane, Plane>(a, b)
            .map(|(x, y)| analytic::plane_plane(x, y)),
        (K::Plane, K::Cylinder) => both::<Plane, CylinderSurface>(a, b)
            .map(|(x, y)| analytic::plane_cylinder(x, y)),
        (K::Cylinder, K::Plane) => mirrored(
            both::<Plane, CylinderSurface>(b, a).map(|(x, y)| analytic::plane_cylinder(x, y)),
        ),
        (K::Plane, K::Sphere) => both::<Plane, SphereSurface>(a, b)
            .map(|(x, y)| analytic::plane_sphere(x, y, tol)),
        (K::Sphere, K::Plane) => mirrored(
            both::<Plane, SphereSurface>(b, a).map(|(x, y)| analytic::plane_sphere(x, y, tol)),
        ),
        (K::Plane, K::Torus) => both::<Plane, TorusSurface>(a, b)
            .and_then(|(x, y)| analytic::plane_torus(x, y, tol)),
        (K::Torus, K::Plane) => mirrored(
            both::<Plane, TorusSurface>(b, a).and_then(|(x, y)| analytic::plane_torus(x, y, tol)),
        ),
        (K::Sphere, K::Sphere) => both::<SphereSurface, SphereSurface>(a, b)
            .map(|(x, y)| analytic::sphere_sphere(x, y, tol)),
        (K::Cylinder, K::Cylinder) => both::<CylinderSurface, CylinderSurface>(a, b)
            .and_then(|(x, y)| cylinders::cylinder_cylinder(p, x, y)),
        (K::Cylinder, K::Sphere) => both::<CylinderSurface, SphereSurface>(a, b)
            .and_then(|(x, y)| analytic::cylinder_sphere(x, y, tol)),
        (K::Sphere, K::Cylinder) => mirrored(
            both::<CylinderSurface, SphereSurface>(b, a)
                .and_then(|(x, y)| analytic::cylinder_sphere(x, y, tol)),
        ),
        (K::Cylinder, K::Torus) => both::<CylinderSurface, TorusSurface>(a, b)
            .and_then(|(x, y)| analytic::cylinder_torus(x, y, tol)),
        (K::Torus, K::Cylinder) => mirrored(
            both::<CylinderSurface, TorusSurface>(b, a)
                .and_then(|(x, y)| analytic::cylinder_torus(x, y, tol)),
        ),
        _ => None,
    }
}

/// Tie each piece to both parameter spaces and clip it to the rectangles.
fn realize(p: &Problem, pieces: Vec<Piece>) -> Vec<DualSurfaceCurve> {
    let mut out = Vec::new();
    for piece in pieces {
        let dual = match piece {
            Piece::Exact(curve) => exact_dual(p, curve),
            Piece::Sampled(points) => sampled_dual(p, points),
        };
        if let Some(dual) = dual {
            out.extend(clip::clip_to_rects(p, dual));
        }
    }
    out
}

fn exact_dual(p: &Problem, curve: Box<dyn Curve3d>) -> Option<DualSurfaceCurve> {
    let line = curve.as_any().downcast_ref::<Line3d>().cloned();
    let curve: Box<dyn Curve3d> = match line {
        Some(line) => Box::new(clip::bound_line(p, &line)?),
        None => curve,
    };
    let n = p.settings.projection_samples;
    let curve_a = project_curve(p.a, curve.as_ref(), p.rect_a, n)?;
    let curve_b = project_curve(p.b, curve.as_ref(), p.rect_b, n)?;
    Some(DualSurfaceCurve::new(curve, curve_a, curve_b))
}

fn sampled_dual(p: &Problem, points: Vec<SurfacePoint>) -> Option<DualSurfaceCurve> {
    let min_gap = 1e-9 * p.scale;
    let mut points: Vec<SurfacePoint> = points.into_iter().fold(Vec::new(), |mut acc, sp| {
        if acc
            .last()
            .map_or(true, |last: &SurfacePoint| (last.point - sp.point).norm() > min_gap)
        {
            acc.push(sp);
        }
        acc
    });
    if points.len() < 2 {
        return None;
    }
    let mut uv_a: Vec<Point2> = points.iter().map(|s| s.uv_a).collect();
    let mut uv_b: Vec<Point2> = points.iter().map(|s| s.uv_b).collect();
    unwrap_into_rect(&mut uv_a, p.rect_a, &p.a.periodicity());
    unwrap_into_rect(&mut uv_b, p.rect_b, &p.b.periodicity());
    for ((sp, a), b) in points.iter_mut().zip(uv_a).zip(uv_b) {
        sp.uv_a = a;
        sp.uv_b = b;
    }
    DualSurfaceCurve::from_samples(&points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_math::{Point3, Vec3, TAU};

    fn plane_rect() -> BoundingRect {
        BoundingRect::new(-10.0, 10.0, -10.0, 10.0).unwrap()
    }

    #[test]
    fn test_plane_plane_line_bounded_to_rects() {
        let a = Plane::xy();
        let b = Plane::xz();
        let curves = intersect_surfaces(&a, &plane_rect(), &b, &plane_rect(), &IntersectSettings::default())
            .unwrap();
        assert_eq!(curves.len(), 1);
        let c = &curves[0];
        assert!((c.start_point() - c.end_point()).norm() > 19.9);
        assert!(c.deviation(&a, &b, 32) < 1e-9);
    }

    #[test]
    fn test_parallel_planes_empty() {
        let a = Plane::xy();
        let b = Plane::from_normal(Point3::new(0.0, 0.0, 1.0), Vec3::z());
        let curves = intersect_surfaces(&a, &plane_rect(), &b, &plane_rect(), &IntersectSettings::default())
            .unwrap();
        assert!(curves.is_empty());
    }

    #[test]
    fn test_disjoint_boxes_empty() {
        let a = SphereSurface::new(1.0);
        let b = SphereSurface::with_center(Point3::new(10.0, 0.0, 0.0), 1.0);
        let rect = BoundingRect::new(0.0, TAU, -TAU / 4.0, TAU / 4.0).unwrap();
        let curves = intersect_surfaces(&a, &rect, &b, &rect, &IntersectSettings::default()).unwrap();
        assert!(curves.is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = IntersectSettings {
            tolerance: 0.0,
            ..Default::default()
        };
        let a = Plane::xy();
        assert!(intersect_surfaces(&a, &plane_rect(), &a, &plane_rect(), &settings).is_err());
    }

    #[test]
    fn test_mirrored_pair_swaps_images() {
        let plane = Plane::xy();
        let cyl = CylinderSurface::new(1.0);
        let crect = BoundingRect::new(0.0, TAU, -5.0, 5.0).unwrap();
        let settings = IntersectSettings::default();
        let ab = intersect_surfaces(&plane, &plane_rect(), &cyl, &crect, &settings).unwrap();
        let ba = intersect_surfaces(&cyl, &crect, &plane, &plane_rect(), &settings).unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        assert!(ab[0].deviation(&plane, &cyl, 32) < 1e-9);
        assert!(ba[0].deviation(&cyl, &plane, 32) < 1e-9);
    }
}
