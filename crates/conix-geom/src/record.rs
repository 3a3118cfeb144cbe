//! Serializable defining data for surfaces and curves.
//!
//! Records carry only what is needed to rebuild a value; derived data
//! (cylinder inverse, ellipse projections) is recomputed on load.

use serde::{Deserialize, Serialize};

use conix_math::{Point3, Transform, Vec3};

use crate::{
    try_dir, BSplineSurface, ConeSurface, Curve3d, CylinderSurface, Ellipse3d, Line3d, Plane,
    SphereSurface, Surface, TorusSurface,
};

fn arr(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn pt(p: &Point3) -> [f64; 3] {
    [p.x, p.y, p.z]
}

fn vec(a: &[f64; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

fn point(a: &[f64; 3]) -> Point3 {
    Point3::new(a[0], a[1], a[2])
}

/// Minimal defining data of a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SurfaceRecord {
    /// Plane through `origin` spanned by `x_dir` and `y_dir`.
    Plane {
        /// Origin point.
        origin: [f64; 3],
        /// u direction.
        x_dir: [f64; 3],
        /// v direction.
        y_dir: [f64; 3],
    },
    /// Cylinder as the placement of the unit cylinder.
    Cylinder {
        /// Column-major 4×4 placement matrix.
        transform: [f64; 16],
    },
    /// Cone by apex, axis, reference direction and half-angle.
    Cone {
        /// Apex.
        apex: [f64; 3],
        /// Axis direction.
        axis: [f64; 3],
        /// Direction of u = 0.
        ref_dir: [f64; 3],
        /// Half-angle in radians.
        half_angle: f64,
    },
    /// Sphere by center, radius, and frame.
    Sphere {
        /// Center.
        center: [f64; 3],
        /// Radius.
        radius: f64,
        /// Pole direction.
        axis: [f64; 3],
        /// Direction of u = 0.
        ref_dir: [f64; 3],
    },
    /// Torus by center, frame, and radii.
    Torus {
        /// Center.
        center: [f64; 3],
        /// Axis direction.
        axis: [f64; 3],
        /// Direction of u = 0.
        ref_dir: [f64; 3],
        /// Distance from center to tube center.
        major_radius: f64,
        /// Tube radius.
        minor_radius: f64,
    },
    /// Tensor-product B-spline by its control net and knots.
    BSpline {
        /// Control points, row-major with u varying fastest.
        control_points: Vec<[f64; 3]>,
        /// Control points along u.
        n_u: usize,
        /// Control points along v.
        n_v: usize,
        /// Knot vector in u.
        knots_u: Vec<f64>,
        /// Knot vector in v.
        knots_v: Vec<f64>,
        /// Degree in u.
        degree_u: usize,
        /// Degree in v.
        degree_v: usize,
    },
}

impl SurfaceRecord {
    /// Record for a concrete surface; `None` for unknown implementations.
    pub fn from_surface(s: &dyn Surface) -> Option<Self> {
        let any = s.as_any();
        if let Some(p) = any.downcast_ref::<Plane>() {
            return Some(Self::Plane {
                origin: pt(&p.origin),
                x_dir: arr(p.x_dir.as_ref()),
                y_dir: arr(p.y_dir.as_ref()),
            });
        }
        if let Some(c) = any.downcast_ref::<CylinderSurface>() {
            return Some(Self::Cylinder {
                transform: c.placement().forward().to_column_array(),
            });
        }
        if let Some(c) = any.downcast_ref::<ConeSurface>() {
            return Some(Self::Cone {
                apex: pt(&c.apex),
                axis: arr(c.axis.as_ref()),
                ref_dir: arr(c.ref_dir.as_ref()),
                half_angle: c.half_angle,
            });
        }
        if let Some(sp) = any.downcast_ref::<SphereSurface>() {
            return Some(Self::Sphere {
                center: pt(&sp.center),
                radius: sp.radius,
                axis: arr(sp.axis.as_ref()),
                ref_dir: arr(sp.ref_dir.as_ref()),
            });
        }
        if let Some(t) = any.downcast_ref::<TorusSurface>() {
            return Some(Self::Torus {
                center: pt(&t.center),
                axis: arr(t.axis.as_ref()),
                ref_dir: arr(t.ref_dir.as_ref()),
                major_radius: t.major_radius,
                minor_radius: t.minor_radius,
            });
        }
        let b = any.downcast_ref::<BSplineSurface>()?;
        Some(Self::BSpline {
            control_points: b.control_points.iter().map(pt).collect(),
            n_u: b.n_u,
            n_v: b.n_v,
            knots_u: b.knots_u.clone(),
            knots_v: b.knots_v.clone(),
            degree_u: b.degree_u,
            degree_v: b.degree_v,
        })
    }

    /// Rebuild the surface; `None` for degenerate directions, a singular
    /// cylinder placement, or an inconsistent B-spline net.
    pub fn to_surface(&self) -> Option<Box<dyn Surface>> {
        match self {
            Self::Plane {
                origin,
                x_dir,
                y_dir,
            } => {
                let (x, y) = (vec(x_dir), vec(y_dir));
                try_dir(&x.cross(&y))?;
                Some(Box::new(Plane::new(point(origin), x, y)))
            }
            Self::Cylinder { transform } => Some(Box::new(CylinderSurface::from_transform(
                Transform::from_column_slice(transform),
            )?)),
            Self::Cone {
                apex,
                axis,
                ref_dir,
                half_angle,
            } => Some(Box::new(ConeSurface {
                apex: point(apex),
                axis: try_dir(&vec(axis))?,
                ref_dir: try_dir(&vec(ref_dir))?,
                half_angle: *half_angle,
            })),
            Self::Sphere {
                center,
                radius,
                axis,
                ref_dir,
            } => Some(Box::new(SphereSurface {
                center: point(center),
                radius: *radius,
                axis: try_dir(&vec(axis))?,
                ref_dir: try_dir(&vec(ref_dir))?,
            })),
            Self::Torus {
                center,
                axis,
                ref_dir,
                major_radius,
                minor_radius,
            } => Some(Box::new(TorusSurface {
                center: point(center),
                axis: try_dir(&vec(axis))?,
                ref_dir: try_dir(&vec(ref_dir))?,
                major_radius: *major_radius,
                minor_radius: *minor_radius,
            })),
            Self::BSpline {
                control_points,
                n_u,
                n_v,
                knots_u,
                knots_v,
                degree_u,
                degree_v,
            } => Some(Box::new(BSplineSurface::new(
                control_points.iter().map(point).collect(),
                *n_u,
                *n_v,
                knots_u.clone(),
                knots_v.clone(),
                *degree_u,
                *degree_v,
            )?)),
        }
    }
}

/// Minimal defining data of an analytic curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CurveRecord {
    /// Line segment `origin + t·direction`.
    Line {
        /// Start point.
        origin: [f64; 3],
        /// Direction (end − start).
        direction: [f64; 3],
    },
    /// Ellipse or arc in its plane.
    Ellipse {
        /// Center.
        center: [f64; 3],
        /// Semi-diameter at angle 0.
        major: [f64; 3],
        /// Semi-diameter at angle π/2.
        minor: [f64; 3],
        /// Start angle.
        start: f64,
        /// Signed sweep.
        sweep: f64,
    },
}

impl CurveRecord {
    /// Record for a line or ellipse; `None` for other curves.
    pub fn from_curve(c: &dyn Curve3d) -> Option<Self> {
        let any = c.as_any();
        if let Some(l) = any.downcast_ref::<Line3d>() {
            return Some(Self::Line {
                origin: pt(&l.origin),
                direction: arr(&l.direction),
            });
        }
        let e = any.downcast_ref::<Ellipse3d>()?;
        Some(Self::Ellipse {
            center: pt(&e.center()),
            major: arr(&e.major_axis()),
            minor: arr(&e.minor_axis()),
            start: e.start(),
            sweep: e.sweep(),
        })
    }

    /// Rebuild the curve; `None` for degenerate ellipse axes.
    pub fn to_curve(&self) -> Option<Box<dyn Curve3d>> {
        match self {
            Self::Line { origin, direction } => Some(Box::new(Line3d {
                origin: point(origin),
                direction: vec(direction),
            })),
            Self::Ellipse {
                center,
                major,
                minor,
                start,
                sweep,
            } => Some(Box::new(Ellipse3d::new(
                point(center),
                vec(major),
                vec(minor),
                *start,
                *sweep,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conix_math::Point2;

    fn round_trip(s: &dyn Surface) -> Box<dyn Surface> {
        let rec = SurfaceRecord::from_surface(s).unwrap();
        let json = serde_json::to_string(&rec).unwrap();
        let back: SurfaceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
        back.to_surface().unwrap()
    }

    #[test]
    fn test_surface_records_rebuild_same_geometry() {
        let surfaces: Vec<Box<dyn Surface>> = vec![
            Box::new(Plane::from_normal(Point3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 1.0))),
            Box::new(
                CylinderSurface::elliptical(
                    Point3::new(0.0, 1.0, 0.0),
                    Vec3::new(0.0, 0.0, 2.0),
                    Vec3::new(3.0, 0.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                )
                .unwrap(),
            ),
            Box::new(ConeSurface::with_axis(Point3::origin(), Vec3::x(), 0.4).unwrap()),
            Box::new(SphereSurface::with_center(Point3::new(0.0, 0.0, 5.0), 2.0)),
            Box::new(TorusSurface::with_axis(Point3::origin(), Vec3::y(), 5.0, 1.0)),
            Box::new(
                BSplineSurface::clamped_uniform(
                    (0..9)
                        .map(|k| Point3::new((k % 3) as f64, (k / 3) as f64, 0.1 * (k * k) as f64))
                        .collect(),
                    3,
                    3,
                    2,
                    2,
                )
                .unwrap(),
            ),
        ];
        let uv = Point2::new(0.7, 0.4);
        for s in &surfaces {
            let back = round_trip(s.as_ref());
            assert_eq!(back.surface_type(), s.surface_type());
            assert!((back.evaluate(uv) - s.evaluate(uv)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_cylinder_record_is_column_major() {
        let cyl = CylinderSurface::with_axis(Point3::new(4.0, 5.0, 6.0), Vec3::z(), 1.0);
        match SurfaceRecord::from_surface(&cyl).unwrap() {
            SurfaceRecord::Cylinder { transform } => {
                assert_eq!(&transform[12..15], &[4.0, 5.0, 6.0]);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_singular_cylinder_record_rejected() {
        let rec = SurfaceRecord::Cylinder { transform: [0.0; 16] };
        assert!(rec.to_surface().is_none());
    }

    #[test]
    fn test_curve_records() {
        let arc = Ellipse3d::arc(Point3::origin(), Vec3::z(), 2.0, 0.5, 1.5).unwrap();
        let rec = CurveRecord::from_curve(&arc).unwrap();
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"type\":\"Ellipse\""));
        let back = serde_json::from_str::<CurveRecord>(&json).unwrap().to_curve().unwrap();
        assert!((back.evaluate(0.3) - arc.evaluate(0.3)).norm() < 1e-12);

        let line = Line3d::from_points(Point3::origin(), Point3::new(1.0, 1.0, 0.0));
        let back = CurveRecord::from_curve(&line).unwrap().to_curve().unwrap();
        assert!((back.evaluate(1.0) - line.end()).norm() < 1e-12);
    }
}
