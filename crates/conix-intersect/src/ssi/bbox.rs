//! Fallback for pairs where neither surface has an implicit form.
//!
//! Samples surface A on a grid, keeps the samples whose projection onto B
//! is close, polishes them onto the intersection, and chains the polished
//! points by nearest neighbour.

use conix_geom::{Surface, SurfacePoint};
use conix_math::Point2;
use tracing::debug;

use super::tracer::refine;
use super::{Piece, Problem};
use crate::{dedup_by_point, project_point};

pub(super) fn trace_by_boxes(p: &Problem) -> Vec<Piece> {
    let mut box_a = p.a.bounding_box(p.rect_a);
    let mut box_b = p.b.bounding_box(p.rect_b);
    box_a.expand(p.tol);
    box_b.expand(p.tol);
    let Some(overlap) = box_a.intersection(&box_b) else {
        return Vec::new();
    };

    let g = 2 * p.settings.seed_grid;
    let node = |i: usize, j: usize| p.rect_a.lerp(i as f64 / g as f64, j as f64 / g as f64);
    let cell = cell_size(p.a, &node, g);

    let mut near = Vec::new();
    for i in 0..=g {
        for j in 0..=g {
            let uv_a = node(i, j);
            let q = p.a.evaluate(uv_a);
            if !overlap.contains(&q) {
                continue;
            }
            let uv_b = project_point(p.b, &q, p.rect_b);
            if (p.b.evaluate(uv_b) - q).norm() > cell {
                continue;
            }
            if let Some(sp) = refine(p, uv_a, uv_b, None) {
                let inside = p.rect_a.contains_rel(&sp.uv_a, 1e-9) && p.rect_b.contains_rel(&sp.uv_b, 1e-9);
                if inside {
                    near.push(sp);
                }
            }
        }
    }
    let near = dedup_by_point(near, 0.25 * cell, |sp| sp.point);
    debug!(samples = near.len(), cell, "box sampling");
    chain(near, 3.0 * cell)
        .into_iter()
        .filter(|c| c.len() >= 3)
        .map(Piece::Sampled)
        .collect()
}

/// Largest distance between neighbouring grid nodes.
fn cell_size(s: &dyn Surface, node: &impl Fn(usize, usize) -> Point2, g: usize) -> f64 {
    let mut cell: f64 = 0.0;
    for i in 0..g {
        for j in 0..g {
            let q = s.evaluate(node(i, j));
            cell = cell
                .max((s.evaluate(node(i + 1, j)) - q).norm())
                .max((s.evaluate(node(i, j + 1)) - q).norm());
        }
    }
    cell
}

/// Greedy nearest-neighbour chains; links longer than `link` are cut.
fn chain(mut rest: Vec<SurfacePoint>, link: f64) -> Vec<Vec<SurfacePoint>> {
    let mut chains = Vec::new();
    while let Some(first) = rest.pop() {
        let mut c = vec![first];
        for forward in [true, false] {
            loop {
                let end = if forward { c[c.len() - 1] } else { c[0] };
                let nearest = rest
                    .iter()
                    .enumerate()
                    .map(|(k, sp)| (k, (sp.point - end.point).norm()))
                    .min_by(|x, y| x.1.total_cmp(&y.1));
                match nearest {
                    Some((k, d)) if d <= link => {
                        let sp = rest.swap_remove(k);
                        if forward {
                            c.push(sp);
                        } else {
                            c.insert(0, sp);
                        }
                    }
                    _ => break,
                }
            }
        }
        chains.push(c);
    }
    chains
}
