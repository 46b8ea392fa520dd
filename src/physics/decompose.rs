//! Splits arbitrary simple polygons into convex pieces small enough for a
//! physics engine's polygon vertex limit.

use crate::geom::{self, winding};
use macroquad::prelude::*;
use std::collections::VecDeque;
use thiserror::Error;

/// Distance under which two coordinates are treated as equal.
pub const POINT_TOLERANCE: f32 = 0.1;

/// Upper bound on concave splits for one polygon.
const MAX_SPLITS: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecomposeError {
    #[error("polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("polygon edges {0} and {1} intersect")]
    SelfIntersecting(usize, usize),
    #[error("polygon could not be split into convex pieces")]
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    /// Positive [`winding`] turns; what the splitter expects.
    Canonical,
    /// Needs reversing before splitting.
    Reversed,
}

/// Where the infinite lines through `p1 p2` and `p3 p4` cross. `None` for
/// parallel lines.
pub fn hit_point(p1: Vec2, p2: Vec2, p3: Vec2, p4: Vec2) -> Option<Vec2> {
    let g1 = p3 - p1;
    let g2 = p2 - p1;
    let g3 = p4 - p3;
    let t = g3.perp_dot(g2);
    if t.abs() <= f32::EPSILON {
        return None;
    }
    let a = g3.perp_dot(g1) / t;
    Some(p1 + g2 * a)
}

/// `p` lies on the infinite line through `start` and `end`.
pub fn on_line(p: Vec2, start: Vec2, end: Vec2) -> bool {
    if (end.x - start.x).abs() > POINT_TOLERANCE {
        let slope = (end.y - start.y) / (end.x - start.x);
        let y = slope * (p.x - start.x) + start.y;
        return (y - p.y).abs() < POINT_TOLERANCE;
    }
    (p.x - start.x).abs() < POINT_TOLERANCE
}

/// `p` lies on the segment `start..end`, within tolerance.
pub fn on_seg(p: Vec2, start: Vec2, end: Vec2) -> bool {
    let within = |v: f32, a: f32, b: f32| {
        v >= a.min(b) - POINT_TOLERANCE && v <= a.max(b) + POINT_TOLERANCE
    };
    within(p.x, start.x, end.x) && within(p.y, start.y, end.y) && on_line(p, start, end)
}

pub fn points_match(a: Vec2, b: Vec2) -> bool {
    (a.x - b.x).abs() < POINT_TOLERANCE && (a.y - b.y).abs() < POINT_TOLERANCE
}

/// Rejects self-intersecting outlines and reports whether the winding has
/// to be reversed. An edge with no vertex strictly on its positive side
/// means the outline runs the wrong way.
pub fn check_shape(points: &[Vec2]) -> Result<Winding, DecomposeError> {
    let s = points.len();
    if s < 3 {
        return Err(DecomposeError::TooFewPoints(s));
    }

    let mut reversed = false;
    for i in 0..s {
        let i2 = (i + 1) % s;
        let i3 = (i + s - 1) % s;
        let mut positive = false;

        for j in 0..s {
            if j == i || j == i2 {
                continue;
            }
            if winding(points[i], points[i2], points[j]) > 0.0 {
                positive = true;
            }
            if j != i3 {
                let j2 = (j + 1) % s;
                if let Some(hp) = hit_point(points[i], points[i2], points[j], points[j2]) {
                    if on_seg(hp, points[i], points[i2]) && on_seg(hp, points[j], points[j2]) {
                        return Err(DecomposeError::SelfIntersecting(i, j));
                    }
                }
            }
        }
        if !positive {
            reversed = true;
        }
    }

    Ok(if reversed {
        Winding::Reversed
    } else {
        Winding::Canonical
    })
}

/// Fans a convex polygon out from its first vertex into pieces of at most
/// `max_vertices` points. Consecutive pieces share an edge, so the total
/// area is unchanged. Caps below 3 are treated as 3.
pub fn process_convex(points: &[Vec2], max_vertices: usize) -> Vec<Vec<Vec2>> {
    let max_vertices = max_vertices.max(3);
    let n = points.len();
    if n <= max_vertices {
        return vec![points.to_vec()];
    }

    let mut out = Vec::new();
    let mut start = 1;
    while start < n - 1 {
        let end = (start + max_vertices - 2).min(n - 1);
        let mut piece = Vec::with_capacity(end - start + 2);
        piece.push(points[0]);
        piece.extend_from_slice(&points[start..=end]);
        out.push(piece);
        start = end;
    }
    out
}

/// Repeatedly cuts a canonically wound polygon at its first reflex vertex
/// until only convex pieces are left.
pub fn process_concave(points: &[Vec2]) -> Result<Vec<Vec<Vec2>>, DecomposeError> {
    let mut queue = VecDeque::from([points.to_vec()]);
    let mut out = Vec::new();
    let mut splits = 0;

    while let Some(shape) = queue.pop_front() {
        match split_at_reflex(&shape)? {
            Some((a, b)) => {
                splits += 1;
                if splits > MAX_SPLITS {
                    return Err(DecomposeError::Degenerate);
                }
                queue.push_back(a);
                queue.push_back(b);
            }
            None => out.push(shape),
        }
    }
    Ok(out)
}

/// Extends the edge entering the first reflex vertex until it meets the
/// nearest other edge and cuts the polygon along that extension. When the
/// extension gives no usable cut, the reflex vertex is joined to its
/// nearest visible vertex instead.
fn split_at_reflex(shape: &[Vec2]) -> Result<Option<(Vec<Vec2>, Vec<Vec2>)>, DecomposeError> {
    let s = shape.len();
    if s < 3 {
        return Err(DecomposeError::Degenerate);
    }

    for i1 in 0..s {
        let i2 = (i1 + 1) % s;
        let i3 = (i1 + 2) % s;
        let (p1, p2) = (shape[i1], shape[i2]);
        if winding(p1, p2, shape[i3]) >= 0.0 {
            continue;
        }

        let mut nearest: Option<(f32, usize, usize, Vec2)> = None;
        for j1 in 0..s {
            if j1 == i1 || j1 == i2 {
                continue;
            }
            let j2 = (j1 + 1) % s;
            if let Some((t, hit)) = ray_hit(p1, p2, shape[j1], shape[j2]) {
                if nearest.map_or(true, |(best, ..)| t < best) {
                    nearest = Some((t, j1, j2, hit));
                }
            }
        }

        if let Some((_, j1, j2, mut hit)) = nearest {
            // a cut landing on a vertex goes to the vertex itself, which may
            // leave the reflex vertex off the cut line
            let mut tail = None;
            if points_match(hit, shape[j1]) {
                hit = shape[j1];
                tail = Some(p2);
            } else if points_match(hit, shape[j2]) {
                hit = shape[j2];
                tail = Some(p2);
            }

            let mut first = vec![hit];
            first.extend(walk(s, j2, i1).map(|k| shape[k]));
            first.extend(tail);
            let mut second: Vec<Vec2> = walk(s, i2, j1).map(|k| shape[k]).collect();
            second.push(hit);

            let (first, second) = (clean(first), clean(second));
            if usable(&first) && usable(&second) {
                return Ok(Some((first, second)));
            }
        }

        return split_at_diagonal(shape, i2).map(Some);
    }
    Ok(None)
}

/// Where the ray from `from` through `through` crosses the segment `a..b`
/// past `through`. The ray parameter is returned for ordering hits; it is
/// 1.0 at `through`.
fn ray_hit(from: Vec2, through: Vec2, a: Vec2, b: Vec2) -> Option<(f32, Vec2)> {
    let d = through - from;
    let e = b - a;
    let denom = d.perp_dot(e);
    if denom.abs() <= 1e-6 * d.length() * e.length() {
        return None;
    }
    let ap = a - from;
    let t = ap.perp_dot(e) / denom;
    let u = ap.perp_dot(d) / denom;
    let slack = POINT_TOLERANCE / e.length();
    if t <= 1.0 || u < -slack || u > 1.0 + slack {
        return None;
    }
    let hit = a + e * u.clamp(0.0, 1.0);
    if points_match(hit, through) {
        return None;
    }
    Some((t, hit))
}

/// Joins the reflex vertex `from` to the nearest vertex it can see.
fn split_at_diagonal(shape: &[Vec2], from: usize) -> Result<(Vec<Vec2>, Vec<Vec2>), DecomposeError> {
    let s = shape.len();
    let p = shape[from];
    let mut nearest: Option<(usize, f32)> = None;

    for j in 0..s {
        if j == from || j == (from + 1) % s || j == (from + s - 1) % s {
            continue;
        }
        let q = shape[j];
        let blocked = (0..s).any(|k| {
            let k2 = (k + 1) % s;
            ![from, j].contains(&k) && ![from, j].contains(&k2) && crosses(p, q, shape[k], shape[k2])
        });
        if blocked || !geom::point_in_polygon(shape, (p + q) * 0.5) {
            continue;
        }
        let d = p.distance_squared(q);
        if nearest.map_or(true, |(_, best)| d < best) {
            nearest = Some((j, d));
        }
    }

    let (j, _) = nearest.ok_or(DecomposeError::Degenerate)?;
    let first = clean(walk(s, from, j).map(|k| shape[k]).collect());
    let second = clean(walk(s, j, from).map(|k| shape[k]).collect());
    if usable(&first) && usable(&second) {
        Ok((first, second))
    } else {
        Err(DecomposeError::Degenerate)
    }
}

/// Indices from `a` forward to `b`, both included, wrapping at `len`.
fn walk(len: usize, a: usize, b: usize) -> impl Iterator<Item = usize> {
    let steps = (b + len - a) % len;
    (0..=steps).map(move |i| (a + i) % len)
}

/// Proper crossing of two segments; touching endpoints do not count.
fn crosses(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    let d1 = winding(a, b, c);
    let d2 = winding(a, b, d);
    let d3 = winding(c, d, a);
    let d4 = winding(c, d, b);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

/// Drops repeated points and collinear vertices.
fn clean(points: Vec<Vec2>) -> Vec<Vec2> {
    let mut out: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().map_or(true, |last| !points_match(*last, p)) {
            out.push(p);
        }
    }
    while out.len() > 1 && out.first().zip(out.last()).map_or(false, |(a, b)| points_match(*a, *b)) {
        out.pop();
    }

    let mut k = 0;
    while out.len() > 3 && k < out.len() {
        let n = out.len();
        let (a, b, c) = (out[(k + n - 1) % n], out[k], out[(k + 1) % n]);
        if winding(a, b, c).abs() <= 1e-4 * a.distance(b) * b.distance(c) {
            out.remove(k);
        } else {
            k += 1;
        }
    }
    out
}

fn usable(piece: &[Vec2]) -> bool {
    piece.len() >= 3 && geom::signed_area(piece) > 0.0
}

/// Full pipeline: validate, fix winding, split concave outlines and break
/// anything still over `max_vertices` into fans.
pub fn decompose(points: &[Vec2], max_vertices: usize) -> Result<Vec<Vec<Vec2>>, DecomposeError> {
    let mut pts = points.to_vec();
    if check_shape(&pts)? == Winding::Reversed {
        pts.reverse();
    }

    let pieces = if geom::is_convex(&pts) {
        vec![pts]
    } else {
        process_concave(&pts)?
    };

    Ok(pieces
        .into_iter()
        .filter(|p| p.len() >= 3)
        .flat_map(|p| process_convex(&p, max_vertices))
        .collect())
}
