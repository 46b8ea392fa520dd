//! Small geometry kernel shared by the object model, the batching engine,
//! the quadtree and the collision decomposer.

use macroquad::prelude::*;

/// z component of the cross product of `p1->p2` and `p1->p3`.
///
/// Positive when the triple turns the same way as the x axis turns into
/// the y axis; the decomposer treats that orientation as the canonical one.
#[inline]
pub fn winding(p1: Vec2, p2: Vec2, p3: Vec2) -> f32 {
    (p2 - p1).perp_dot(p3 - p1)
}

/// Shoelace signed area. Same sign convention as [`winding`].
pub fn signed_area(points: &[Vec2]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        sum += p.perp_dot(q);
    }
    sum * 0.5
}

#[inline]
pub fn area(points: &[Vec2]) -> f32 {
    signed_area(points).abs()
}

/// A polygon is convex when no two consecutive triples turn in opposite
/// directions. Collinear triples are ignored.
pub fn is_convex(points: &[Vec2]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut positive = false;
    let mut negative = false;
    for a in 0..n {
        let b = (a + 1) % n;
        let c = (b + 1) % n;
        let cross = winding(points[a], points[b], points[c]);
        if cross < 0.0 {
            negative = true;
        } else if cross > 0.0 {
            positive = true;
        }
        if positive && negative {
            return false;
        }
    }
    true
}

/// Area centroid of a closed polygon. `None` for degenerate input.
pub fn centroid(points: &[Vec2]) -> Option<Vec2> {
    if points.len() < 3 {
        return None;
    }
    let mut c = Vec2::ZERO;
    let mut signed = 0.0;
    for (i, p0) in points.iter().enumerate() {
        let p1 = points[(i + 1) % points.len()];
        let a = p0.perp_dot(p1);
        signed += a;
        c += (*p0 + p1) * a;
    }
    signed *= 0.5;
    if signed.abs() <= f32::EPSILON {
        return None;
    }
    Some(c / (6.0 * signed))
}

/// Tight bounding box around a point set, `None` when empty.
pub fn aabb(points: &[Vec2]) -> Option<Rect> {
    let first = *points.first()?;
    let (min, max) = points
        .iter()
        .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
    Some(Rect::new(min.x, min.y, max.x - min.x, max.y - min.y))
}

/// Min/max merge of two boxes.
pub fn merge(a: Rect, b: Rect) -> Rect {
    let min = vec2(a.x.min(b.x), a.y.min(b.y));
    let max = vec2(a.right().max(b.right()), a.bottom().max(b.bottom()));
    Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
}

/// Inclusive containment of `inner` in `outer`.
#[inline]
pub fn contains_rect(outer: &Rect, inner: &Rect) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.right() <= outer.right()
        && inner.bottom() <= outer.bottom()
}

/// Even-odd ray cast.
pub fn point_in_polygon(points: &[Vec2], point: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let pi = points[i];
        let pj = points[j];
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Rotates `point` clockwise (in y-down screen space) by `degrees` about `origin`.
pub fn rotate_about(point: Vec2, origin: Vec2, degrees: f32) -> Vec2 {
    if degrees == 0.0 {
        return point;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let d = point - origin;
    origin + vec2(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
}

impl Segment {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }

    /// Point where both segments cross, if they do. Parallel segments never
    /// report a crossing.
    pub fn intersection(&self, other: &Segment) -> Option<Vec2> {
        let s1 = self.end - self.start;
        let s2 = other.end - other.start;
        let denom = -s2.x * s1.y + s1.x * s2.y;
        if denom.abs() <= f32::EPSILON {
            return None;
        }
        let d = self.start - other.start;
        let s = (-s1.y * d.x + s1.x * d.y) / denom;
        let t = (s2.x * d.y - s2.y * d.x) / denom;
        if (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t) {
            Some(self.start + s1 * t)
        } else {
            None
        }
    }

    #[inline]
    pub fn intersects(&self, other: &Segment) -> bool {
        self.intersection(other).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Vec2> {
        vec![vec2(0.0, 0.0), vec2(10.0, 0.0), vec2(10.0, 10.0), vec2(0.0, 10.0)]
    }

    #[test]
    fn square_is_convex_with_centre_in_middle() {
        let sq = square();
        assert!(is_convex(&sq));
        assert_eq!(centroid(&sq), Some(vec2(5.0, 5.0)));
        assert_eq!(area(&sq), 100.0);
    }

    #[test]
    fn notched_shape_is_concave() {
        let l = vec![
            vec2(0.0, 0.0),
            vec2(2.0, 0.0),
            vec2(2.0, 1.0),
            vec2(1.0, 1.0),
            vec2(1.0, 2.0),
            vec2(0.0, 2.0),
        ];
        assert!(!is_convex(&l));
        assert_eq!(area(&l), 3.0);
    }

    #[test]
    fn ray_cast_containment() {
        let sq = square();
        assert!(point_in_polygon(&sq, vec2(5.0, 5.0)));
        assert!(!point_in_polygon(&sq, vec2(15.0, 5.0)));
        assert!(!point_in_polygon(&sq[..2], vec2(5.0, 0.0)));
    }

    #[test]
    fn bounding_box_and_merge() {
        let b = aabb(&[vec2(3.0, -1.0), vec2(-2.0, 4.0)]).unwrap();
        assert_eq!(b, Rect::new(-2.0, -1.0, 5.0, 5.0));
        let m = merge(b, Rect::new(10.0, 10.0, 1.0, 1.0));
        assert_eq!(m, Rect::new(-2.0, -1.0, 13.0, 12.0));
        assert!(contains_rect(&m, &b));
        assert!(!contains_rect(&b, &m));
        assert!(aabb(&[]).is_none());
    }

    #[test]
    fn crossing_segments() {
        let a = Segment::new(vec2(0.0, 0.0), vec2(10.0, 10.0));
        let b = Segment::new(vec2(0.0, 10.0), vec2(10.0, 0.0));
        assert_eq!(a.intersection(&b), Some(vec2(5.0, 5.0)));
        let c = Segment::new(vec2(0.0, 1.0), vec2(10.0, 11.0));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn quarter_turn_rotation() {
        let p = rotate_about(vec2(10.0, 0.0), Vec2::ZERO, 90.0);
        assert!((p - vec2(0.0, 10.0)).length() < 1e-4);
    }
}
