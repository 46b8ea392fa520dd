use crate::geom::{self, Segment};
use crate::properties::{Properties, PropertyValue};
use crate::render::batch::QuadId;
use macroquad::prelude::*;

/// Points used to approximate ellipses and circles.
pub const ELLIPSE_POINTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectShape {
    Rectangle,
    Ellipse,
    Circle,
    Polygon,
    Polyline,
    Tile,
}

/// Locates a tile quad: layer index, texture of the owning `LayerSet`, and
/// the quad inside that set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadHandle {
    pub layer: usize,
    pub texture: u16,
    pub quad: QuadId,
}

/// Line strip for debug drawing, in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugShape {
    pub points: Vec<Vec2>,
    pub closed: bool,
    pub colour: Color,
}

/// A Tiled object. Points are stored in world space; the derived values
/// (centre, radius, segments, bounding box) are only valid after
/// [`rebuild`](Self::rebuild).
#[derive(Debug, Clone)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    pub kind: String,
    /// Name of the object layer this object was loaded from.
    pub parent: String,
    pub shape: ObjectShape,
    pub position: Vec2,
    pub size: Vec2,
    /// Degrees, clockwise about `position`.
    pub rotation: f32,
    pub visible: bool,
    pub properties: Properties,
    pub tile_gid: Option<u32>,
    pub(crate) quad: Option<QuadHandle>,
    points: Vec<Vec2>,
    centre: Vec2,
    radius: f32,
    segments: Vec<Segment>,
    aabb: Rect,
    built: bool,
}

impl MapObject {
    pub fn new(shape: ObjectShape, position: Vec2, size: Vec2) -> Self {
        Self {
            id: 0,
            name: String::new(),
            kind: String::new(),
            parent: String::new(),
            shape,
            position,
            size,
            rotation: 0.0,
            visible: true,
            properties: Properties::new(),
            tile_gid: None,
            quad: None,
            points: Vec::new(),
            centre: position,
            radius: 0.0,
            segments: Vec::new(),
            aabb: Rect::new(position.x, position.y, 0.0, 0.0),
            built: false,
        }
    }

    pub fn with_points(mut self, points: impl IntoIterator<Item = Vec2>) -> Self {
        self.points.extend(points);
        self.rebuild();
        self
    }

    /// Appends a world-space point and marks the derived values stale.
    pub fn add_point(&mut self, point: Vec2) {
        self.points.push(point);
        self.built = false;
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Recomputes centre, radius, segments and bounding box from the points.
    pub fn rebuild(&mut self) {
        self.segments = self.make_segments();
        self.aabb = geom::aabb(&self.points)
            .unwrap_or_else(|| Rect::new(self.position.x, self.position.y, self.size.x, self.size.y));
        self.compute_centre();
        self.built = true;
    }

    fn make_segments(&self) -> Vec<Segment> {
        let mut out: Vec<Segment> = self
            .points
            .windows(2)
            .map(|w| Segment::new(w[0], w[1]))
            .collect();
        if self.shape != ObjectShape::Polyline && self.points.len() > 2 {
            if let (Some(first), Some(last)) = (self.points.first(), self.points.last()) {
                out.push(Segment::new(*last, *first));
            }
        }
        out
    }

    fn compute_centre(&mut self) {
        if self.shape == ObjectShape::Polyline {
            let Some(&first) = self.points.first() else {
                self.centre = self.position;
                self.radius = 0.0;
                return;
            };
            let furthest = self
                .points
                .iter()
                .copied()
                .max_by(|a, b| first.distance_squared(*a).total_cmp(&first.distance_squared(*b)))
                .unwrap_or(first);
            self.centre = (first + furthest) * 0.5;
            self.radius = first.distance(furthest) * 0.5;
            return;
        }

        self.centre = if self.shape == ObjectShape::Rectangle || self.points.len() < 3 {
            self.aabb.center()
        } else {
            geom::centroid(&self.points).unwrap_or_else(|| self.aabb.center())
        };
        let centre = self.centre;
        self.radius = self
            .points
            .iter()
            .map(|p| p.distance(centre))
            .fold(0.0, f32::max);
    }

    pub fn centre(&self) -> Vec2 {
        self.centre
    }

    /// Distance from the centre to the furthest point.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn aabb(&self) -> Rect {
        self.aabb
    }

    pub fn quad(&self) -> Option<QuadHandle> {
        self.quad
    }

    /// Even-odd test against the world-space outline. Always false for
    /// polylines and for anything with fewer than three points.
    pub fn contains(&self, point: Vec2) -> bool {
        self.shape != ObjectShape::Polyline && geom::point_in_polygon(&self.points, point)
    }

    /// Either object containing a vertex of the other, after a bounding
    /// circle rejection.
    pub fn intersects(&self, other: &MapObject) -> bool {
        if self.centre.distance(other.centre) > self.radius + other.radius {
            return false;
        }
        other.points.iter().any(|p| self.contains(*p))
            || self.points.iter().any(|p| other.contains(*p))
    }

    /// Unit normal of the first edge crossed by the travel from `start` to
    /// `end`, pointing back against the travel. Without a crossing the
    /// normalised travel direction is returned.
    pub fn collision_normal(&self, start: Vec2, end: Vec2) -> Vec2 {
        let travel = end - start;
        let path = Segment::new(start, end);
        for s in &self.segments {
            if path.intersects(s) {
                let v = s.end - s.start;
                let mut n = vec2(v.y, -v.x);
                if n.dot(travel) > 0.0 {
                    n = -n;
                }
                return n.normalize_or_zero();
            }
        }
        travel.normalize_or_zero()
    }

    pub fn convex(&self) -> bool {
        self.shape != ObjectShape::Polyline && geom::is_convex(&self.points)
    }

    pub fn reverse_winding(&mut self) {
        self.points.reverse();
        self.rebuild();
    }

    pub fn first_point(&self) -> Vec2 {
        self.points.first().copied().unwrap_or(Vec2::ZERO)
    }

    pub fn last_point(&self) -> Vec2 {
        self.points.last().copied().unwrap_or(Vec2::ZERO)
    }

    /// The property rendered as text, or an empty string.
    pub fn property_string(&self, name: &str) -> String {
        self.properties.string_or_empty(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name, PropertyValue::String(value.into()));
    }

    /// Moves the outline and every derived value. A tile quad, if any, is
    /// moved by `Map::move_object`.
    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
        for p in &mut self.points {
            *p += delta;
        }
        for s in &mut self.segments {
            s.start += delta;
            s.end += delta;
        }
        self.centre += delta;
        self.aabb = self.aabb.offset(delta);
    }

    /// `None` when the object has no outline.
    pub fn debug_shape(&self, colour: Color) -> Option<DebugShape> {
        if self.points.is_empty() {
            return None;
        }
        Some(DebugShape {
            points: self.points.clone(),
            closed: self.shape != ObjectShape::Polyline,
            colour,
        })
    }
}

/// Outline of a `size` rectangle with its top-left at the origin.
pub fn rectangle_points(size: Vec2) -> Vec<Vec2> {
    vec![Vec2::ZERO, vec2(size.x, 0.0), size, vec2(0.0, size.y)]
}

/// [`ELLIPSE_POINTS`] points on the ellipse inscribed in a `size`
/// rectangle with its top-left at the origin.
pub fn ellipse_points(size: Vec2) -> Vec<Vec2> {
    let half = size * 0.5;
    let step = std::f32::consts::TAU / ELLIPSE_POINTS as f32;
    (0..ELLIPSE_POINTS)
        .map(|i| {
            let (sin, cos) = (i as f32 * step).sin_cos();
            half + vec2(half.x * cos, half.y * sin)
        })
        .collect()
}

/// Parses a Tiled `points` attribute: space separated `x,y` pairs.
pub fn parse_points(txt: &str) -> Option<Vec<Vec2>> {
    txt.split_whitespace()
        .map(|pair| {
            let (x, y) = pair.split_once(',')?;
            Some(vec2(x.trim().parse().ok()?, y.trim().parse().ok()?))
        })
        .collect()
}

/// Object layer colour: `#rrggbb` or `#aarrggbb`, leading `#` optional.
pub fn parse_colour(txt: &str) -> Option<Color> {
    let hex = txt.trim().trim_start_matches('#');
    let value = u32::from_str_radix(hex, 16).ok()?;
    let byte = |shift: u32| ((value >> shift) & 0xff) as u8;
    match hex.len() {
        6 => Some(Color::from_rgba(byte(16), byte(8), byte(0), 255)),
        8 => Some(Color::from_rgba(byte(16), byte(8), byte(0), byte(24))),
        _ => None,
    }
}
