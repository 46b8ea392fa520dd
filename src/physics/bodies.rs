//! Turns map objects into physics body definitions.
//!
//! No physics engine is linked. Callers implement [`PhysicsWorld`] for
//! whatever engine they use and receive engine-neutral [`BodyDef`]s in
//! physics units: metres, y pointing up, polygons wound counter-clockwise.

use super::decompose::{self, DecomposeError};
use crate::diagnostics::{emit, Logger};
use crate::geom;
use crate::object::{MapObject, ObjectShape};
use macroquad::prelude::*;
use thiserror::Error;

pub const DEFAULT_PIXELS_PER_METRE: f32 = 100.0;
/// Box2D's `b2_maxPolygonVertices`.
pub const DEFAULT_MAX_VERTICES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    Static,
    Dynamic,
    Kinematic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixtureShape {
    Circle { centre: Vec2, radius: f32 },
    /// Axis-aligned box centred on the body.
    Box { half_extents: Vec2 },
    Polygon(Vec<Vec2>),
    Edge(Vec2, Vec2),
    Chain(Vec<Vec2>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    /// Type string of the source object, for engines that tag bodies.
    pub kind: String,
    pub shapes: Vec<FixtureShape>,
}

/// Seam to a physics engine.
pub trait PhysicsWorld {
    type Body;

    fn create_body(&mut self, def: BodyDef) -> Self::Body;
}

/// Pixel to metre conversion. Map space has y pointing down, physics space
/// has it pointing up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsScale {
    pub pixels_per_metre: f32,
}

impl Default for PhysicsScale {
    fn default() -> Self {
        Self {
            pixels_per_metre: DEFAULT_PIXELS_PER_METRE,
        }
    }
}

impl PhysicsScale {
    pub fn to_physics(&self, v: Vec2) -> Vec2 {
        vec2(v.x, -v.y) / self.pixels_per_metre
    }

    pub fn to_pixels(&self, v: Vec2) -> Vec2 {
        vec2(v.x, -v.y) * self.pixels_per_metre
    }

    pub fn length(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_metre
    }

    /// Clockwise degrees to counter-clockwise radians.
    pub fn angle(&self, degrees: f32) -> f32 {
        -degrees.to_radians()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("object '{0}' has no points")]
    Empty(String),
    #[error("object '{name}' cannot be split into convex pieces: {source}")]
    Decompose {
        name: String,
        #[source]
        source: DecomposeError,
    },
}

#[derive(Debug, Clone)]
pub struct BodyCreator {
    pub scale: PhysicsScale,
    pub max_vertices: usize,
    pub logger: Logger,
}

impl Default for BodyCreator {
    fn default() -> Self {
        Self {
            scale: PhysicsScale::default(),
            max_vertices: DEFAULT_MAX_VERTICES,
            logger: Logger::default(),
        }
    }
}

impl BodyCreator {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            ..Self::default()
        }
    }

    /// Builds the body definition for `object` without touching a world.
    pub fn body_def(&self, object: &MapObject, body_type: BodyType) -> Result<BodyDef, ShapeError> {
        let points = object.points();
        if points.is_empty() {
            return Err(ShapeError::Empty(object.name.clone()));
        }

        let def = |position: Vec2, shapes: Vec<FixtureShape>| BodyDef {
            body_type,
            position: self.scale.to_physics(position),
            kind: object.kind.clone(),
            shapes,
        };
        let local = |p: Vec2| self.scale.to_physics(p - object.position);

        if object.shape == ObjectShape::Polyline || points.len() < 3 {
            let local_points: Vec<Vec2> = points.iter().map(|p| local(*p)).collect();
            let fixture = match local_points.as_slice() {
                [a, b] => FixtureShape::Edge(*a, *b),
                _ => FixtureShape::Chain(local_points),
            };
            return Ok(def(object.position, vec![fixture]));
        }

        let aabb = object.aabb();
        if object.shape == ObjectShape::Circle {
            let fixture = FixtureShape::Circle {
                centre: Vec2::ZERO,
                radius: self.scale.length(aabb.w / 2.0),
            };
            return Ok(def(aabb.center(), vec![fixture]));
        }

        if object.shape == ObjectShape::Rectangle && object.rotation == 0.0 {
            let fixture = FixtureShape::Box {
                half_extents: vec2(self.scale.length(aabb.w), self.scale.length(aabb.h)) / 2.0,
            };
            return Ok(def(aabb.center(), vec![fixture]));
        }

        let polygon = |piece: &[Vec2]| {
            let mut pts: Vec<Vec2> = piece.iter().map(|p| local(*p)).collect();
            if geom::signed_area(&pts) < 0.0 {
                pts.reverse();
            }
            FixtureShape::Polygon(pts)
        };

        if points.len() <= self.max_vertices && geom::is_convex(points) {
            return Ok(def(object.position, vec![polygon(points)]));
        }

        let pieces = decompose::decompose(points, self.max_vertices).map_err(|source| ShapeError::Decompose {
            name: object.name.clone(),
            source,
        })?;
        emit!(
            self.logger,
            Debug,
            "split '{}' into {} convex pieces",
            object.name,
            pieces.len()
        );
        Ok(def(object.position, pieces.iter().map(|p| polygon(p)).collect()))
    }

    /// Builds the definition and hands it to the world.
    pub fn add<W: PhysicsWorld>(
        &self,
        object: &MapObject,
        world: &mut W,
        body_type: BodyType,
    ) -> Result<W::Body, ShapeError> {
        let def = self.body_def(object, body_type)?;
        Ok(world.create_body(def))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ellipse_points, rectangle_points};

    #[derive(Default)]
    struct RecordingWorld {
        bodies: Vec<BodyDef>,
    }

    impl PhysicsWorld for RecordingWorld {
        type Body = usize;

        fn create_body(&mut self, def: BodyDef) -> usize {
            self.bodies.push(def);
            self.bodies.len() - 1
        }
    }

    fn object(shape: ObjectShape, at: Vec2, local: Vec<Vec2>) -> MapObject {
        let mut obj = MapObject::new(shape, at, Vec2::ZERO).with_points(local.into_iter().map(|p| p + at));
        obj.name = "obj".into();
        obj
    }

    fn polygon_area(shape: &FixtureShape) -> f32 {
        match shape {
            FixtureShape::Polygon(p) => geom::signed_area(p),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn scale_flips_y() {
        let scale = PhysicsScale::default();
        assert_eq!(scale.to_physics(vec2(200.0, 50.0)), vec2(2.0, -0.5));
        assert_eq!(scale.to_pixels(vec2(2.0, -0.5)), vec2(200.0, 50.0));
        assert!((scale.angle(90.0) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn rectangle_becomes_a_centred_box() {
        let creator = BodyCreator::default();
        let mut world = RecordingWorld::default();
        let rect = object(ObjectShape::Rectangle, vec2(100.0, 100.0), rectangle_points(vec2(200.0, 50.0)));

        let id = creator.add(&rect, &mut world, BodyType::Static).expect("body");
        let body = &world.bodies[id];
        assert_eq!(body.position, vec2(2.0, -1.25));
        assert_eq!(
            body.shapes,
            vec![FixtureShape::Box {
                half_extents: vec2(1.0, 0.25)
            }]
        );
    }

    #[test]
    fn circle_uses_half_the_width() {
        let creator = BodyCreator::default();
        let circle = object(ObjectShape::Circle, Vec2::ZERO, ellipse_points(vec2(100.0, 100.0)));
        let body = creator.body_def(&circle, BodyType::Dynamic).expect("body");
        assert_eq!(body.body_type, BodyType::Dynamic);
        match body.shapes.as_slice() {
            [FixtureShape::Circle { radius, .. }] => assert!((radius - 0.5).abs() < 1e-4),
            other => panic!("unexpected fixtures {other:?}"),
        }
    }

    #[test]
    fn polylines_become_edges_or_chains() {
        let creator = BodyCreator::default();
        let edge = object(ObjectShape::Polyline, vec2(100.0, 0.0), vec![Vec2::ZERO, vec2(100.0, 0.0)]);
        let body = creator.body_def(&edge, BodyType::Static).expect("edge");
        assert_eq!(body.shapes, vec![FixtureShape::Edge(Vec2::ZERO, vec2(1.0, 0.0))]);

        let chain = object(
            ObjectShape::Polyline,
            Vec2::ZERO,
            vec![Vec2::ZERO, vec2(100.0, 0.0), vec2(100.0, 100.0)],
        );
        let body = creator.body_def(&chain, BodyType::Static).expect("chain");
        assert!(matches!(body.shapes.as_slice(), [FixtureShape::Chain(p)] if p.len() == 3));
    }

    #[test]
    fn polygons_are_counter_clockwise_in_physics_space() {
        let creator = BodyCreator::default();
        let tri = object(
            ObjectShape::Polygon,
            Vec2::ZERO,
            vec![Vec2::ZERO, vec2(100.0, 0.0), vec2(0.0, 100.0)],
        );
        let body = creator.body_def(&tri, BodyType::Static).expect("body");
        assert_eq!(body.shapes.len(), 1);
        assert!(polygon_area(&body.shapes[0]) > 0.0);
    }

    #[test]
    fn concave_polygons_are_split_under_the_cap() {
        let creator = BodyCreator::default();
        let l = object(
            ObjectShape::Polygon,
            Vec2::ZERO,
            vec![
                vec2(0.0, 0.0),
                vec2(200.0, 0.0),
                vec2(200.0, 100.0),
                vec2(100.0, 100.0),
                vec2(100.0, 200.0),
                vec2(0.0, 200.0),
            ],
        );
        let body = creator.body_def(&l, BodyType::Static).expect("body");
        assert_eq!(body.shapes.len(), 2);
        let total: f32 = body.shapes.iter().map(polygon_area).sum();
        assert!((total - 3.0).abs() < 1e-3);
    }

    #[test]
    fn large_ellipses_are_fanned() {
        let creator = BodyCreator::default();
        let ellipse = object(ObjectShape::Ellipse, Vec2::ZERO, ellipse_points(vec2(200.0, 100.0)));
        let body = creator.body_def(&ellipse, BodyType::Static).expect("body");
        assert!(body.shapes.len() > 1);
        for f in &body.shapes {
            match f {
                FixtureShape::Polygon(p) => assert!(p.len() <= DEFAULT_MAX_VERTICES),
                other => panic!("unexpected fixture {other:?}"),
            }
        }
    }

    #[test]
    fn self_intersecting_outline_is_rejected() {
        let creator = BodyCreator::default();
        let bow = object(
            ObjectShape::Polygon,
            Vec2::ZERO,
            vec![Vec2::ZERO, vec2(10.0, 10.0), vec2(10.0, 0.0), vec2(0.0, 10.0)],
        );
        let mut world = RecordingWorld::default();
        let err = creator.add(&bow, &mut world, BodyType::Static).unwrap_err();
        assert!(matches!(err, ShapeError::Decompose { .. }));
        assert!(world.bodies.is_empty());
    }
}
