use crate::diagnostics::{emit, Logger};
use crate::error::MapError;
use crate::geom;
use crate::layer::{LayerKind, MapLayer};
use crate::object::{DebugShape, MapObject};
use crate::physics::{BodyCreator, BodyType, PhysicsWorld};
use crate::properties::Properties;
use crate::spatial::quadtree::{Entry, ObjectRef, QuadTree};
use crate::tileset::{TileInfo, TileTable, Tileset};
use macroquad::prelude::*;
use std::path::PathBuf;

/// Colour of the debug grid lines.
pub const GRID_COLOUR: Color = Color::new(0.0, 0.0, 0.0, 120.0 / 255.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Orthogonal,
    Isometric,
}

/// Decoded image backing one texture id. Tileset atlases, collection
/// images and image layers all live in the same list.
#[derive(Clone)]
pub struct MapTexture {
    pub source: PathBuf,
    pub image: Image,
}

/// A loaded map: layers, tile table, textures and the object index.
pub struct Map {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) tile_size: Vec2,
    pub(crate) orientation: Orientation,
    pub(crate) properties: Properties,
    pub(crate) tiles: TileTable,
    pub(crate) textures: Vec<MapTexture>,
    pub(crate) layers: Vec<MapLayer>,
    pub(crate) logger: Logger,
    bounds: Rect,
    last_view: Option<Rect>,
    index: QuadTree,
    index_ready: bool,
}

impl Map {
    pub(crate) fn new(width: u32, height: u32, tile_size: Vec2, orientation: Orientation, logger: Logger) -> Self {
        let extent = vec2(width as f32 * tile_size.x, height as f32 * tile_size.y);
        Self {
            width,
            height,
            tile_size,
            orientation,
            properties: Properties::new(),
            tiles: TileTable::new(),
            textures: Vec::new(),
            layers: Vec::new(),
            logger,
            bounds: Rect::new(0.0, 0.0, extent.x, extent.y),
            last_view: None,
            index: QuadTree::new(Rect::new(0.0, 0.0, extent.x, extent.y)),
            index_ready: false,
        }
    }

    /// Width in tiles.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in tiles.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> Vec2 {
        self.tile_size
    }

    /// Size in pixels of the unprojected grid.
    pub fn map_size(&self) -> Vec2 {
        vec2(self.width as f32 * self.tile_size.x, self.height as f32 * self.tile_size.y)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn logger(&self) -> Logger {
        self.logger
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    /// Mutable access to the layers. Moving objects through this bypasses
    /// the index bookkeeping; use [`move_object`](Self::move_object) for that.
    pub fn layers_mut(&mut self) -> &mut [MapLayer] {
        &mut self.layers
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Map property rendered as text, empty when absent.
    pub fn property_string(&self, name: &str) -> String {
        self.properties.string_or_empty(name)
    }

    /// Tile data for a GID; flip flags are ignored.
    pub fn tile_info(&self, gid: u32) -> Option<&TileInfo> {
        self.tiles.get(gid & crate::gid::GID_MASK)
    }

    pub fn tile_properties(&self, gid: u32) -> Option<&Properties> {
        self.tiles.tile_properties(gid & crate::gid::GID_MASK)
    }

    pub fn tilesets(&self) -> &[Tileset] {
        self.tiles.tilesets()
    }

    pub fn textures(&self) -> &[MapTexture] {
        &self.textures
    }

    fn tile_ratio(&self) -> f32 {
        if self.tile_size.y > 0.0 {
            self.tile_size.x / self.tile_size.y
        } else {
            1.0
        }
    }

    /// Projects a point from Tiled's isometric object space to screen space.
    pub fn isometric_to_orthogonal(&self, p: Vec2) -> Vec2 {
        vec2(p.x - p.y, (p.x + p.y) / self.tile_ratio())
    }

    /// Inverse of [`isometric_to_orthogonal`](Self::isometric_to_orthogonal).
    pub fn orthogonal_to_isometric(&self, p: Vec2) -> Vec2 {
        let ry = p.y * self.tile_ratio();
        vec2((p.x + ry) / 2.0, (ry - p.x) / 2.0)
    }

    /// Updates every batch's visible range for `view`, grown by one tile on
    /// each side. Does nothing when `view` matches the previous call.
    pub fn cull(&mut self, view: Rect) {
        if self.last_view == Some(view) {
            return;
        }
        self.last_view = Some(view);

        let t = self.tile_size;
        self.bounds = Rect::new(view.x - t.x, view.y - t.y, view.w + t.x * 2.0, view.h + t.y * 2.0);
        for layer in &mut self.layers {
            layer.cull(self.bounds);
        }
    }

    /// Area used by the last cull.
    pub fn drawing_bounds(&self) -> Rect {
        self.bounds
    }

    /// Flushes queued quad movement and visibility into the vertex buffers.
    pub fn prepare_draw(&mut self) {
        for layer in &mut self.layers {
            layer.prepare_draw();
        }
    }

    /// Rebuilds the object index over `bounds`, usually the map area or a
    /// region around the player. Objects outside it are left out.
    pub fn update_index(&mut self, bounds: Rect) {
        self.index.clear(bounds);
        let mut skipped = 0;
        for (li, layer) in self.layers.iter().enumerate() {
            for (oi, obj) in layer.objects().iter().enumerate() {
                let entry = Entry {
                    object: ObjectRef { layer: li, object: oi },
                    aabb: obj.aabb(),
                };
                if !self.index.insert(entry) {
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            emit!(self.logger, Debug, "{skipped} objects lie outside the index bounds");
        }
        self.index_ready = true;
    }

    /// False until [`update_index`](Self::update_index) runs, and again after
    /// any object is moved.
    pub fn index_available(&self) -> bool {
        self.index_ready
    }

    /// Objects whose bounding boxes overlap `area`.
    pub fn query_index(&self, area: Rect) -> Result<Vec<ObjectRef>, MapError> {
        if !self.index_ready {
            emit!(self.logger, Warn, "object index queried before update_index");
            return Err(MapError::IndexUnavailable);
        }
        Ok(self.index.retrieve(area))
    }

    pub fn object(&self, r: ObjectRef) -> Option<&MapObject> {
        self.layers.get(r.layer)?.objects().get(r.object)
    }

    pub fn object_mut(&mut self, r: ObjectRef) -> Option<&mut MapObject> {
        self.layers.get_mut(r.layer)?.objects_mut().get_mut(r.object)
    }

    /// Moves an object's outline now and queues its tile quad, if it has
    /// one, for the next draw. The index goes stale.
    pub fn move_object(&mut self, r: ObjectRef, delta: Vec2) -> bool {
        let Some(obj) = self.object_mut(r) else {
            return false;
        };
        obj.translate(delta);
        let quad = obj.quad;
        if let Some(handle) = quad {
            if let Some(set) = self.set_for(handle.layer, handle.texture) {
                set.move_quad(handle.quad, delta);
            }
        }
        self.index_ready = false;
        true
    }

    /// Shows or hides an object. Tile objects are hidden by zeroing the
    /// alpha of their quad on the next draw.
    pub fn set_object_visible(&mut self, r: ObjectRef, visible: bool) -> bool {
        let Some(obj) = self.object_mut(r) else {
            return false;
        };
        obj.visible = visible;
        let quad = obj.quad;
        if let Some(handle) = quad {
            if let Some(set) = self.set_for(handle.layer, handle.texture) {
                set.set_quad_visible(handle.quad, visible);
            }
        }
        true
    }

    fn set_for(&mut self, layer: usize, texture: u16) -> Option<&mut crate::render::batch::LayerSet> {
        self.layers.get_mut(layer)?.sets_mut()?.get_mut(&texture)
    }

    /// Outlines of visible objects on visible object layers that overlap
    /// the drawing bounds, in their layer's colour.
    pub fn debug_shapes(&self) -> Vec<DebugShape> {
        let mut out = Vec::new();
        for layer in self.layers.iter().filter(|l| l.visible) {
            let LayerKind::Objects { objects, colour, .. } = &layer.kind else {
                continue;
            };
            out.extend(
                objects
                    .iter()
                    .filter(|o| o.visible && o.aabb().overlaps(&self.bounds))
                    .filter_map(|o| o.debug_shape(*colour)),
            );
        }
        out
    }

    /// Node rectangles of the object index, empty until it is built.
    pub fn index_outline(&self) -> Vec<[Vec2; 5]> {
        if !self.index_ready {
            return Vec::new();
        }
        self.index.outline()
    }

    /// One line strip zig-zagging over the tile grid, projected for
    /// isometric maps.
    pub fn debug_grid(&self) -> DebugShape {
        let iso = self.orientation == Orientation::Isometric;
        let step = vec2(
            if iso { self.tile_size.x / self.tile_ratio() } else { self.tile_size.x },
            self.tile_size.y,
        );
        let extent = vec2(self.width as f32 * step.x, self.height as f32 * step.y);

        let mut points = Vec::new();
        for x in (0..=self.width).step_by(2) {
            let mut px = x as f32 * step.x;
            points.push(vec2(px, 0.0));
            points.push(vec2(px, extent.y));
            px += step.x;
            points.push(vec2(px, extent.y));
            points.push(vec2(px, 0.0));
            px += step.x;
            points.push(vec2(px, 0.0));
        }
        for y in (0..=self.height).step_by(2) {
            let mut py = y as f32 * step.y;
            points.push(vec2(0.0, py));
            py += step.y;
            points.push(vec2(0.0, py));
            points.push(vec2(extent.x, py));
            py += step.y;
            points.push(vec2(extent.x, py));
        }
        if iso {
            for p in &mut points {
                *p = self.isometric_to_orthogonal(*p);
            }
        }

        DebugShape {
            points,
            closed: false,
            colour: GRID_COLOUR,
        }
    }

    /// Creates a body for every object of the named object layer. Objects
    /// whose outline cannot be turned into fixtures are logged and skipped.
    pub fn create_bodies<W: PhysicsWorld>(&self, world: &mut W, layer: &str, body_type: BodyType) -> Vec<W::Body> {
        let Some(layer) = self.layer_by_name(layer).filter(|l| l.is_objects()) else {
            emit!(self.logger, Warn, "no object layer named '{layer}'");
            return Vec::new();
        };

        let creator = BodyCreator::new(self.logger);
        let mut bodies = Vec::with_capacity(layer.objects().len());
        for obj in layer.objects() {
            match creator.add(obj, world, body_type) {
                Ok(body) => bodies.push(body),
                Err(e) => emit!(self.logger, Warn, "skipping body for '{}': {e}", obj.name),
            }
        }
        bodies
    }

    /// Bounding box of every tile batch and object, if the map has any.
    pub fn content_bounds(&self) -> Option<Rect> {
        let sets = self
            .layers
            .iter()
            .filter_map(|l| l.sets())
            .flat_map(|s| s.values())
            .filter_map(|s| s.bounds());
        let objects = self.layers.iter().flat_map(|l| l.objects()).map(|o| o.aabb());
        sets.chain(objects).reduce(geom::merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{rectangle_points, ObjectShape};
    use std::collections::BTreeMap;

    fn square(at: Vec2, side: f32) -> MapObject {
        let pts = rectangle_points(vec2(side, side)).into_iter().map(|p| p + at);
        MapObject::new(ObjectShape::Rectangle, at, vec2(side, side)).with_points(pts)
    }

    fn with_objects(objects: Vec<MapObject>) -> Map {
        let mut map = Map::new(10, 10, vec2(16.0, 16.0), Orientation::Orthogonal, Logger::silent());
        map.layers.push(MapLayer::new(
            "things",
            LayerKind::Objects {
                objects,
                sets: BTreeMap::new(),
                colour: WHITE,
            },
        ));
        map
    }

    #[test]
    fn isometric_projection_round_trips() {
        let map = Map::new(4, 4, vec2(64.0, 32.0), Orientation::Isometric, Logger::silent());
        for p in [vec2(0.0, 0.0), vec2(32.0, 0.0), vec2(17.5, 99.0), vec2(-8.0, 3.0)] {
            let back = map.orthogonal_to_isometric(map.isometric_to_orthogonal(p));
            assert!((back - p).length() < 1e-3, "{p:?} -> {back:?}");
        }
        assert_eq!(map.isometric_to_orthogonal(vec2(32.0, 0.0)), vec2(32.0, 16.0));
    }

    #[test]
    fn cull_grows_view_by_a_tile_and_skips_repeats() {
        let mut map = with_objects(Vec::new());
        map.cull(Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(map.drawing_bounds(), Rect::new(-16.0, -16.0, 132.0, 82.0));

        // same view: bounds untouched even if changed behind the map's back
        map.bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
        map.cull(Rect::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(map.drawing_bounds(), Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn index_must_be_built_before_queries() {
        let mut map = with_objects(vec![square(vec2(10.0, 10.0), 10.0), square(vec2(100.0, 100.0), 10.0)]);
        assert!(matches!(map.query_index(Rect::new(0.0, 0.0, 50.0, 50.0)), Err(MapError::IndexUnavailable)));

        map.update_index(Rect::new(0.0, 0.0, 160.0, 160.0));
        let found = map.query_index(Rect::new(0.0, 0.0, 50.0, 50.0)).expect("index");
        assert_eq!(found, vec![ObjectRef { layer: 0, object: 0 }]);

        assert!(map.move_object(ObjectRef { layer: 0, object: 1 }, vec2(-80.0, -80.0)));
        assert!(!map.index_available());
        map.update_index(Rect::new(0.0, 0.0, 160.0, 160.0));
        assert_eq!(map.query_index(Rect::new(0.0, 0.0, 50.0, 50.0)).expect("index").len(), 2);
    }

    #[test]
    fn debug_shapes_skip_hidden_objects() {
        let mut map = with_objects(vec![square(Vec2::ZERO, 10.0), square(vec2(20.0, 0.0), 10.0)]);
        map.cull(Rect::new(0.0, 0.0, 160.0, 160.0));
        assert_eq!(map.debug_shapes().len(), 2);
        map.set_object_visible(ObjectRef { layer: 0, object: 1 }, false);
        assert_eq!(map.debug_shapes().len(), 1);
        assert!(!map.set_object_visible(ObjectRef { layer: 3, object: 0 }, false));
    }

    #[test]
    fn grid_spans_the_map() {
        let map = with_objects(Vec::new());
        let grid = map.debug_grid();
        assert!(!grid.closed);
        let b = geom::aabb(&grid.points).expect("grid");
        assert!(b.w >= 160.0 && b.h >= 160.0);
    }
}
