//! Per-texture tile batches.
//!
//! A [`LayerSet`] holds every tile quad a layer draws from one texture,
//! split into square patches of `patch_size` tiles so that culling can skip
//! whole patches. Quad edits are deferred: they are queued on the set and
//! written into the vertex buffers by [`LayerSet::prepare_draw`].

use crate::geom;
use macroquad::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileVertex {
    pub position: Vec2,
    /// Pixel coordinates into the set's texture.
    pub tex_coords: Vec2,
    pub color: Color,
}

/// Index of a quad inside its [`LayerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuadId(pub u32);

#[derive(Debug, Clone)]
pub struct TileQuad {
    pub patch: usize,
    /// Vertex indices into `patch`.
    pub indices: [usize; 4],
    pub color: Color,
    movement: Vec2,
    visible: bool,
    pending_visibility: Option<bool>,
    dirty: bool,
}

impl TileQuad {
    pub fn is_visible(&self) -> bool {
        self.pending_visibility.unwrap_or(self.visible)
    }

    /// Movement queued but not yet written to the vertices.
    pub fn pending_movement(&self) -> Vec2 {
        self.movement
    }
}

#[derive(Debug, Clone)]
pub struct LayerSet {
    texture: u16,
    patch_size: u32,
    patch_columns: usize,
    patch_rows: usize,
    patch_extent: Vec2,
    patches: Vec<Vec<TileVertex>>,
    quads: Vec<TileQuad>,
    dirty: Vec<QuadId>,
    bounds: Option<Rect>,
    visible: bool,
    cull_patches: bool,
    // inclusive patch coordinates
    range_start: (usize, usize),
    range_end: (usize, usize),
}

impl LayerSet {
    /// `map_tiles` is the layer size in tiles. A `patch_size` of 0 puts the
    /// whole layer in one patch. With `cull_patches` off only the set's
    /// bounding box is tested against the view, which is what isometric
    /// layers need since their grid does not line up with screen space.
    pub fn new(texture: u16, patch_size: u32, map_tiles: (u32, u32), tile_size: Vec2, cull_patches: bool) -> Self {
        let (patch_size, patch_columns, patch_rows) = if patch_size == 0 {
            (map_tiles.0.max(map_tiles.1).max(1), 1, 1)
        } else {
            (
                patch_size,
                map_tiles.0.div_ceil(patch_size).max(1) as usize,
                map_tiles.1.div_ceil(patch_size).max(1) as usize,
            )
        };
        let patch_count = patch_columns * patch_rows;
        Self {
            texture,
            patch_size,
            patch_columns,
            patch_rows,
            patch_extent: tile_size * patch_size as f32,
            patches: vec![Vec::new(); patch_count],
            quads: Vec::new(),
            dirty: Vec::new(),
            bounds: None,
            visible: true,
            cull_patches,
            range_start: (0, 0),
            range_end: (patch_columns - 1, patch_rows - 1),
        }
    }

    pub fn texture(&self) -> u16 {
        self.texture
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Bounding box of every vertex added so far, `None` while empty.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Result of the last [`cull`](Self::cull).
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn quad(&self, id: QuadId) -> Option<&TileQuad> {
        self.quads.get(id.0 as usize)
    }

    pub fn quad_vertices(&self, id: QuadId) -> Option<[TileVertex; 4]> {
        let quad = self.quad(id)?;
        let patch = &self.patches[quad.patch];
        Some(quad.indices.map(|i| patch[i]))
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Appends a quad for the tile at grid cell (`grid_x`, `grid_y`).
    /// Cells outside the layer land in the nearest edge patch.
    pub fn add_tile(&mut self, vertices: [TileVertex; 4], grid_x: u32, grid_y: u32) -> QuadId {
        let px = ((grid_x / self.patch_size) as usize).min(self.patch_columns - 1);
        let py = ((grid_y / self.patch_size) as usize).min(self.patch_rows - 1);
        let patch = py * self.patch_columns + px;

        let verts = &mut self.patches[patch];
        let base = verts.len();
        verts.extend_from_slice(&vertices);

        if let Some(quad_box) = geom::aabb(&vertices.map(|v| v.position)) {
            self.bounds = Some(match self.bounds {
                Some(b) => geom::merge(b, quad_box),
                None => quad_box,
            });
        }

        let id = QuadId(self.quads.len() as u32);
        self.quads.push(TileQuad {
            patch,
            indices: [base, base + 1, base + 2, base + 3],
            color: vertices[0].color,
            movement: Vec2::ZERO,
            visible: true,
            pending_visibility: None,
            dirty: false,
        });
        id
    }

    /// Queues a translation. Nothing is written until the next draw.
    pub fn move_quad(&mut self, id: QuadId, delta: Vec2) {
        if let Some(quad) = self.quads.get_mut(id.0 as usize) {
            quad.movement += delta;
            Self::mark_dirty(&mut self.dirty, quad, id);
        }
    }

    /// Queues a visibility change; hidden quads are drawn fully transparent.
    pub fn set_quad_visible(&mut self, id: QuadId, visible: bool) {
        if let Some(quad) = self.quads.get_mut(id.0 as usize) {
            quad.pending_visibility = Some(visible);
            Self::mark_dirty(&mut self.dirty, quad, id);
        }
    }

    fn mark_dirty(dirty: &mut Vec<QuadId>, quad: &mut TileQuad, id: QuadId) {
        if !quad.dirty {
            quad.dirty = true;
            dirty.push(id);
        }
    }

    /// Updates the set's visibility and, when patch culling is on, the
    /// range of patches overlapping `view`.
    pub fn cull(&mut self, view: Rect) {
        self.visible = self.bounds.is_some_and(|b| b.overlaps(&view));
        if !self.visible || !self.cull_patches {
            return;
        }

        let clamp = |v: f32, count: usize| (v.floor().max(0.0) as usize).min(count - 1);
        self.range_start = (
            clamp(view.x / self.patch_extent.x, self.patch_columns),
            clamp(view.y / self.patch_extent.y, self.patch_rows),
        );
        self.range_end = (
            clamp(view.right() / self.patch_extent.x, self.patch_columns),
            clamp(view.bottom() / self.patch_extent.y, self.patch_rows),
        );
    }

    /// Writes every queued edit into the vertex buffers, once per quad.
    pub fn prepare_draw(&mut self) {
        for id in std::mem::take(&mut self.dirty) {
            let quad = &mut self.quads[id.0 as usize];
            let verts = &mut self.patches[quad.patch];

            if quad.movement != Vec2::ZERO {
                for &i in &quad.indices {
                    verts[i].position += quad.movement;
                }
                quad.movement = Vec2::ZERO;
                let positions = quad.indices.map(|i| verts[i].position);
                if let (Some(b), Some(q)) = (self.bounds, geom::aabb(&positions)) {
                    self.bounds = Some(geom::merge(b, q));
                }
            }

            if let Some(visible) = quad.pending_visibility.take() {
                quad.visible = visible;
                let alpha = if visible { quad.color.a } else { 0.0 };
                for &i in &quad.indices {
                    verts[i].color.a = alpha;
                }
            }
            quad.dirty = false;
        }
    }

    /// Vertex runs of the non-empty patches inside the culled range. Empty
    /// when the last cull found the set off screen.
    pub fn visible_patches(&self) -> impl Iterator<Item = &[TileVertex]> + '_ {
        let (x0, y0, x1, y1) = if self.cull_patches {
            (self.range_start.0, self.range_start.1, self.range_end.0, self.range_end.1)
        } else {
            (0, 0, self.patch_columns - 1, self.patch_rows - 1)
        };
        let columns = self.patch_columns;
        let visible = self.visible;

        (y0..=y1)
            .flat_map(move |y| (x0..=x1).map(move |x| y * columns + x))
            .filter(move |_| visible)
            .map(move |i| self.patches[i].as_slice())
            .filter(|p| !p.is_empty())
    }

    /// Every vertex, ignoring culling.
    pub fn all_patches(&self) -> impl Iterator<Item = &[TileVertex]> + '_ {
        self.patches.iter().map(Vec::as_slice).filter(|p| !p.is_empty())
    }

    /// Rewrites the alpha of every visible quad.
    pub fn set_opacity(&mut self, alpha: f32) {
        for quad in &mut self.quads {
            quad.color.a = alpha;
            if quad.is_visible() {
                let verts = &mut self.patches[quad.patch];
                for &i in &quad.indices {
                    verts[i].color.a = alpha;
                }
            }
        }
    }
}

/// Quad vertices for a tile drawn with its top-left at `origin`.
pub fn tile_vertices(origin: Vec2, size: Vec2, tex_coords: [Vec2; 4], color: Color) -> [TileVertex; 4] {
    let positions = [
        origin,
        origin + vec2(size.x, 0.0),
        origin + size,
        origin + vec2(0.0, size.y),
    ];
    [0, 1, 2, 3].map(|i| TileVertex {
        position: positions[i],
        tex_coords: tex_coords[i],
        color,
    })
}
