//! macroquad drawing adapter. Everything GL-bound lives here; the rest of
//! the crate works on plain vertex data.

use crate::layer::{LayerKind, MapLayer};
use crate::map::Map;
use crate::object::DebugShape;
use crate::render::batch::TileVertex;
use macroquad::models::Vertex;
use macroquad::prelude::*;

/// macroquad's default per-draw-call limits; anything past them is clamped.
const DRAW_CALL_VERTICES: usize = 10_000;
const DRAW_CALL_INDICES: usize = 5_000;
/// Quads per mesh so neither limit is exceeded (833).
const MAX_MESH_QUADS: usize = {
    let by_vertices = DRAW_CALL_VERTICES / 4;
    let by_indices = DRAW_CALL_INDICES / 6;
    if by_vertices < by_indices {
        by_vertices
    } else {
        by_indices
    }
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawLayer {
    All,
    /// First layer in the file.
    Back,
    /// Last layer in the file.
    Front,
    Index(usize),
    /// Every layer, then object outlines.
    Debug,
}

pub struct MapRenderer {
    textures: Vec<Texture2D>,
    materials: Vec<Option<Material>>,
    pub debug_thickness: f32,
}

impl MapRenderer {
    /// Uploads every map texture. Needs a live macroquad context.
    pub fn new(map: &Map) -> Self {
        let textures = map
            .textures()
            .iter()
            .map(|t| {
                let tex = Texture2D::from_image(&t.image);
                tex.set_filter(FilterMode::Nearest);
                tex
            })
            .collect();
        Self {
            textures,
            materials: vec![None; map.layers().len()],
            debug_thickness: 1.0,
        }
    }

    pub fn texture(&self, id: u16) -> Option<&Texture2D> {
        self.textures.get(id as usize)
    }

    /// Shader used for one layer; `None` restores the default material.
    pub fn set_material(&mut self, layer: usize, material: Option<Material>) {
        if layer >= self.materials.len() {
            self.materials.resize(layer + 1, None);
        }
        self.materials[layer] = material;
    }

    /// Culls against the current camera rectangle, flushes queued quad
    /// edits and draws the requested layers.
    pub fn draw(&self, map: &mut Map, view: Rect, which: DrawLayer) {
        map.cull(view);
        map.prepare_draw();

        let count = map.layers().len();
        let range = match which {
            DrawLayer::All | DrawLayer::Debug => 0..count,
            DrawLayer::Back => 0..count.min(1),
            DrawLayer::Front => count.saturating_sub(1)..count,
            DrawLayer::Index(i) => i.min(count)..(i + 1).min(count),
        };
        for i in range {
            self.draw_layer(&map.layers()[i], i);
        }

        if which == DrawLayer::Debug {
            for shape in map.debug_shapes() {
                self.draw_shape(&shape);
            }
        }
    }

    fn draw_layer(&self, layer: &MapLayer, index: usize) {
        if !layer.visible {
            return;
        }
        let material = self.materials.get(index).and_then(Option::as_ref);
        if let Some(m) = material {
            gl_use_material(m);
        }

        match &layer.kind {
            LayerKind::Image { texture, position, size } => {
                if let Some(tex) = self.texture(*texture) {
                    draw_texture_ex(
                        tex,
                        position.x,
                        position.y,
                        Color::new(1.0, 1.0, 1.0, layer.opacity),
                        DrawTextureParams {
                            dest_size: Some(*size),
                            ..Default::default()
                        },
                    );
                }
            }
            _ => {
                for (texture, verts) in layer.batches() {
                    if let Some(tex) = self.texture(texture) {
                        draw_batch(tex, verts);
                    }
                }
            }
        }

        if material.is_some() {
            gl_use_default_material();
        }
    }

    pub fn draw_shape(&self, shape: &DebugShape) {
        for w in shape.points.windows(2) {
            draw_line(w[0].x, w[0].y, w[1].x, w[1].y, self.debug_thickness, shape.colour);
        }
        if shape.closed && shape.points.len() > 2 {
            if let (Some(a), Some(b)) = (shape.points.last(), shape.points.first()) {
                draw_line(a.x, a.y, b.x, b.y, self.debug_thickness, shape.colour);
            }
        }
    }

    /// Tile grid and quadtree node outlines.
    pub fn draw_debug(&self, map: &Map, grid: bool, index: bool) {
        if grid {
            self.draw_shape(&map.debug_grid());
        }
        if index {
            for outline in map.index_outline() {
                self.draw_shape(&DebugShape {
                    points: outline.to_vec(),
                    closed: false,
                    colour: GREEN,
                });
            }
        }
    }
}

fn draw_batch(texture: &Texture2D, verts: &[TileVertex]) {
    for (vertices, indices) in mesh_chunks(verts, texture.size()) {
        draw_mesh(&Mesh {
            vertices,
            indices,
            texture: Some(texture.clone()),
        });
    }
}

/// Splits quad vertices into meshes that each fit one macroquad draw call.
fn mesh_chunks(verts: &[TileVertex], texture_size: Vec2) -> impl Iterator<Item = (Vec<Vertex>, Vec<u16>)> + '_ {
    verts.chunks(MAX_MESH_QUADS * 4).map(move |chunk| {
        let vertices = chunk
            .iter()
            .map(|v| {
                Vertex::new(
                    v.position.x,
                    v.position.y,
                    0.0,
                    v.tex_coords.x / texture_size.x,
                    v.tex_coords.y / texture_size.y,
                    v.color,
                )
            })
            .collect();
        let indices = (0..(chunk.len() / 4) as u16)
            .flat_map(|q| {
                let b = q * 4;
                [b, b + 1, b + 2, b, b + 2, b + 3]
            })
            .collect();
        (vertices, indices)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quads(n: usize) -> Vec<TileVertex> {
        (0..n)
            .flat_map(|i| {
                let origin = vec2(i as f32 * 16.0, 0.0);
                let tex = [vec2(0.0, 0.0), vec2(16.0, 0.0), vec2(16.0, 16.0), vec2(0.0, 16.0)];
                crate::render::batch::tile_vertices(origin, vec2(16.0, 16.0), tex, WHITE)
            })
            .collect()
    }

    #[test]
    fn full_patch_is_split_to_fit_draw_calls() {
        // a 32x32 patch
        let verts = quads(1024);
        let meshes: Vec<_> = mesh_chunks(&verts, vec2(32.0, 32.0)).collect();
        assert_eq!(meshes.len(), 2);
        for (vertices, indices) in &meshes {
            assert!(vertices.len() <= DRAW_CALL_VERTICES);
            assert!(indices.len() <= DRAW_CALL_INDICES);
            assert_eq!(indices.len(), vertices.len() / 4 * 6);
            assert!(indices.iter().all(|i| (*i as usize) < vertices.len()));
        }
        let total: usize = meshes.iter().map(|(v, _)| v.len()).sum();
        assert_eq!(total, verts.len());
        assert_eq!(meshes[0].0[1].uv, vec2(0.5, 0.0));
    }

    #[test]
    fn small_batch_is_one_mesh() {
        let verts = quads(MAX_MESH_QUADS);
        assert_eq!(mesh_chunks(&verts, vec2(16.0, 16.0)).count(), 1);
    }
}
