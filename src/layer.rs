use crate::object::MapObject;
use crate::properties::Properties;
use crate::render::batch::{LayerSet, TileVertex};
use macroquad::prelude::*;
use std::collections::BTreeMap;

/// Default debug colour of object layers without a `color` attribute.
pub const DEFAULT_OBJECT_COLOUR: Color = Color::new(127.0 / 255.0, 127.0 / 255.0, 127.0 / 255.0, 1.0);

pub enum LayerKind {
    /// Tile batches keyed by texture id.
    Tiles { sets: BTreeMap<u16, LayerSet> },
    /// Objects plus the batches their tile objects draw through.
    Objects {
        objects: Vec<MapObject>,
        sets: BTreeMap<u16, LayerSet>,
        colour: Color,
    },
    Image {
        texture: u16,
        position: Vec2,
        size: Vec2,
    },
}

pub struct MapLayer {
    pub name: String,
    pub opacity: f32,
    /// Hidden layers keep their vertices; they are only skipped when drawing.
    pub visible: bool,
    pub offset: Vec2,
    pub properties: Properties,
    pub kind: LayerKind,
}

impl MapLayer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            opacity: 1.0,
            visible: true,
            offset: Vec2::ZERO,
            properties: Properties::new(),
            kind,
        }
    }

    pub fn is_tiles(&self) -> bool {
        matches!(self.kind, LayerKind::Tiles { .. })
    }

    pub fn is_objects(&self) -> bool {
        matches!(self.kind, LayerKind::Objects { .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, LayerKind::Image { .. })
    }

    pub fn sets(&self) -> Option<&BTreeMap<u16, LayerSet>> {
        match &self.kind {
            LayerKind::Tiles { sets } | LayerKind::Objects { sets, .. } => Some(sets),
            LayerKind::Image { .. } => None,
        }
    }

    pub fn sets_mut(&mut self) -> Option<&mut BTreeMap<u16, LayerSet>> {
        match &mut self.kind {
            LayerKind::Tiles { sets } | LayerKind::Objects { sets, .. } => Some(sets),
            LayerKind::Image { .. } => None,
        }
    }

    pub fn objects(&self) -> &[MapObject] {
        match &self.kind {
            LayerKind::Objects { objects, .. } => objects,
            _ => &[],
        }
    }

    pub fn objects_mut(&mut self) -> &mut [MapObject] {
        match &mut self.kind {
            LayerKind::Objects { objects, .. } => objects,
            _ => &mut [],
        }
    }

    pub fn cull(&mut self, view: Rect) {
        if let Some(sets) = self.sets_mut() {
            for set in sets.values_mut() {
                set.cull(view);
            }
        }
    }

    /// Flushes queued quad edits of every batch.
    pub fn prepare_draw(&mut self) {
        if let Some(sets) = self.sets_mut() {
            for set in sets.values_mut() {
                set.prepare_draw();
            }
        }
    }

    /// Visible vertex runs paired with their texture id, in texture order.
    /// Nothing for hidden layers.
    pub fn batches(&self) -> impl Iterator<Item = (u16, &[TileVertex])> + '_ {
        let sets = self.sets().filter(|_| self.visible);
        sets.into_iter()
            .flat_map(|sets| sets.iter())
            .flat_map(|(texture, set)| set.visible_patches().map(move |p| (*texture, p)))
    }

    /// Changes the opacity of the layer and the alpha of its tile vertices.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
        let alpha = self.opacity;
        if let Some(sets) = self.sets_mut() {
            for set in sets.values_mut() {
                set.set_opacity(alpha);
            }
        }
        if let LayerKind::Objects { colour, .. } = &mut self.kind {
            colour.a = alpha;
        }
    }
}
