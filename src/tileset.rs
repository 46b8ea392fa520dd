use crate::error::MapError;
use crate::properties::Properties;
use macroquad::prelude::*;
use std::collections::HashMap;

/// Texture placement of one tile, indexed by cleaned GID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileInfo {
    /// Pixel texture coordinates: top-left, top-right, bottom-right,
    /// bottom-left. Already inset by half a pixel.
    pub corners: [Vec2; 4],
    pub size: Vec2,
    pub texture: u16,
    /// Tileset `<tileoffset>`, added to every drawn position.
    pub offset: Vec2,
}

impl TileInfo {
    /// Slot 0 of the table, and filler for GID ranges no tileset claims.
    pub const EMPTY: TileInfo = TileInfo {
        corners: [Vec2::ZERO; 4],
        size: Vec2::ZERO,
        texture: 0,
        offset: Vec2::ZERO,
    };

    /// Tile covering `rect` of `texture`, with the half-pixel inset that keeps
    /// neighbouring atlas cells from bleeding in when scrolling.
    pub fn from_rect(rect: Rect, texture: u16, offset: Vec2) -> Self {
        Self {
            corners: [
                vec2(rect.x + 0.5, rect.y + 0.5),
                vec2(rect.right() - 0.5, rect.y + 0.5),
                vec2(rect.right() - 0.5, rect.bottom() - 0.5),
                vec2(rect.x + 0.5, rect.bottom() - 0.5),
            ],
            size: rect.size(),
            texture,
            offset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    pub first_gid: u32,
    pub tile_count: u32,
    pub tile_size: Vec2,
    pub columns: u32,
    pub properties: Properties,
}

impl Tileset {
    #[inline]
    pub fn contains(&self, gid: u32) -> bool {
        gid >= self.first_gid && gid - self.first_gid < self.tile_count
    }
}

/// Columns and rows of a regular atlas, honouring margin and spacing.
pub fn atlas_grid(image: (u32, u32), tile: (u32, u32), spacing: u32, margin: u32) -> (u32, u32) {
    let span = |size: u32, tile: u32| {
        (size + spacing).saturating_sub(2 * margin) / (tile + spacing).max(1)
    };
    (span(image.0, tile.0), span(image.1, tile.1))
}

/// Cuts an atlas image into tiles, row by row.
pub fn atlas_tiles(
    image: (u32, u32),
    tile: (u32, u32),
    spacing: u32,
    margin: u32,
    texture: u16,
    offset: Vec2,
) -> Vec<TileInfo> {
    let (columns, rows) = atlas_grid(image, tile, spacing, margin);
    let mut out = Vec::with_capacity((columns * rows) as usize);
    for y in 0..rows {
        for x in 0..columns {
            let rect = Rect::new(
                (margin + x * (tile.0 + spacing)) as f32,
                (margin + y * (tile.1 + spacing)) as f32,
                tile.0 as f32,
                tile.1 as f32,
            );
            out.push(TileInfo::from_rect(rect, texture, offset));
        }
    }
    out
}

/// Every tile the map can reference. Lookups by cleaned GID are direct
/// indexing; index 0 is always [`TileInfo::EMPTY`].
#[derive(Debug, Clone)]
pub struct TileTable {
    infos: Vec<TileInfo>,
    tilesets: Vec<Tileset>,
    tile_properties: HashMap<u32, Properties>,
}

impl Default for TileTable {
    fn default() -> Self {
        Self {
            infos: vec![TileInfo::EMPTY],
            tilesets: Vec::new(),
            tile_properties: HashMap::new(),
        }
    }
}

/// Largest GID table a map may ask for.
pub const MAX_TILE_SLOTS: usize = 1 << 22;

impl TileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a tileset whose GID range would push the table past
    /// [`MAX_TILE_SLOTS`]. Checked before any tiles are allocated.
    pub fn check_range(&self, name: &str, first_gid: u32, count: usize) -> Result<(), MapError> {
        let end = (first_gid as usize).checked_add(count);
        if end.map_or(true, |end| end > MAX_TILE_SLOTS) {
            return Err(MapError::InvalidMap(format!(
                "tileset '{name}' claims gids {first_gid}..+{count}, more than {MAX_TILE_SLOTS} tile slots"
            )));
        }
        Ok(())
    }

    /// Places `tiles` at `tileset.first_gid`. Tilesets must arrive in
    /// ascending, non-overlapping GID order; unclaimed GIDs in between map to
    /// the empty tile.
    pub fn push_tileset(&mut self, mut tileset: Tileset, tiles: Vec<TileInfo>) -> Result<(), MapError> {
        let first = tileset.first_gid as usize;
        if first == 0 {
            return Err(MapError::InvalidMap(format!(
                "tileset '{}' has firstgid 0",
                tileset.name
            )));
        }
        if first < self.infos.len() {
            return Err(MapError::InvalidMap(format!(
                "tileset '{}' starts at gid {} which overlaps gid range ending at {}",
                tileset.name,
                first,
                self.infos.len() - 1
            )));
        }
        self.check_range(&tileset.name, tileset.first_gid, tiles.len())?;
        self.infos.resize(first, TileInfo::EMPTY);
        tileset.tile_count = tiles.len() as u32;
        self.infos.extend(tiles);
        self.tilesets.push(tileset);
        Ok(())
    }

    /// Like [`push_tileset`](Self::push_tileset) but for image-collection
    /// tilesets, whose tile ids may be sparse.
    pub fn push_collection(
        &mut self,
        mut tileset: Tileset,
        tiles: Vec<(u32, TileInfo)>,
    ) -> Result<(), MapError> {
        let span = tiles.iter().map(|(id, _)| id.saturating_add(1)).max().unwrap_or(0);
        self.check_range(&tileset.name, tileset.first_gid, span as usize)?;
        let mut dense = vec![TileInfo::EMPTY; span as usize];
        for (id, info) in tiles {
            dense[id as usize] = info;
        }
        tileset.tile_count = span;
        self.push_tileset(tileset, dense)
    }

    #[inline]
    pub fn get(&self, gid: u32) -> Option<&TileInfo> {
        self.infos.get(gid as usize)
    }

    /// Highest GID with a slot in the table.
    #[inline]
    pub fn max_gid(&self) -> u32 {
        (self.infos.len() - 1) as u32
    }

    pub fn tilesets(&self) -> &[Tileset] {
        &self.tilesets
    }

    pub fn set_tile_properties(&mut self, gid: u32, properties: Properties) {
        if !properties.is_empty() {
            self.tile_properties.insert(gid, properties);
        }
    }

    pub fn tile_properties(&self, gid: u32) -> Option<&Properties> {
        self.tile_properties.get(&gid)
    }
}
