//! TMX / TSX loader.
//!
//! Walks the [`XmlNode`] tree of a map and builds a [`Map`]: tilesets into
//! the tile table, tile layers into per-texture [`LayerSet`]s, object
//! groups into [`MapObject`]s and image layers into textures. Any fatal
//! error drops everything built so far.

use crate::config::LoaderConfig;
use crate::diagnostics::{emit, Logger};
use crate::error::MapError;
use crate::geom;
use crate::gid::{FlipBits, Gid};
use crate::layer::{LayerKind, MapLayer, DEFAULT_OBJECT_COLOUR};
use crate::loader::decode::decode_layer_data;
use crate::loader::xml::XmlNode;
use crate::map::{Map, MapTexture, Orientation};
use crate::object::{
    ellipse_points, parse_colour, parse_points, rectangle_points, MapObject, ObjectShape, QuadHandle,
};
use crate::properties::Properties;
use crate::render::batch::{tile_vertices, LayerSet, TileVertex};
use crate::tileset::{atlas_grid, atlas_tiles, TileInfo, Tileset};
use macroquad::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Fill colour of the image substituted for missing files.
pub const PLACEHOLDER_COLOUR: Color = Color::new(1.0, 1.0, 0.0, 1.0);

pub struct MapLoader {
    config: LoaderConfig,
    search_paths: Vec<PathBuf>,
    // decoded images, kept until unload()
    image_cache: HashMap<PathBuf, Image>,
}

impl Default for MapLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl MapLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            search_paths: Vec::new(),
            image_cache: HashMap::new(),
        }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_search_path(path);
        self
    }

    /// Adds a directory searched for tilesets and images after the map's
    /// own directory and the configured paths. Duplicates are ignored.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn logger(&self) -> Logger {
        self.config.logger
    }

    /// Images decoded during this session.
    pub fn cached_images(&self) -> usize {
        self.image_cache.len()
    }

    /// Drops every cached image.
    pub fn unload(&mut self) {
        self.image_cache.clear();
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Map, MapError> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("./"));
        emit!(self.config.logger, Info, "loading map {}", path.display());
        self.load_with_dir(&txt, Some(dir))
    }

    /// Loads a map from TMX text. Relative paths resolve against the
    /// search paths and then the working directory.
    pub fn load_from_str(&mut self, xml: &str) -> Result<Map, MapError> {
        self.load_with_dir(xml, None)
    }

    fn load_with_dir(&mut self, xml: &str, dir: Option<PathBuf>) -> Result<Map, MapError> {
        let logger = self.config.logger;
        let mut dirs: Vec<PathBuf> = dir.into_iter().collect();
        dirs.extend(self.config.search_paths.iter().cloned());
        dirs.extend(self.search_paths.iter().cloned());

        let result = XmlNode::parse(xml).and_then(|root| {
            let mut session = Session {
                config: &self.config,
                cache: &mut self.image_cache,
                dirs,
                logger,
            };
            session.build(&root)
        });

        match result {
            Ok(map) => {
                emit!(logger, Info, "parsed {} layers", map.layers().len());
                Ok(map)
            }
            Err(e) => {
                emit!(logger, Error, "map not loaded: {e}");
                self.unload();
                Err(e)
            }
        }
    }
}

/// State of one load.
struct Session<'a> {
    config: &'a LoaderConfig,
    cache: &'a mut HashMap<PathBuf, Image>,
    dirs: Vec<PathBuf>,
    logger: Logger,
}

/// Layer-wide values needed while turning cells and objects into quads.
struct LayerCtx<'a> {
    name: &'a str,
    index: usize,
    offset: Vec2,
    opacity: f32,
}

impl Session<'_> {
    fn build(&mut self, root: &XmlNode) -> Result<Map, MapError> {
        if root.name != "map" {
            return Err(MapError::MissingNode {
                node: "map",
                context: format!("document root <{}>", root.name),
            });
        }

        let width: u32 = root.require("width")?;
        let height: u32 = root.require("height")?;
        let tile_w: u32 = root.require("tilewidth")?;
        let tile_h: u32 = root.require("tileheight")?;
        if width == 0 || height == 0 || tile_w == 0 || tile_h == 0 {
            return Err(MapError::InvalidMap("map and tile sizes must be non-zero".into()));
        }
        cell_count(width, height)?;
        if root.attr_or("infinite", 0u32) != 0 {
            return Err(MapError::InvalidMap("infinite maps are not supported".into()));
        }

        let orientation = match root.attr("orientation").unwrap_or("orthogonal") {
            "orthogonal" => Orientation::Orthogonal,
            "isometric" => Orientation::Isometric,
            other => return Err(MapError::UnsupportedOrientation(other.to_owned())),
        };

        let mut map = Map::new(width, height, vec2(tile_w as f32, tile_h as f32), orientation, self.logger);
        map.properties = Properties::from_owner(root)?;

        let mut tileset_count = 0;
        for ts in root.children_named("tileset") {
            self.parse_tileset_ref(ts, &mut map)?;
            tileset_count += 1;
        }
        if tileset_count == 0 {
            emit!(self.logger, Warn, "map has no tilesets");
        }

        for node in &root.children {
            match node.name.as_str() {
                "layer" => self.parse_tile_layer(node, &mut map)?,
                "objectgroup" => self.parse_object_group(node, &mut map)?,
                "imagelayer" => self.parse_image_layer(node, &mut map)?,
                "tileset" | "properties" | "editorsettings" => {}
                other => emit!(self.logger, Warn, "skipping unsupported map element <{other}>"),
            }
        }
        Ok(map)
    }

    // --- files ------------------------------------------------------------

    /// First existing file for `source`: the full relative path in each
    /// search directory, then the bare file name in each, then `source`
    /// as given.
    fn resolve(&self, source: &str) -> Option<PathBuf> {
        let file_name = Path::new(source).file_name().map(PathBuf::from);
        self.dirs
            .iter()
            .map(|d| d.join(source))
            .chain(
                file_name
                    .iter()
                    .flat_map(|f| self.dirs.iter().map(move |d| d.join(f))),
            )
            .chain(std::iter::once(PathBuf::from(source)))
            .find(|p| p.is_file())
    }

    /// Decodes an image, or substitutes the placeholder when it cannot be
    /// found or decoded. Returns the texture id and whether the
    /// placeholder was used.
    fn load_texture(&mut self, map: &mut Map, source: &str, trans: Option<&str>) -> Result<(u16, bool), MapError> {
        let (mut image, path, placeholder) = match self.read_image(source) {
            Ok((image, path)) => (image, path, false),
            Err(e) => {
                emit!(self.logger, Warn, "{e}; using placeholder");
                let size = self.config.placeholder_size.max(1);
                (Image::gen_image_color(size, size, PLACEHOLDER_COLOUR), PathBuf::from(source), true)
            }
        };

        if let Some(hex) = trans {
            mask_colour(&mut image, hex);
        }

        let id = u16::try_from(map.textures.len())
            .map_err(|_| MapError::InvalidMap("too many textures".into()))?;
        map.textures.push(MapTexture { source: path, image });
        Ok((id, placeholder))
    }

    fn read_image(&mut self, source: &str) -> Result<(Image, PathBuf), MapError> {
        let path = self.resolve(source).ok_or_else(|| MapError::Image {
            path: PathBuf::from(source),
            reason: "not found in any search path".into(),
        })?;
        if let Some(image) = self.cache.get(&path) {
            return Ok((image.clone(), path));
        }

        let bytes = fs::read(&path).map_err(|source| MapError::Io {
            path: path.clone(),
            source,
        })?;
        let image = Image::from_file_with_format(&bytes, None).map_err(|e| MapError::Image {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        emit!(self.logger, Info, "decoded {}", path.display());
        self.cache.insert(path.clone(), image.clone());
        Ok((image, path))
    }

    // --- tilesets -----------------------------------------------------------

    fn parse_tileset_ref(&mut self, node: &XmlNode, map: &mut Map) -> Result<(), MapError> {
        let first_gid: u32 = node.require("firstgid")?;
        let Some(source) = node.attr("source") else {
            return self.parse_tileset(node, first_gid, map);
        };

        let path = self.resolve(source).ok_or_else(|| MapError::Io {
            path: PathBuf::from(source),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "external tileset not found"),
        })?;
        let txt = fs::read_to_string(&path).map_err(|source| MapError::Io {
            path: path.clone(),
            source,
        })?;
        let tsx = XmlNode::parse(&txt)?;
        if tsx.name != "tileset" {
            return Err(MapError::MissingNode {
                node: "tileset",
                context: path.display().to_string(),
            });
        }
        self.parse_tileset(&tsx, first_gid, map)
    }

    fn parse_tileset(&mut self, node: &XmlNode, first_gid: u32, map: &mut Map) -> Result<(), MapError> {
        let tile_w: u32 = node.require("tilewidth")?;
        let tile_h: u32 = node.require("tileheight")?;
        if tile_w == 0 || tile_h == 0 {
            return Err(MapError::InvalidMap("tileset tile size must be non-zero".into()));
        }
        let spacing = node.attr_or("spacing", 0u32);
        let margin = node.attr_or("margin", 0u32);
        let offset = node
            .child("tileoffset")
            .map(|o| vec2(o.attr_or("x", 0.0), o.attr_or("y", 0.0)))
            .unwrap_or(Vec2::ZERO);

        let mut tileset = Tileset {
            name: node.attr("name").unwrap_or_default().to_owned(),
            first_gid,
            tile_count: 0,
            tile_size: vec2(tile_w as f32, tile_h as f32),
            columns: node.attr_or("columns", 0u32),
            properties: Properties::from_owner(node)?,
        };

        let atlas = node.child("image").and_then(|i| i.attr("source").map(|s| (i, s)));
        match atlas {
            Some((image, source)) => {
                let (texture, placeholder) = self.load_texture(map, source, image.attr("trans"))?;
                let tiles = if placeholder {
                    let size = self.config.placeholder_size as f32;
                    let mut info = TileInfo::from_rect(Rect::new(0.0, 0.0, size, size), texture, offset);
                    info.size = tileset.tile_size;
                    let count = node.attr_or("tilecount", 1u32).max(1) as usize;
                    map.tiles.check_range(&tileset.name, first_gid, count)?;
                    vec![info; count]
                } else {
                    let img = &map.textures[texture as usize].image;
                    let dims = (img.width as u32, img.height as u32);
                    if tileset.columns == 0 {
                        tileset.columns = atlas_grid(dims, (tile_w, tile_h), spacing, margin).0;
                    }
                    atlas_tiles(dims, (tile_w, tile_h), spacing, margin, texture, offset)
                };
                emit!(self.logger, Info, "tileset '{}': {} tiles", tileset.name, tiles.len());
                map.tiles.push_tileset(tileset, tiles)?;
            }
            None => {
                let mut tiles = Vec::new();
                for tile in node.children_named("tile") {
                    let Some(image) = tile.child("image") else {
                        continue;
                    };
                    let id: u32 = tile.require("id")?;
                    let source: String = image.require("source")?;
                    let (texture, _) = self.load_texture(map, &source, image.attr("trans"))?;
                    let img = &map.textures[texture as usize].image;
                    let size = vec2(
                        image.attr_or("width", img.width as f32),
                        image.attr_or("height", img.height as f32),
                    );
                    tiles.push((id, TileInfo::from_rect(Rect::new(0.0, 0.0, size.x, size.y), texture, offset)));
                }
                emit!(self.logger, Info, "image collection '{}': {} tiles", tileset.name, tiles.len());
                map.tiles.push_collection(tileset, tiles)?;
            }
        }

        for tile in node.children_named("tile") {
            let id: u32 = tile.require("id")?;
            map.tiles.set_tile_properties(first_gid + id, Properties::from_owner(tile)?);
        }
        Ok(())
    }

    // --- layers -------------------------------------------------------------

    fn layer_header(&self, node: &XmlNode, kind: LayerKind) -> Result<MapLayer, MapError> {
        let mut layer = MapLayer::new(node.attr("name").unwrap_or_default(), kind);
        layer.opacity = node.attr_or("opacity", 1.0f32).clamp(0.0, 1.0);
        layer.visible = node.attr_or("visible", 1u32) != 0;
        layer.offset = vec2(node.attr_or("offsetx", 0.0), node.attr_or("offsety", 0.0));
        layer.properties = Properties::from_owner(node)?;
        Ok(layer)
    }

    fn new_set(&self, map: &Map, texture: u16) -> LayerSet {
        LayerSet::new(
            texture,
            self.config.patch_size,
            (map.width(), map.height()),
            map.tile_size(),
            map.orientation() == Orientation::Orthogonal,
        )
    }

    /// Looks up a GID, rejecting anything past the end of the tile table.
    fn tile(&self, map: &Map, raw: u32, layer: &str) -> Result<(TileInfo, FlipBits), MapError> {
        let (index, flips) = Gid(raw).split();
        let max_gid = map.tiles.max_gid();
        match map.tiles.get(index) {
            Some(info) if index <= max_gid => Ok((*info, flips)),
            _ => Err(MapError::InvalidTileGid {
                layer: layer.to_owned(),
                gid: index,
                max_gid,
            }),
        }
    }

    fn parse_tile_layer(&mut self, node: &XmlNode, map: &mut Map) -> Result<(), MapError> {
        let mut layer = self.layer_header(node, LayerKind::Tiles { sets: BTreeMap::new() })?;
        emit!(self.logger, Info, "tile layer '{}'", layer.name);

        let data = node.child("data").ok_or_else(|| MapError::MissingNode {
            node: "data",
            context: format!("layer '{}'", layer.name),
        })?;
        let w = node.attr_or("width", map.width());
        let h = node.attr_or("height", map.height());
        let gids = decode_layer_data(data, &layer.name, cell_count(w, h)?)?;

        let ctx = LayerCtx {
            name: &layer.name,
            index: map.layers.len(),
            offset: layer.offset,
            opacity: layer.opacity,
        };
        let mut sets = BTreeMap::new();
        for (i, &raw) in gids.iter().enumerate() {
            if Gid(raw).is_empty() {
                continue;
            }
            let (info, flips) = self.tile(map, raw, ctx.name)?;
            if info.size == Vec2::ZERO {
                emit!(self.logger, Debug, "gid {} in '{}' has no tile", Gid(raw).clean(), ctx.name);
                continue;
            }
            let (x, y) = (i as u32 % w, i as u32 / w);
            let verts = self.cell_vertices(map, &ctx, info, flips, x, y);
            sets.entry(info.texture)
                .or_insert_with(|| self.new_set(map, info.texture))
                .add_tile(verts, x, y);
        }

        layer.kind = LayerKind::Tiles { sets };
        map.layers.push(layer);
        Ok(())
    }

    /// Quad for the cell at (`x`, `y`). Tiles taller than the map grid
    /// grow upwards from the bottom of their cell.
    fn cell_vertices(&self, map: &Map, ctx: &LayerCtx, info: TileInfo, flips: FlipBits, x: u32, y: u32) -> [TileVertex; 4] {
        let t = map.tile_size();
        let (fx, fy) = (x as f32, y as f32);
        let mut origin = vec2(t.x * fx, t.y * fy + t.y - info.size.y);
        if map.orientation() == Orientation::Isometric {
            origin += vec2(
                -fx * t.x / 2.0 - fy * t.x / 2.0 - t.x / 2.0,
                fx * t.y / 2.0 - fy * t.y / 2.0 + t.y / 2.0,
            );
        }
        origin += ctx.offset + info.offset;

        let mut corners = info.corners;
        flips.apply(&mut corners);
        tile_vertices(origin, info.size, corners, Color::new(1.0, 1.0, 1.0, ctx.opacity))
    }

    fn parse_image_layer(&mut self, node: &XmlNode, map: &mut Map) -> Result<(), MapError> {
        let mut layer = self.layer_header(
            node,
            LayerKind::Image {
                texture: 0,
                position: Vec2::ZERO,
                size: Vec2::ZERO,
            },
        )?;
        emit!(self.logger, Info, "image layer '{}'", layer.name);

        let image = node.child("image").ok_or_else(|| MapError::MissingNode {
            node: "image",
            context: format!("image layer '{}'", layer.name),
        })?;
        let source: String = image.require("source")?;
        let (texture, _) = self.load_texture(map, &source, image.attr("trans"))?;
        let img = &map.textures[texture as usize].image;
        let size = vec2(img.width as f32, img.height as f32);
        let position = vec2(node.attr_or("x", 0.0), node.attr_or("y", 0.0)) + layer.offset;

        layer.kind = LayerKind::Image { texture, position, size };
        map.layers.push(layer);
        Ok(())
    }

    fn parse_object_group(&mut self, node: &XmlNode, map: &mut Map) -> Result<(), MapError> {
        let mut layer = self.layer_header(
            node,
            LayerKind::Objects {
                objects: Vec::new(),
                sets: BTreeMap::new(),
                colour: DEFAULT_OBJECT_COLOUR,
            },
        )?;
        emit!(self.logger, Info, "object layer '{}'", layer.name);

        let mut colour = node
            .attr("color")
            .and_then(parse_colour)
            .unwrap_or(DEFAULT_OBJECT_COLOUR);
        colour.a = layer.opacity;

        let ctx = LayerCtx {
            name: &layer.name,
            index: map.layers.len(),
            offset: layer.offset,
            opacity: layer.opacity,
        };
        let mut objects = Vec::new();
        let mut sets = BTreeMap::new();
        for child in node.children_named("object") {
            if let Some(obj) = self.parse_object(child, map, &ctx, &mut sets)? {
                objects.push(obj);
            }
        }

        layer.kind = LayerKind::Objects { objects, sets, colour };
        map.layers.push(layer);
        Ok(())
    }

    fn parse_object(
        &self,
        node: &XmlNode,
        map: &Map,
        ctx: &LayerCtx,
        sets: &mut BTreeMap<u16, LayerSet>,
    ) -> Result<Option<MapObject>, MapError> {
        let position = vec2(node.require("x")?, node.require("y")?);
        let mut size = vec2(node.attr_or("width", 0.0), node.attr_or("height", 0.0));
        let name = node.attr("name").unwrap_or_default().to_owned();
        let rotation = node.attr_or("rotation", 0.0f32);

        let points_of = |child: &XmlNode| -> Result<Vec<Vec2>, MapError> {
            let txt = child.attr("points").unwrap_or_default();
            parse_points(txt)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| MapError::InvalidPoints {
                    object: name.clone(),
                    points: txt.to_owned(),
                })
        };

        let mut tile = None;
        let (shape, local) = if let Some(raw) = node.attr_as::<u32>("gid") {
            let (info, flips) = self.tile(map, raw, ctx.name)?;
            size = info.size;
            tile = Some((raw, info, flips));
            // anchored (and rotated) at the bottom-left corner
            let lift = vec2(0.0, size.y);
            (ObjectShape::Tile, rectangle_points(size).into_iter().map(|p| p - lift).collect())
        } else if let Some(poly) = node.child("polygon") {
            (ObjectShape::Polygon, points_of(poly)?)
        } else if let Some(line) = node.child("polyline") {
            (ObjectShape::Polyline, points_of(line)?)
        } else if node.child("ellipse").is_some() && size.x > 0.0 && size.y > 0.0 {
            let shape = if size.x == size.y {
                ObjectShape::Circle
            } else {
                ObjectShape::Ellipse
            };
            (shape, ellipse_points(size))
        } else if size.x > 0.0 && size.y > 0.0 {
            (ObjectShape::Rectangle, rectangle_points(size))
        } else {
            emit!(
                self.logger,
                Warn,
                "object '{}' in '{}' has no size, points or gid; skipped",
                name,
                ctx.name
            );
            return Ok(None);
        };

        let iso = map.orientation() == Orientation::Isometric;
        let origin = position + ctx.offset;
        let top_left = match tile {
            Some(_) => origin + geom::rotate_about(vec2(0.0, -size.y), Vec2::ZERO, rotation),
            None => origin,
        };
        let world = local.into_iter().map(|p| {
            let p = geom::rotate_about(p, Vec2::ZERO, rotation) + origin;
            if iso {
                map.isometric_to_orthogonal(p)
            } else {
                p
            }
        });

        let mut obj = MapObject::new(
            shape,
            if iso { map.isometric_to_orthogonal(top_left) } else { top_left },
            size,
        )
        .with_points(world);
        obj.id = node.attr_or("id", 0u32);
        obj.name = name;
        obj.kind = node.attr("type").or_else(|| node.attr("class")).unwrap_or_default().to_owned();
        obj.parent = ctx.name.to_owned();
        obj.rotation = rotation;
        obj.visible = node.attr_or("visible", 1u32) != 0;
        obj.properties = Properties::from_owner(node)?;

        if let Some((raw, info, flips)) = tile {
            obj.tile_gid = Some(raw);
            let mut corners = info.corners;
            flips.apply(&mut corners);
            let colour = Color::new(1.0, 1.0, 1.0, ctx.opacity);
            let mut verts = if iso {
                tile_vertices(obj.position, info.size, corners, colour)
            } else {
                let p = obj.points();
                [0, 1, 2, 3].map(|i| TileVertex {
                    position: p[i],
                    tex_coords: corners[i],
                    color: colour,
                })
            };
            for v in &mut verts {
                v.position += info.offset;
            }

            let t = map.tile_size();
            let cell = |v: f32, t: f32| (v / t).floor().max(0.0) as u32;
            let set = sets
                .entry(info.texture)
                .or_insert_with(|| self.new_set(map, info.texture));
            let quad = set.add_tile(verts, cell(obj.position.x, t.x), cell(obj.position.y, t.y));
            if !obj.visible {
                set.set_quad_visible(quad, false);
            }
            obj.quad = Some(QuadHandle {
                layer: ctx.index,
                texture: info.texture,
                quad,
            });
        }

        Ok(Some(obj))
    }
}

/// Largest tile grid a map or layer may declare.
const MAX_MAP_CELLS: usize = 1 << 26;

fn cell_count(width: u32, height: u32) -> Result<usize, MapError> {
    (width as usize)
        .checked_mul(height as usize)
        .filter(|cells| *cells <= MAX_MAP_CELLS)
        .ok_or_else(|| MapError::InvalidMap(format!("{width}x{height} tiles is larger than {MAX_MAP_CELLS} cells")))
}

/// Makes every pixel matching the `trans` colour fully transparent.
fn mask_colour(image: &mut Image, hex: &str) {
    let Some(key) = parse_colour(hex) else {
        return;
    };
    let byte = |c: f32| (c * 255.0).round() as u8;
    let rgb = [byte(key.r), byte(key.g), byte(key.b)];
    for px in image.bytes.chunks_exact_mut(4) {
        if px[..3] == rgb {
            px[3] = 0;
        }
    }
}
