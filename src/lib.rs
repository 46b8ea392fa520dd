//! Tiled TMX loader for Macroquad: patch-batched tile layers, map objects,
//! a quadtree over object bounds and convex collision shapes for physics
//! engines.

mod config;
mod diagnostics;
mod error;
pub mod geom;
pub mod gid;
mod layer;
pub mod loader {
    pub mod decode;
    mod tmx_loader;
    pub mod xml;

    pub use tmx_loader::MapLoader;
}
mod map;
pub mod object;
pub mod physics {
    mod bodies;
    pub mod decompose;

    pub use bodies::*;
}
mod properties;
pub mod render {
    pub mod batch;
    pub mod draw;
}
pub mod spatial {
    pub mod quadtree;
}
mod tileset;

pub use config::LoaderConfig;
pub use diagnostics::Logger;
pub use error::{MapError, Result};
pub use layer::{LayerKind, MapLayer};
pub use loader::MapLoader;
pub use map::{Map, MapTexture, Orientation};
pub use object::{DebugShape, MapObject, ObjectShape, QuadHandle};
pub use properties::{Properties, PropertyValue};
pub use spatial::quadtree::ObjectRef;
pub use tileset::{TileInfo, Tileset};
