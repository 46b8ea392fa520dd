use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a map load (or a query made before the map is ready).
///
/// Any of the load variants leaves the loader with no partially parsed
/// layers or tilesets.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid map: {0}")]
    InvalidMap(String),

    #[error("missing <{node}> node in {context}")]
    MissingNode { node: &'static str, context: String },

    #[error("missing or invalid attribute '{attribute}' on <{node}>")]
    MissingAttribute {
        node: String,
        attribute: &'static str,
    },

    #[error("map orientation '{0}' is not supported")]
    UnsupportedOrientation(String),

    #[error("layer '{layer}' uses unsupported encoding '{encoding}'")]
    UnsupportedEncoding { layer: String, encoding: String },

    #[error("layer '{layer}' uses unsupported compression '{compression}'")]
    UnsupportedCompression { layer: String, compression: String },

    #[error("invalid base64 layer data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decompress layer data: {0}")]
    Decompress(String),

    #[error("layer '{layer}' holds {found} tiles, expected {expected}")]
    InvalidLayerSize {
        layer: String,
        expected: usize,
        found: usize,
    },

    #[error("layer '{layer}' references tile {gid}, but only {max_gid} tiles are loaded")]
    InvalidTileGid { layer: String, gid: u32, max_gid: u32 },

    #[error("object '{object}' has malformed points '{points}'")]
    InvalidPoints { object: String, points: String },

    #[error("property '{name}' has unsupported type '{kind}'")]
    UnsupportedPropertyType { name: String, kind: String },

    #[error("failed to decode image {path}: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error("invalid loader config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("spatial index queried before update_index")]
    IndexUnavailable,
}

pub type Result<T, E = MapError> = std::result::Result<T, E>;
