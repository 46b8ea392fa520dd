use crate::diagnostics::Logger;
use crate::error::MapError;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_PATCH_SIZE: u32 = 10;
pub const DEFAULT_PLACEHOLDER_SIZE: u16 = 20;

/// Loader settings. Every field has a default, so a config document only
/// needs to name what it overrides:
///
/// ```json
/// { "patch_size": 16, "log_level": "info", "search_paths": ["assets/tiles"] }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Tiles along one edge of a vertex patch. 0 puts a whole layer in a
    /// single patch.
    pub patch_size: u32,
    #[serde(rename = "log_level")]
    pub logger: Logger,
    /// Searched, in order, after the map's own directory.
    pub search_paths: Vec<PathBuf>,
    /// Edge length of the image substituted for missing tileset images.
    pub placeholder_size: u16,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            logger: Logger::default(),
            search_paths: Vec::new(),
            placeholder_size: DEFAULT_PLACEHOLDER_SIZE,
        }
    }
}

impl LoaderConfig {
    pub fn from_json(txt: &str) -> Result<Self, MapError> {
        Ok(serde_json::from_str(txt)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg = LoaderConfig::from_json(r#"{ "patch_size": 4, "log_level": "warn" }"#)
            .expect("config");
        assert_eq!(cfg.patch_size, 4);
        assert_eq!(cfg.logger.filter, LevelFilter::Warn);
        assert!(cfg.search_paths.is_empty());
        assert_eq!(cfg.placeholder_size, DEFAULT_PLACEHOLDER_SIZE);
    }

    #[test]
    fn empty_document_is_default() {
        let cfg = LoaderConfig::from_json("{}").expect("config");
        assert_eq!(cfg.patch_size, DEFAULT_PATCH_SIZE);
        assert_eq!(cfg.logger.filter, LevelFilter::Error);
    }

    #[test]
    fn rejects_malformed_config() {
        let err = LoaderConfig::from_json("{ patch_size: }").unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }
}
