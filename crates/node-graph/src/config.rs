//! Editor configuration
//!
//! Tunables for hit testing, culling and undo history. Every field has a
//! default, so partial JSON documents are accepted.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Size;

/// Configuration for a [`GraphEditor`](crate::editor::GraphEditor) and the
/// components it drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Max distance (canvas units) between pointer and slot anchor for a hit
    pub slot_hit_radius: f64,
    /// Vertical spacing between slot rows
    pub slot_height: f64,
    /// Height of the node title bar; slot rows start below it
    pub title_height: f64,
    /// Size given to nodes whose type defines none
    pub default_node_size: Size,
    /// Pixels the viewport is inflated by before culling
    pub cull_margin_px: f64,
    /// Minimum time between two culling passes
    pub cull_throttle_ms: u64,
    /// Undo snapshots kept before the oldest is dropped
    pub max_undo_snapshots: usize,
    /// Whether dropping a link on a connected input replaces its link
    pub replace_input_links: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            slot_hit_radius: 10.0,
            slot_height: 20.0,
            title_height: 30.0,
            default_node_size: Size::new(140.0, 60.0),
            cull_margin_px: 200.0,
            cull_throttle_ms: 100,
            max_undo_snapshots: 100,
            replace_input_links: true,
        }
    }
}

impl EditorConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        log::debug!("Loaded editor config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn cull_throttle(&self) -> Duration {
        Duration::from_millis(self.cull_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EditorConfig::from_json_str(r#"{"cullMarginPx": 50, "defaultNodeSize": [200, 80]}"#)
                .unwrap();
        assert_eq!(config.cull_margin_px, 50.0);
        assert_eq!(config.default_node_size, Size::new(200.0, 80.0));
        assert_eq!(config.slot_hit_radius, EditorConfig::default().slot_hit_radius);
        assert_eq!(config.cull_throttle(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxUndoSnapshots": 5}}"#).unwrap();
        let config = EditorConfig::load(file.path()).unwrap();
        assert_eq!(config.max_undo_snapshots, 5);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(EditorConfig::from_json_str("{not json").is_err());
    }
}
