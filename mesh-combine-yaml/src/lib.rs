//! Mesh Combine YAML
//!
//! YAML support for mesh combine scenes and combiner settings, based on
//! `serde_yaml`.
//!
//! # Examples
//!
//! ```rust
//! use mesh_combine_yaml::YamlLoader;
//!
//! let loader = YamlLoader::new();
//! let yaml = r#"
//! output:
//!   cell_size: 16
//! search_options:
//!   only_static: false
//! "#;
//!
//! let settings = loader.settings_from_str(yaml)?;
//! assert_eq!(settings.output.cell_size, 16);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod document;
pub mod error;
pub mod loader;

// Re-export main types
pub use document::{ConfigDocument, SceneDocument, SettingsDocument};
pub use error::{Result, YamlError};
pub use loader::{YamlLoader, link_children};

use mesh_combine_core::Scene;
use mesh_combine_engine::MeshCombinerSettings;
use std::path::Path;

/// Load and validate a scene file
pub fn load_scene<P: AsRef<Path>>(path: P) -> Result<Scene> {
    YamlLoader::new().load_scene(path)
}

/// Load a combiner settings file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<MeshCombinerSettings> {
    YamlLoader::new().load_settings(path)
}

/// Write a scene file
pub fn save_scene<P: AsRef<Path>>(path: P, scene: &Scene) -> Result<()> {
    ConfigDocument::new(scene).save_to(path)
}

/// Write a combiner settings file
pub fn save_settings<P: AsRef<Path>>(path: P, settings: &MeshCombinerSettings) -> Result<()> {
    ConfigDocument::new(settings).save_to(path)
}
