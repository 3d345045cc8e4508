//! YAML loader for scenes and combiner settings
//!
//! Thin layer over `serde_yaml` that also repairs and validates scenes, so
//! hand written files only need to name each node's parent.

use crate::error::{Result, YamlError};
use mesh_combine_core::{NodeId, Scene};
use mesh_combine_engine::MeshCombinerSettings;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Loads scenes and settings from YAML
#[derive(Debug, Clone)]
pub struct YamlLoader {
    validate: bool,
}

impl YamlLoader {
    /// Create a loader that validates scenes
    pub fn new() -> Self {
        Self { validate: true }
    }

    /// Skip scene validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Load any deserializable value from a string
    pub fn load_from_str<T: DeserializeOwned>(&self, yaml: &str) -> Result<T> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load any deserializable value from a reader
    pub fn load_from_reader<T: DeserializeOwned, R: Read>(&self, reader: R) -> Result<T> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Load any deserializable value from a file
    pub fn load_from_path<T: DeserializeOwned, P: AsRef<Path>>(&self, path: P) -> Result<T> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| YamlError::io(path, e))?;
        let value = self.load_from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), "yaml loaded");
        Ok(value)
    }

    /// Parse a scene
    pub fn scene_from_str(&self, yaml: &str) -> Result<Scene> {
        let scene = self.load_from_str(yaml)?;
        self.finish_scene(scene)
    }

    /// Load a scene file
    pub fn load_scene<P: AsRef<Path>>(&self, path: P) -> Result<Scene> {
        let scene = self.load_from_path(path)?;
        self.finish_scene(scene)
    }

    /// Parse combiner settings; missing fields take their defaults
    pub fn settings_from_str(&self, yaml: &str) -> Result<MeshCombinerSettings> {
        self.load_from_str(yaml)
    }

    /// Load a combiner settings file
    pub fn load_settings<P: AsRef<Path>>(&self, path: P) -> Result<MeshCombinerSettings> {
        self.load_from_path(path)
    }

    fn finish_scene(&self, mut scene: Scene) -> Result<Scene> {
        if self.validate {
            // Parent ids must be checked before they are used to link.
            for node in &scene.nodes {
                if let Some(parent) = node.parent {
                    scene.require_node(parent)?;
                }
            }
        }
        link_children(&mut scene);
        if self.validate {
            scene.validate()?;
        }
        Ok(scene)
    }
}

impl Default for YamlLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Add every node to its parent's child list if missing
pub fn link_children(scene: &mut Scene) {
    for i in 0..scene.nodes.len() {
        let id = NodeId(i as u32);
        let Some(parent) = scene.nodes[i].parent else {
            continue;
        };
        if let Some(parent) = scene.node_mut(parent) {
            if !parent.children.contains(&id) {
                parent.children.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_combine_core::CoreError;

    const SCENE: &str = r#"
meshes:
  - name: tri
    vertices: [[0, 0, 0], [1, 0, 0], [0, 1, 0]]
    sub_meshes:
      - indices: [0, 1, 2]
nodes:
  - name: root
  - name: child
    parent: 0
    renderer:
      mesh: 0
      materials: [stone]
"#;

    #[test]
    fn test_scene_links_children() {
        let scene = YamlLoader::new().scene_from_str(SCENE).unwrap();
        assert_eq!(scene.nodes.len(), 2);
        assert_eq!(scene.nodes[0].children, vec![NodeId(1)]);
        assert!(scene.nodes[1].renderer.as_ref().is_some_and(|r| r.enabled));
    }

    #[test]
    fn test_scene_with_missing_parent_is_rejected() {
        let yaml = "nodes:\n  - name: orphan\n    parent: 4\n";
        let err = YamlLoader::new().scene_from_str(yaml).unwrap_err();
        assert!(matches!(err, YamlError::InvalidScene(_)));
        assert!(YamlLoader::new().without_validation().scene_from_str(yaml).is_ok());
    }

    #[test]
    fn test_self_child_is_rejected() {
        let yaml = "nodes:\n  - name: root\n    children: [0]\n";
        let err = YamlLoader::new().scene_from_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            YamlError::InvalidScene(CoreError::ChildMismatch { parent: 0, child: 0 })
        ));
    }

    #[test]
    fn test_partial_settings_take_defaults() {
        let yaml = "output:\n  cell_size: 16\n  weld_vertices: true\n";
        let settings = YamlLoader::new().settings_from_str(yaml).unwrap();
        assert_eq!(settings.output.cell_size, 16);
        assert!(settings.output.weld_vertices);
        assert!(settings.search_options.only_static);
        assert_eq!(settings.job_settings, Default::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = YamlLoader::new().settings_from_str("output: [").unwrap_err();
        assert!(matches!(err, YamlError::Parse(_)));
    }
}
