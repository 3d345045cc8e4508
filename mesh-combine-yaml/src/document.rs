//! YAML documents bound to a file
//!
//! A [`ConfigDocument`] remembers where it was loaded from so it can be
//! saved back in place.

use crate::error::{Result, YamlError};
use crate::loader::YamlLoader;
use mesh_combine_core::Scene;
use mesh_combine_engine::MeshCombinerSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A settings file
pub type SettingsDocument = ConfigDocument<MeshCombinerSettings>;

/// A scene file
pub type SceneDocument = ConfigDocument<Scene>;

/// A value loaded from, or destined for, a YAML file
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument<T> {
    pub value: T,
    file_path: Option<PathBuf>,
    header: Option<String>,
}

impl<T> ConfigDocument<T> {
    /// Wrap a value that has no file yet
    pub fn new(value: T) -> Self {
        Self {
            value,
            file_path: None,
            header: None,
        }
    }

    /// Comment line written above the YAML
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Serialize> ConfigDocument<T> {
    /// Render the document as YAML text
    pub fn dump_yaml(&self) -> Result<String> {
        let body = serde_yaml::to_string(&self.value)?;
        Ok(match &self.header {
            Some(header) => {
                let mut text = String::with_capacity(body.len() + header.len() + 3);
                for line in header.lines() {
                    text.push_str("# ");
                    text.push_str(line);
                    text.push('\n');
                }
                text.push_str(&body);
                text
            }
            None => body,
        })
    }

    /// Save to the file this document was loaded from
    pub fn save(&self) -> Result<()> {
        let path = self.file_path.as_deref().ok_or(YamlError::MissingPath)?;
        self.write(path)
    }

    /// Save to a new path and remember it
    pub fn save_to<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.write(path)?;
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| YamlError::io(dir, e))?;
        }
        fs::write(path, self.dump_yaml()?).map_err(|e| YamlError::io(path, e))?;
        info!(path = %path.display(), "yaml saved");
        Ok(())
    }
}

impl<T: DeserializeOwned> ConfigDocument<T> {
    /// Load a plain value from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let value = YamlLoader::new().load_from_path(path)?;
        Ok(Self {
            value,
            file_path: Some(path.to_path_buf()),
            header: None,
        })
    }
}

impl SceneDocument {
    /// Load, link and validate a scene file
    pub fn load_scene<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let value = YamlLoader::new().load_scene(path)?;
        Ok(Self {
            value,
            file_path: Some(path.to_path_buf()),
            header: None,
        })
    }
}

impl<T: Default> Default for ConfigDocument<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_with_header() {
        let doc = SettingsDocument::default().with_header("combiner settings\nedit freely");
        let text = doc.dump_yaml().unwrap();
        assert!(text.starts_with("# combiner settings\n# edit freely\n"));
        assert!(text.contains("cell_size: 32"));
    }

    #[test]
    fn test_save_without_path() {
        let doc = SettingsDocument::default();
        assert!(matches!(doc.save(), Err(YamlError::MissingPath)));
    }

    #[test]
    fn test_save_to_remembers_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.yaml");
        let mut doc = SettingsDocument::default();
        doc.value.output.cell_size = 8;
        doc.save_to(&path).unwrap();
        assert_eq!(doc.file_path(), Some(path.as_path()));

        let loaded = SettingsDocument::load(&path).unwrap();
        assert_eq!(loaded.value.output.cell_size, 8);
        assert_eq!(loaded.file_path(), Some(path.as_path()));
    }
}
