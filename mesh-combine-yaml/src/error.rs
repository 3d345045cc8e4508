//! Error types for YAML loading and saving

use mesh_combine_core::CoreError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for YAML operations
pub type Result<T> = std::result::Result<T, YamlError>;

#[derive(Error, Debug)]
pub enum YamlError {
    /// Reading or writing a file failed
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The text is not valid YAML for the expected type
    #[error("YAML parsing error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The scene parsed but references things that do not exist
    #[error("Invalid scene: {0}")]
    InvalidScene(#[from] CoreError),

    /// A document without a file path was saved in place
    #[error("Document has no file path")]
    MissingPath,
}

impl YamlError {
    /// Create an IO error for a path
    pub fn io<P: AsRef<Path>>(path: P, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = YamlError::io(
            "scene.yaml",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.to_string(), "Failed to access scene.yaml: missing");

        let err: YamlError = CoreError::MeshNotFound(3).into();
        assert_eq!(err.to_string(), "Invalid scene: Mesh 3 not found");
    }
}
