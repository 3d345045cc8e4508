//! Error types for the shared scene and mesh model

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or validating a scene
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A node id does not exist in the scene
    #[error("Node {0} not found")]
    NodeNotFound(u32),

    /// A mesh id does not exist in the scene
    #[error("Mesh {0} not found")]
    MeshNotFound(u32),

    /// A node is its own ancestor
    #[error("Hierarchy cycle through node {0}")]
    HierarchyCycle(u32),

    /// A node lists a child whose parent is another node
    #[error("Node {parent} lists child {child} whose parent differs")]
    ChildMismatch { parent: u32, child: u32 },

    /// Mesh data is inconsistent
    #[error("Invalid mesh '{name}': {message}")]
    InvalidMesh { name: String, message: String },
}

impl CoreError {
    /// Create an invalid mesh error
    pub fn invalid_mesh<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::InvalidMesh {
            name: name.into(),
            message: message.into(),
        }
    }
}
