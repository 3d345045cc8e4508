//! Mesh Combine Core
//!
//! Data structures shared by the mesh combiner crates: a small scene graph
//! standing in for the host engine, triangle meshes, renderer settings and
//! bounds math.

pub mod constants;
pub mod error;
pub mod math;
pub mod mesh;
pub mod scene;

// Re-export main types
pub use constants::*;
pub use error::{CoreError, Result};
pub use math::Bounds;
pub use mesh::{Mesh, MeshId, MeshInfo, SubMesh};
pub use scene::{LodGroup, MeshRenderer, NodeId, Scene, SceneNode, Transform};

// Math types used throughout the public API
pub use glam::{Mat4, Quat, Vec2, Vec3};
