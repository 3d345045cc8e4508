//! Mesh type definitions
//!
//! Triangle meshes as the combiner sees them: one shared vertex stream and
//! one index list per sub-mesh (one sub-mesh per material slot).

use crate::error::{CoreError, Result};
use crate::math::Bounds;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Index of a mesh inside a [`Scene`](crate::scene::Scene)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshId(pub u32);

/// SubMesh data structure
///
/// Represents a portion of a mesh that uses the same material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubMesh {
    /// Triangle list, three indices per triangle
    pub indices: Vec<u32>,
}

impl SubMesh {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if submesh has valid data
    pub fn is_valid(&self) -> bool {
        !self.indices.is_empty() && self.indices.len() % 3 == 0
    }
}

/// Mesh object representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    #[serde(default)]
    pub normals: Vec<Vec3>,
    #[serde(default)]
    pub uvs: Vec<Vec2>,
    pub sub_meshes: Vec<SubMesh>,
    /// Whether the vertex data is available on the CPU
    #[serde(default = "default_readable")]
    pub is_readable: bool,
}

fn default_readable() -> bool {
    true
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            name: String::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            sub_meshes: Vec::new(),
            is_readable: true,
        }
    }
}

/// Mesh information summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshInfo {
    pub name: String,
    pub vertex_count: usize,
    pub sub_mesh_count: usize,
    pub triangle_count: usize,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub is_readable: bool,
}

impl Mesh {
    /// Create a single sub-mesh mesh
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            sub_meshes: vec![SubMesh::new(indices)],
            ..Self::default()
        }
    }

    /// Get total vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get total triangle count
    pub fn triangle_count(&self) -> usize {
        self.sub_meshes.iter().map(SubMesh::triangle_count).sum()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    /// Get local mesh bounds
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.vertices.iter().copied()).unwrap_or_default()
    }

    /// Get mesh information summary
    pub fn get_info(&self) -> MeshInfo {
        MeshInfo {
            name: self.name.clone(),
            vertex_count: self.vertex_count(),
            sub_mesh_count: self.sub_meshes.len(),
            triangle_count: self.triangle_count(),
            has_normals: self.has_normals(),
            has_uvs: self.has_uvs(),
            is_readable: self.is_readable,
        }
    }

    /// Fill `normals` with area weighted vertex normals
    pub fn recalculate_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];
        for sub_mesh in &self.sub_meshes {
            for tri in sub_mesh.indices.chunks_exact(3) {
                let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                    continue;
                }
                let n = crate::math::triangle_normal(
                    self.vertices[a],
                    self.vertices[b],
                    self.vertices[c],
                );
                normals[a] += n;
                normals[b] += n;
                normals[c] += n;
            }
        }
        self.normals = normals.into_iter().map(Vec3::normalize_or_zero).collect();
    }

    /// Validate mesh data
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() {
            return Err(CoreError::invalid_mesh(&self.name, "mesh has no vertices"));
        }

        if self.has_normals() && self.normals.len() != self.vertices.len() {
            return Err(CoreError::invalid_mesh(
                &self.name,
                format!(
                    "{} normals for {} vertices",
                    self.normals.len(),
                    self.vertices.len()
                ),
            ));
        }

        if self.has_uvs() && self.uvs.len() != self.vertices.len() {
            return Err(CoreError::invalid_mesh(
                &self.name,
                format!("{} uvs for {} vertices", self.uvs.len(), self.vertices.len()),
            ));
        }

        for (i, sub_mesh) in self.sub_meshes.iter().enumerate() {
            if !sub_mesh.is_valid() {
                return Err(CoreError::invalid_mesh(
                    &self.name,
                    format!("sub-mesh {} is not a triangle list", i),
                ));
            }
            if let Some(&index) = sub_mesh
                .indices
                .iter()
                .find(|&&index| index as usize >= self.vertices.len())
            {
                return Err(CoreError::invalid_mesh(
                    &self.name,
                    format!("sub-mesh {} references vertex {}", i, index),
                ));
            }
        }

        Ok(())
    }

    /// Axis aligned cube of edge `size` with 4 unshared vertices per face
    pub fn cube(name: impl Into<String>, size: f32) -> Self {
        let h = size * 0.5;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let mut mesh = Self {
            name: name.into(),
            ..Self::default()
        };
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                mesh.vertices.push((normal + u * su + v * sv) * h);
                mesh.normals.push(normal);
                mesh.uvs.push(Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5));
            }
            // Wind counter-clockwise when seen from outside.
            if u.cross(v).dot(normal) > 0.0 {
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            } else {
                indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
            }
        }
        mesh.sub_meshes.push(SubMesh::new(indices));
        mesh
    }
}
