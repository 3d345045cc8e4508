//! Source mesh cache
//!
//! Jobs share source meshes through `Arc`s so repeated combines of the same
//! scene copy every mesh once.

use crate::performance::CombineMetrics;
use mesh_combine_core::{Mesh, MeshId};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of a cached mesh: its name and a hash of all of its buffers
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    name: String,
    vertex_count: usize,
    triangle_count: usize,
    content: u64,
}

impl Fingerprint {
    fn of(mesh: &Mesh) -> Self {
        let mut hasher = DefaultHasher::new();
        let floats = mesh
            .vertices
            .iter()
            .chain(&mesh.normals)
            .flat_map(|v| v.to_array())
            .chain(mesh.uvs.iter().flat_map(|uv| uv.to_array()));
        for f in floats {
            hasher.write_u32(f.to_bits());
        }
        for sub_mesh in &mesh.sub_meshes {
            hasher.write_usize(sub_mesh.indices.len());
            for &i in &sub_mesh.indices {
                hasher.write_u32(i);
            }
        }
        // Separates "no normals" from "normals moved into uvs".
        hasher.write_usize(mesh.normals.len());
        hasher.write_usize(mesh.uvs.len());
        Self {
            name: mesh.name.clone(),
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            content: hasher.finish(),
        }
    }
}

/// Meshes copied out of the scene, keyed by id
#[derive(Debug, Default)]
pub struct MeshCache {
    meshes: Mutex<HashMap<MeshId, (Fingerprint, Arc<Mesh>)>>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached copy of `mesh`, caching it first if needed
    ///
    /// A cached entry that no longer matches the scene mesh is replaced.
    /// Cached copies always carry normals.
    pub fn get_or_insert(&self, id: MeshId, mesh: &Mesh, metrics: &CombineMetrics) -> Arc<Mesh> {
        let fingerprint = Fingerprint::of(mesh);
        let mut meshes = self.meshes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_print, cached)) = meshes.get(&id) {
            if *cached_print == fingerprint {
                metrics.record_cache_hit();
                return Arc::clone(cached);
            }
        }
        metrics.record_cache_miss();
        let mut copy = mesh.clone();
        if !copy.has_normals() {
            copy.recalculate_normals();
        }
        let copy = Arc::new(copy);
        meshes.insert(id, (fingerprint, Arc::clone(&copy)));
        copy
    }

    pub fn len(&self) -> usize {
        self.meshes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.meshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
