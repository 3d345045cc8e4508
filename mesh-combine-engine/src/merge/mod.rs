//! Geometry merge and reduction
//!
//! One combine job turns its source sub-meshes into one or more output
//! buffers. Passes run in a fixed order:
//!
//! 1. transform to world space
//! 2. cull triangles below the surface
//! 3. cull triangles inside overlap volumes
//! 4. cull back faces
//! 5. split by the vertex output limit
//! 6. weld each output

pub mod backface;
pub mod overlap;
mod split;
pub mod surface;
pub mod weld;

pub use backface::BackFaceCull;
pub use overlap::{OverlapVolume, OverlapVolumes};
pub use surface::SurfaceIndex;
pub use weld::WeldSettings;

use crate::error::{CombineError, Result};
use crate::performance::{MemoryPool, PooledItem};
use crate::settings::OutputSettings;
use glam::Mat3;
use mesh_combine_core::{Bounds, Mat4, Mesh, NodeId, SubMesh, Vec2, Vec3};
use std::sync::Arc;

/// Vertex and index storage of one output mesh, reused through a pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffer {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Nodes whose geometry ended up in this buffer
    pub sources: Vec<NodeId>,
}

impl MeshBuffer {
    /// Empty the buffer, keeping its capacity
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.uvs.clear();
        self.indices.clear();
        self.sources.clear();
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.vertices.iter().copied()).unwrap_or_default()
    }

    /// Copy the buffer into a standalone mesh
    pub fn to_mesh(&self, name: impl Into<String>) -> Mesh {
        Mesh {
            name: name.into(),
            vertices: self.vertices.clone(),
            normals: self.normals.clone(),
            uvs: self.uvs.clone(),
            sub_meshes: vec![SubMesh::new(self.indices.clone())],
            is_readable: true,
        }
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        self.vertices.push(position);
        self.normals.push(normal);
        self.uvs.push(uv);
        self.vertices.len() as u32 - 1
    }

    fn note_source(&mut self, node: NodeId) {
        if self.sources.last() != Some(&node) {
            self.sources.push(node);
        }
    }
}

/// Pool of output buffers shared by every job of a manager
pub type MeshBufferPool = MemoryPool<MeshBuffer>;

/// Get an empty buffer from the pool
pub fn pooled_buffer(pool: &MeshBufferPool) -> PooledItem<MeshBuffer> {
    let mut buffer = pool.get();
    buffer.clear();
    buffer
}

/// One sub-mesh to merge, with its placement
#[derive(Debug, Clone)]
pub struct MergeSource {
    pub node: NodeId,
    pub mesh: Arc<Mesh>,
    pub sub_mesh: usize,
    pub world: Mat4,
}

/// Passes enabled for a job
#[derive(Debug, Clone, Default)]
pub struct MergeSettings {
    pub vertex_limit: Option<usize>,
    pub weld: Option<WeldSettings>,
    pub back_face: Option<BackFaceCull>,
    pub surface: Option<Arc<SurfaceIndex>>,
    pub overlap: Option<Arc<OverlapVolumes>>,
    pub remove_same_position: bool,
}

impl MergeSettings {
    /// Passes requested by output settings; `surface` and `overlap` are
    /// used when their removal is on
    pub fn from_output(
        output: &OutputSettings,
        surface: Option<Arc<SurfaceIndex>>,
        overlap: Option<Arc<OverlapVolumes>>,
    ) -> Self {
        Self {
            vertex_limit: output
                .use_vertex_output_limit
                .then_some(output.vertex_output_limit.max(1)),
            weld: output.weld_vertices.then(|| WeldSettings::from_output(output)),
            back_face: BackFaceCull::from_output(output),
            surface: if output.remove_triangles_below_surface {
                surface
            } else {
                None
            },
            overlap: if output.remove_overlapping_triangles {
                overlap
            } else {
                None
            },
            remove_same_position: output.remove_same_position_triangles,
        }
    }
}

/// Result of merging one group
#[derive(Debug, Default)]
pub struct MergeOutput {
    /// Output meshes, none of them empty
    pub meshes: Vec<PooledItem<MeshBuffer>>,
    pub vertices_in: usize,
    pub triangles_in: usize,
    pub below_surface_removed: usize,
    pub overlapping_removed: usize,
    pub back_faces_removed: usize,
}

impl MergeOutput {
    pub fn vertices_out(&self) -> usize {
        self.meshes.iter().map(|m| m.vertex_count()).sum()
    }

    pub fn triangles_out(&self) -> usize {
        self.meshes.iter().map(|m| m.triangle_count()).sum()
    }
}

/// A source sub-mesh in world space, holding only the vertices it uses
#[derive(Debug, Clone, Default)]
pub(crate) struct WorldSource {
    pub node: NodeId,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

impl WorldSource {
    fn from_source(source: &MergeSource) -> Result<Self> {
        let mesh = &*source.mesh;
        let sub_mesh = mesh.sub_meshes.get(source.sub_mesh).ok_or_else(|| {
            CombineError::merge_failed(format!(
                "mesh '{}' has no sub-mesh {}",
                mesh.name, source.sub_mesh
            ))
        })?;

        let determinant = source.world.determinant();
        let flip = determinant < 0.0;
        let linear = Mat3::from_mat4(source.world);
        let normal_matrix = if determinant.abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };

        let mut world = WorldSource {
            node: source.node,
            ..WorldSource::default()
        };
        let mut remap = vec![u32::MAX; mesh.vertices.len()];
        for tri in sub_mesh.indices.chunks_exact(3) {
            let mut out = [0u32; 3];
            for (slot, &index) in out.iter_mut().zip(tri) {
                let i = index as usize;
                let Some(&position) = mesh.vertices.get(i) else {
                    return Err(CombineError::merge_failed(format!(
                        "mesh '{}' references vertex {} of {}",
                        mesh.name,
                        index,
                        mesh.vertices.len()
                    )));
                };
                if remap[i] == u32::MAX {
                    remap[i] = world.positions.len() as u32;
                    world.positions.push(source.world.transform_point3(position));
                    let normal = mesh.normals.get(i).copied().unwrap_or(Vec3::ZERO);
                    world.normals.push((normal_matrix * normal).normalize_or_zero());
                    world.uvs.push(mesh.uvs.get(i).copied().unwrap_or(Vec2::ZERO));
                }
                *slot = remap[i];
            }
            // Mirrored transforms turn the winding inside out.
            if flip {
                out.swap(1, 2);
            }
            world.triangles.push(out);
        }
        Ok(world)
    }

    pub fn corners(&self, tri: &[u32; 3]) -> [Vec3; 3] {
        tri.map(|i| self.positions[i as usize])
    }
}

/// Merge one group of sources into output buffers
pub fn merge_group(
    sources: &[MergeSource],
    settings: &MergeSettings,
    pool: &MeshBufferPool,
) -> Result<MergeOutput> {
    let mut world = sources
        .iter()
        .map(WorldSource::from_source)
        .collect::<Result<Vec<_>>>()?;

    let mut output = MergeOutput {
        vertices_in: world.iter().map(|w| w.positions.len()).sum(),
        triangles_in: world.iter().map(|w| w.triangles.len()).sum(),
        ..MergeOutput::default()
    };

    if let Some(surface) = &settings.surface {
        for source in &mut world {
            output.below_surface_removed += surface.cull_below(source);
        }
    }

    if let Some(volumes) = &settings.overlap {
        for source in &mut world {
            output.overlapping_removed += volumes.cull(source, settings.remove_same_position);
        }
    }

    if let Some(cull) = &settings.back_face {
        for source in &mut world {
            output.back_faces_removed += cull.cull(source);
        }
    }

    let mut meshes = split::pack(&world, settings.vertex_limit, pool);

    if let Some(weld) = &settings.weld {
        for mesh in &mut meshes {
            weld::weld(mesh, weld);
        }
    }

    meshes.retain(|m| !m.indices.is_empty());
    output.meshes = meshes;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_combine_core::Quat;

    fn pool() -> MeshBufferPool {
        MeshBufferPool::new(MeshBuffer::default)
    }

    fn cube_source(node: u32, position: Vec3) -> MergeSource {
        MergeSource {
            node: NodeId(node),
            mesh: Arc::new(Mesh::cube("cube", 1.0)),
            sub_mesh: 0,
            world: Mat4::from_translation(position),
        }
    }

    #[test]
    fn test_merge_without_passes() {
        let sources = [cube_source(1, Vec3::ZERO), cube_source(2, Vec3::X * 5.0)];
        let output = merge_group(&sources, &MergeSettings::default(), &pool()).unwrap();
        assert_eq!(output.meshes.len(), 1);
        let mesh = &output.meshes[0];
        assert_eq!(mesh.vertex_count(), 48);
        assert_eq!(mesh.triangle_count(), 24);
        assert_eq!(mesh.sources, vec![NodeId(1), NodeId(2)]);
        assert!((mesh.bounds().center - Vec3::new(2.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_mirrored_transform_keeps_outward_winding() {
        let source = MergeSource {
            world: Mat4::from_scale_rotation_translation(
                Vec3::new(-1.0, 1.0, 1.0),
                Quat::IDENTITY,
                Vec3::ZERO,
            ),
            ..cube_source(1, Vec3::ZERO)
        };
        let world = WorldSource::from_source(&source).unwrap();
        for tri in &world.triangles {
            let [a, b, c] = world.corners(tri);
            let normal = mesh_combine_core::math::triangle_normal(a, b, c);
            assert!(normal.dot((a + b + c) / 3.0) > 0.0);
        }
        // Normals follow the mirror too.
        assert!(world.normals.iter().any(|n| (*n - Vec3::NEG_X).length() < 1e-5));
    }

    #[test]
    fn test_snapped_cubes_lose_shared_faces() {
        let sources = [cube_source(1, Vec3::ZERO), cube_source(2, Vec3::X)];
        let volumes = sources
            .iter()
            .map(|s| {
                let world = WorldSource::from_source(s).unwrap();
                let triangles = world.triangles.iter().map(|t| world.corners(t)).collect();
                OverlapVolume::new(s.node, triangles).unwrap()
            })
            .collect();
        let mut settings = MergeSettings {
            overlap: Some(Arc::new(OverlapVolumes::from_volumes(volumes))),
            ..MergeSettings::default()
        };

        let output = merge_group(&sources, &settings, &pool()).unwrap();
        assert_eq!(output.overlapping_removed, 0);
        assert_eq!(output.triangles_out(), 24);

        settings.remove_same_position = true;
        let output = merge_group(&sources, &settings, &pool()).unwrap();
        assert_eq!(output.overlapping_removed, 4);
        assert_eq!(output.triangles_out(), 20);
    }

    #[test]
    fn test_bad_sub_mesh_is_an_error() {
        let source = MergeSource {
            sub_mesh: 3,
            ..cube_source(1, Vec3::ZERO)
        };
        let err = merge_group(&[source], &MergeSettings::default(), &pool()).unwrap_err();
        assert!(matches!(err, CombineError::MergeFailed(_)));
    }

    #[test]
    fn test_buffers_return_to_pool() {
        let pool = pool();
        let output =
            merge_group(&[cube_source(1, Vec3::ZERO)], &MergeSettings::default(), &pool).unwrap();
        assert_eq!(pool.size(), 0);
        drop(output);
        assert_eq!(pool.size(), 1);
    }
}
