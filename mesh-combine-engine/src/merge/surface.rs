//! Below-surface triangle removal
//!
//! Surface triangles are bucketed on a 2D grid over x/z so each downward
//! ray only tests the triangles under it.

use super::WorldSource;
use mesh_combine_core::math::ray_triangle;
use mesh_combine_core::{LayerMask, Scene, Vec3};
use std::collections::HashMap;
use tracing::debug;

/// Edge length of one grid bucket
const GRID_CELL: f32 = 8.0;

/// A vertex must lie this far under the surface to count as below it
const BELOW_EPSILON: f32 = 1e-4;

/// World space surface triangles, queried with downward rays
#[derive(Debug, Clone, Default)]
pub struct SurfaceIndex {
    triangles: Vec<[Vec3; 3]>,
    grid: HashMap<(i32, i32), Vec<u32>>,
    max_height: f32,
}

impl SurfaceIndex {
    /// Collect surfaces from the scene
    ///
    /// Surfaces are nodes on `mask` layers that have a collider, or every
    /// renderer on those layers with `no_colliders`.
    pub fn build(scene: &Scene, mask: LayerMask, no_colliders: bool, max_height: f32) -> Self {
        let mut triangles = Vec::new();
        for id in scene.node_ids() {
            let Some(node) = scene.node(id) else {
                continue;
            };
            if !mask.contains(node.layer) || !scene.is_active_in_hierarchy(id) {
                continue;
            }
            if !no_colliders && !node.has_collider {
                continue;
            }
            let Some(mesh) = node
                .renderer
                .as_ref()
                .and_then(|r| r.mesh)
                .and_then(|m| scene.mesh(m))
            else {
                continue;
            };
            if !mesh.is_readable {
                continue;
            }
            let world = scene.world_matrix(id);
            for sub_mesh in &mesh.sub_meshes {
                for tri in sub_mesh.indices.chunks_exact(3) {
                    let corner = |i: u32| {
                        mesh.vertices
                            .get(i as usize)
                            .map(|&v| world.transform_point3(v))
                    };
                    if let (Some(a), Some(b), Some(c)) = (corner(tri[0]), corner(tri[1]), corner(tri[2])) {
                        triangles.push([a, b, c]);
                    }
                }
            }
        }
        debug!(triangles = triangles.len(), "surface index built");
        Self::from_triangles(triangles, max_height)
    }

    /// Index a list of world space triangles
    pub fn from_triangles(triangles: Vec<[Vec3; 3]>, max_height: f32) -> Self {
        let mut grid: HashMap<(i32, i32), Vec<u32>> = HashMap::new();
        for (i, tri) in triangles.iter().enumerate() {
            let min = tri[0].min(tri[1]).min(tri[2]);
            let max = tri[0].max(tri[1]).max(tri[2]);
            let (x0, z0) = grid_cell(min);
            let (x1, z1) = grid_cell(max);
            for x in x0..=x1 {
                for z in z0..=z1 {
                    grid.entry((x, z)).or_default().push(i as u32);
                }
            }
        }
        Self {
            triangles,
            grid,
            max_height,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Height of the first surface hit by a ray cast down at `(x, z)`
    pub fn surface_height(&self, x: f32, z: f32) -> Option<f32> {
        let origin = Vec3::new(x, self.max_height, z);
        let bucket = self.grid.get(&grid_cell(origin))?;
        bucket
            .iter()
            .filter_map(|&i| {
                let [a, b, c] = self.triangles[i as usize];
                ray_triangle(origin, Vec3::NEG_Y, a, b, c)
            })
            .reduce(f32::min)
            .map(|t| self.max_height - t)
    }

    /// Check if a point lies under the surface
    pub fn is_below(&self, point: Vec3) -> bool {
        point.y < self.max_height
            && self
                .surface_height(point.x, point.z)
                .is_some_and(|h| h > point.y + BELOW_EPSILON)
    }

    /// Remove triangles with every corner below the surface
    pub(crate) fn cull_below(&self, source: &mut WorldSource) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut below: Vec<Option<bool>> = vec![None; source.positions.len()];
        let positions = &source.positions;
        let before = source.triangles.len();
        source.triangles.retain(|tri| {
            !tri.iter().all(|&i| {
                *below[i as usize].get_or_insert_with(|| self.is_below(positions[i as usize]))
            })
        });
        before - source.triangles.len()
    }
}

fn grid_cell(p: Vec3) -> (i32, i32) {
    (
        (p.x / GRID_CELL).floor() as i32,
        (p.z / GRID_CELL).floor() as i32,
    )
}
