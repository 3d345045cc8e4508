//! Overlapping triangle removal
//!
//! Closed meshes on the overlap layers act as volumes. A triangle of a
//! source with every corner inside another node's volume can never be
//! seen and is dropped. Faces pressed against each other, like the shared
//! side of two snapped cubes, can be dropped as well.

use super::WorldSource;
use mesh_combine_core::math::{ray_triangle, triangle_normal};
use mesh_combine_core::{Bounds, LayerMask, NodeId, Scene, Vec3};
use tracing::debug;

/// Points closer than this to a volume's bounds count as outside
const INSIDE_EPSILON: f32 = 1e-4;

/// Distance below which two faces share a position
const SAME_POSITION_EPSILON: f32 = 1e-3;

/// Faces must point this much against each other to share a position
const OPPOSED_DOT: f32 = -0.999;

/// One closed mesh in world space
#[derive(Debug, Clone)]
pub struct OverlapVolume {
    pub node: NodeId,
    pub bounds: Bounds,
    pub triangles: Vec<[Vec3; 3]>,
}

impl OverlapVolume {
    pub fn new(node: NodeId, triangles: Vec<[Vec3; 3]>) -> Option<Self> {
        let bounds = Bounds::from_points(triangles.iter().flatten().copied())?;
        Some(Self {
            node,
            bounds,
            triangles,
        })
    }

    /// Check if a point lies strictly inside the volume
    ///
    /// Two opposite skewed rays count surface crossings and must both see
    /// an odd number. Points on the surface are outside.
    pub fn contains(&self, point: Vec3) -> bool {
        let min = self.bounds.min() + Vec3::splat(INSIDE_EPSILON);
        let max = self.bounds.max() - Vec3::splat(INSIDE_EPSILON);
        if point.cmplt(min).any() || point.cmpgt(max).any() {
            return false;
        }
        let dir = Vec3::new(0.0123, 1.0, 0.0311).normalize();
        self.crossings(point, dir) % 2 == 1 && self.crossings(point, -dir) % 2 == 1
    }

    fn crossings(&self, origin: Vec3, dir: Vec3) -> usize {
        self.triangles
            .iter()
            .filter_map(|&[a, b, c]| ray_triangle(origin, dir, a, b, c))
            .filter(|&t| t > INSIDE_EPSILON)
            .count()
    }

    /// Check if a face lies on one of the volume's faces, facing it
    fn covers(&self, centroid: Vec3, normal: Vec3) -> bool {
        let reach = Vec3::splat(SAME_POSITION_EPSILON);
        if centroid.cmplt(self.bounds.min() - reach).any()
            || centroid.cmpgt(self.bounds.max() + reach).any()
        {
            return false;
        }
        self.triangles.iter().any(|&[a, b, c]| {
            let other = triangle_normal(a, b, c).normalize_or_zero();
            other.dot(normal) < OPPOSED_DOT
                && (centroid - a).dot(other).abs() < SAME_POSITION_EPSILON
                && in_triangle(centroid, a, b, c)
        })
    }
}

/// Barycentric test on the triangle's plane; edges count as inside
fn in_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    const SLACK: f32 = 1e-4;
    let (e0, e1, ep) = (b - a, c - a, p - a);
    let (d00, d01, d11) = (e0.dot(e0), e0.dot(e1), e1.dot(e1));
    let (d20, d21) = (ep.dot(e0), ep.dot(e1));
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < f32::EPSILON {
        return false;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    v >= -SLACK && w >= -SLACK && v + w <= 1.0 + SLACK
}

/// Every overlap volume of a scene
#[derive(Debug, Clone, Default)]
pub struct OverlapVolumes {
    volumes: Vec<OverlapVolume>,
}

impl OverlapVolumes {
    /// Collect active nodes on `mask` layers with a readable mesh
    pub fn build(scene: &Scene, mask: LayerMask) -> Self {
        let mut volumes = Vec::new();
        for id in scene.node_ids() {
            let Some(node) = scene.node(id) else {
                continue;
            };
            if !mask.contains(node.layer) || !scene.is_active_in_hierarchy(id) {
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
            let triangles: Vec<[Vec3; 3]> = mesh
                .sub_meshes
                .iter()
                .flat_map(|s| s.indices.chunks_exact(3))
                .filter_map(|tri| {
                    let corner = |i: u32| {
                        mesh.vertices
                            .get(i as usize)
                            .map(|&v| world.transform_point3(v))
                    };
                    Some([corner(tri[0])?, corner(tri[1])?, corner(tri[2])?])
                })
                .collect();
            volumes.extend(OverlapVolume::new(id, triangles));
        }
        debug!(volumes = volumes.len(), "overlap volumes built");
        Self::from_volumes(volumes)
    }

    pub fn from_volumes(volumes: Vec<OverlapVolume>) -> Self {
        Self { volumes }
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Check if a point lies inside a volume not belonging to `node`
    pub fn is_inside(&self, node: NodeId, point: Vec3) -> bool {
        self.volumes
            .iter()
            .any(|v| v.node != node && v.contains(point))
    }

    /// Remove triangles of `source` hidden by other volumes
    ///
    /// With `same_position`, faces lying on an opposed face of another
    /// volume go too.
    pub(crate) fn cull(&self, source: &mut WorldSource, same_position: bool) -> usize {
        if self.is_empty() {
            return 0;
        }
        let node = source.node;
        let mut inside: Vec<Option<bool>> = vec![None; source.positions.len()];
        let positions = &source.positions;
        let before = source.triangles.len();
        source.triangles.retain(|tri| {
            let buried = tri.iter().all(|&i| {
                *inside[i as usize].get_or_insert_with(|| self.is_inside(node, positions[i as usize]))
            });
            if buried {
                return false;
            }
            if !same_position {
                return true;
            }
            let [a, b, c] = tri.map(|i| positions[i as usize]);
            let normal = triangle_normal(a, b, c).normalize_or_zero();
            if normal == Vec3::ZERO {
                return true;
            }
            let centroid = (a + b + c) / 3.0;
            !self
                .volumes
                .iter()
                .any(|v| v.node != node && v.covers(centroid, normal))
        });
        before - source.triangles.len()
    }
}
