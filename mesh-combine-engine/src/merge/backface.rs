//! Back face removal for cameras with a restricted view

use super::WorldSource;
use crate::settings::{BackFaceTriangleMode, OutputSettings};
use mesh_combine_core::math::triangle_normal;
use mesh_combine_core::{Bounds, Vec3};

/// Which triangles the camera can never see
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackFaceCull {
    /// The camera always looks along this direction
    Direction(Vec3),
    /// The camera never leaves this box
    Box(Bounds),
}

impl BackFaceCull {
    pub fn from_output(output: &OutputSettings) -> Option<Self> {
        if !output.remove_back_face_triangles {
            return None;
        }
        Some(match output.back_face_triangle_mode {
            BackFaceTriangleMode::Direction => Self::Direction(output.back_face_direction),
            BackFaceTriangleMode::Box => Self::Box(output.back_face_bounds),
        })
    }

    /// Check if a triangle faces away from every possible camera position
    pub fn is_back_face(&self, a: Vec3, b: Vec3, c: Vec3) -> bool {
        let normal = triangle_normal(a, b, c);
        if normal == Vec3::ZERO {
            return false;
        }
        match self {
            // A zero direction removes nothing.
            Self::Direction(direction) => normal.dot(*direction) > 0.0,
            Self::Box(bounds) => bounds
                .corners()
                .iter()
                .all(|&corner| (corner - a).dot(normal) <= 0.0),
        }
    }

    pub(crate) fn cull(&self, source: &mut WorldSource) -> usize {
        let before = source.triangles.len();
        let positions = &source.positions;
        source.triangles.retain(|tri| {
            let [a, b, c] = tri.map(|i| positions[i as usize]);
            !self.is_back_face(a, b, c)
        });
        before - source.triangles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counter-clockwise seen from +Y, so the normal points up.
    const A: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    const B: Vec3 = Vec3::new(0.0, 0.0, 1.0);
    const C: Vec3 = Vec3::new(1.0, 0.0, 0.0);

    #[test]
    fn test_direction_mode() {
        assert!(triangle_normal(A, B, C).y > 0.0);
        let looking_down = BackFaceCull::Direction(Vec3::NEG_Y);
        assert!(!looking_down.is_back_face(A, B, C));
        assert!(looking_down.is_back_face(A, C, B));
        assert!(!BackFaceCull::Direction(Vec3::ZERO).is_back_face(A, C, B));
    }

    #[test]
    fn test_box_mode() {
        let above = BackFaceCull::Box(Bounds::new(Vec3::new(0.0, 10.0, 0.0), Vec3::splat(2.0)));
        assert!(!above.is_back_face(A, B, C));
        assert!(above.is_back_face(A, C, B));

        // A box straddling the plane sees both sides.
        let around = BackFaceCull::Box(Bounds::new(Vec3::ZERO, Vec3::splat(2.0)));
        assert!(!around.is_back_face(A, B, C));
        assert!(!around.is_back_face(A, C, B));
    }

    #[test]
    fn test_degenerate_triangle_kept() {
        let cull = BackFaceCull::Direction(Vec3::Y);
        assert!(!cull.is_back_face(A, A, C));
    }
}
