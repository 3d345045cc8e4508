//! Geometry helpers on top of `glam`

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
///
/// Stored as center and half extents, the way the host engine reports
/// renderer bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Bounds {
    /// Create bounds from a center and a full size
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center,
            extents: size * 0.5,
        }
    }

    /// Create bounds spanning two corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Smallest bounds holding every point, or `None` for no points
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_min_max(min, max))
    }

    pub fn size(&self) -> Vec3 {
        self.extents * 2.0
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// Check if a point lies inside or on the boundary
    pub fn contains(&self, point: Vec3) -> bool {
        let min = self.min();
        let max = self.max();
        point.cmpge(min).all() && point.cmple(max).all()
    }

    /// Check if two bounds overlap
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min().cmple(other.max()).all() && other.min().cmple(self.max()).all()
    }

    /// Grow to include another bounds
    pub fn encapsulate(&mut self, other: &Bounds) {
        *self = Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()));
    }

    /// The eight corner points
    pub fn corners(&self) -> [Vec3; 8] {
        let min = self.min();
        let max = self.max();
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Bounds of this box after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        // Cannot fail: a box always has eight corners.
        Self::from_points(self.corners().into_iter().map(|c| matrix.transform_point3(c)))
            .unwrap_or_default()
    }

    /// Largest axis of the full size
    pub fn max_size(&self) -> f32 {
        self.size().max_element()
    }
}

/// Clamp every component of `v` to at least `min`
pub fn clamp_min(v: Vec3, min: f32) -> Vec3 {
    v.max(Vec3::splat(min))
}

/// Normal of a triangle, not normalized; zero for degenerate triangles
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a)
}

/// Intersect a ray with a triangle (Möller–Trumbore)
///
/// Returns the distance along `dir` to the hit, if any. Both faces count as
/// hits.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let t_vec = origin - a;
    let u = t_vec.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = t_vec.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains() {
        let b = Bounds::new(Vec3::ZERO, Vec3::splat(2.0));
        assert!(b.contains(Vec3::new(1.0, -1.0, 0.5)));
        assert!(!b.contains(Vec3::new(1.01, 0.0, 0.0)));
        assert_eq!(b.min(), Vec3::splat(-1.0));
        assert_eq!(b.max_size(), 2.0);
    }

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points([Vec3::ZERO, Vec3::new(2.0, 4.0, -2.0)]).unwrap();
        assert_eq!(b.center, Vec3::new(1.0, 2.0, -1.0));
        assert_eq!(b.size(), Vec3::new(2.0, 4.0, 2.0));
        assert!(Bounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_bounds_transformed() {
        let b = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(10.0, 0.0, 0.0),
        );
        let t = b.transformed(&m);
        assert!((t.center - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((t.size() - Vec3::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let a = Vec3::new(-1.0, 0.0, -1.0);
        let b = Vec3::new(1.0, 0.0, -1.0);
        let c = Vec3::new(0.0, 0.0, 1.0);
        let hit = ray_triangle(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, a, b, c);
        assert!((hit.unwrap() - 5.0).abs() < 1e-5);
        assert!(ray_triangle(Vec3::new(5.0, 5.0, 0.0), Vec3::NEG_Y, a, b, c).is_none());
    }
}
