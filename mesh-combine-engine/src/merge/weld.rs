//! Vertex welding

use super::MeshBuffer;
use crate::settings::OutputSettings;
use mesh_combine_core::Vec3;
use std::collections::HashMap;

/// Normal components are compared at this resolution
const NORMAL_STEPS: f32 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldSettings {
    /// Grid the positions are snapped to; exact comparison when `None`
    pub snap_size: Option<f32>,
    pub include_normals: bool,
}

impl WeldSettings {
    pub fn from_output(output: &OutputSettings) -> Self {
        Self {
            snap_size: output.weld_snap_vertices.then_some(output.weld_snap_size),
            include_normals: output.weld_include_normals,
        }
    }
}

type WeldKey = ([i64; 3], [i32; 3]);

fn weld_key(buffer: &MeshBuffer, i: usize, settings: &WeldSettings) -> WeldKey {
    let p = buffer.vertices[i];
    let position = match settings.snap_size {
        Some(size) => [p.x, p.y, p.z].map(|v| (v / size).round() as i64),
        // -0.0 and 0.0 are the same position.
        None => [p.x, p.y, p.z].map(|v| (v + 0.0).to_bits() as i64),
    };
    let normal = if settings.include_normals {
        let n = buffer.normals.get(i).copied().unwrap_or_default();
        [n.x, n.y, n.z].map(|v| (v * NORMAL_STEPS).round() as i32)
    } else {
        [0; 3]
    };
    (position, normal)
}

fn snap(v: Vec3, size: f32) -> Vec3 {
    (v / size).round() * size
}

/// Merge vertices with equal keys into their first occurrence
///
/// With a snap size every kept position is moved onto the grid. Triangles
/// that collapse to a line or a point are dropped. Returns the number of
/// vertices removed.
pub fn weld(buffer: &mut MeshBuffer, settings: &WeldSettings) -> usize {
    let count = buffer.vertex_count();
    let mut first: HashMap<WeldKey, u32> = HashMap::with_capacity(count);
    let mut remap = Vec::with_capacity(count);
    let mut keep = Vec::with_capacity(count);

    for i in 0..count {
        let next = keep.len() as u32;
        let target = *first.entry(weld_key(buffer, i, settings)).or_insert(next);
        if target == next {
            keep.push(i);
        }
        remap.push(target);
    }

    if let Some(size) = settings.snap_size {
        for &i in &keep {
            buffer.vertices[i] = snap(buffer.vertices[i], size);
        }
    }
    if keep.len() == count {
        return 0;
    }

    buffer.vertices = keep.iter().map(|&i| buffer.vertices[i]).collect();
    if !buffer.normals.is_empty() {
        buffer.normals = keep.iter().map(|&i| buffer.normals[i]).collect();
    }
    if !buffer.uvs.is_empty() {
        buffer.uvs = keep.iter().map(|&i| buffer.uvs[i]).collect();
    }

    let indices = std::mem::take(&mut buffer.indices);
    buffer.indices = indices
        .chunks_exact(3)
        .map(|tri| [remap[tri[0] as usize], remap[tri[1] as usize], remap[tri[2] as usize]])
        .filter(|[a, b, c]| a != b && b != c && a != c)
        .flatten()
        .collect();

    count - keep.len()
}
