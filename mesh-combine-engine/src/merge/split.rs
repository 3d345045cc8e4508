//! Packing world space sources into output buffers under a vertex limit

use super::{MeshBuffer, MeshBufferPool, WorldSource, pooled_buffer};
use crate::performance::PooledItem;

/// Pack sources in order into buffers of at most `limit` vertices
///
/// Whole sources are kept together; only a source that alone exceeds the
/// limit is split between triangles. Only the last buffer takes new
/// sources, so input order is kept even when a tighter packing exists.
pub(crate) fn pack(
    sources: &[WorldSource],
    limit: Option<usize>,
    pool: &MeshBufferPool,
) -> Vec<PooledItem<MeshBuffer>> {
    let mut packer = Packer {
        pool,
        limit: limit.unwrap_or(usize::MAX),
        current: None,
        out: Vec::new(),
        remap: Vec::new(),
    };

    for source in sources {
        let used = referenced_vertices(source);
        if used == 0 {
            continue;
        }
        if packer.current_count() + used > packer.limit {
            packer.flush();
        }
        if used <= packer.limit {
            packer.append_whole(source);
        } else {
            packer.append_split(source);
        }
    }
    packer.flush();
    packer.out
}

/// Vertices still referenced by a source's remaining triangles
fn referenced_vertices(source: &WorldSource) -> usize {
    let mut seen = vec![false; source.positions.len()];
    let mut count = 0;
    for &i in source.triangles.iter().flatten() {
        if !std::mem::replace(&mut seen[i as usize], true) {
            count += 1;
        }
    }
    count
}

struct Packer<'a> {
    pool: &'a MeshBufferPool,
    limit: usize,
    current: Option<PooledItem<MeshBuffer>>,
    out: Vec<PooledItem<MeshBuffer>>,
    // Source vertex index to output index, u32::MAX when not yet copied.
    remap: Vec<u32>,
}

impl Packer<'_> {
    fn current_count(&self) -> usize {
        self.current.as_ref().map_or(0, |b| b.vertex_count())
    }

    fn flush(&mut self) {
        if let Some(buffer) = self.current.take() {
            if !buffer.indices.is_empty() {
                self.out.push(buffer);
            }
        }
    }

    fn reset_remap(&mut self, len: usize) {
        self.remap.clear();
        self.remap.resize(len, u32::MAX);
    }

    fn append_whole(&mut self, source: &WorldSource) {
        self.reset_remap(source.positions.len());
        for tri in &source.triangles {
            self.append_triangle(source, tri);
        }
    }

    fn append_split(&mut self, source: &WorldSource) {
        self.reset_remap(source.positions.len());
        for tri in &source.triangles {
            let mut needed = 0;
            for (k, &i) in tri.iter().enumerate() {
                if self.remap[i as usize] == u32::MAX && !tri[..k].contains(&i) {
                    needed += 1;
                }
            }
            if self.current_count() > 0 && self.current_count() + needed > self.limit {
                self.flush();
                self.reset_remap(source.positions.len());
            }
            self.append_triangle(source, tri);
        }
    }

    fn append_triangle(&mut self, source: &WorldSource, tri: &[u32; 3]) {
        let pool = self.pool;
        let buffer = self.current.get_or_insert_with(|| pooled_buffer(pool));
        buffer.note_source(source.node);
        for &i in tri {
            let slot = &mut self.remap[i as usize];
            if *slot == u32::MAX {
                let i = i as usize;
                *slot = buffer.push_vertex(source.positions[i], source.normals[i], source.uvs[i]);
            }
            buffer.indices.push(*slot);
        }
    }
}
