//! Wavefront OBJ export of combined meshes

use crate::error::Result;
use mesh_combine_core::Mesh;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Render a mesh as OBJ text
///
/// Every sub-mesh becomes a group; normals and uvs are written when the
/// mesh has them.
pub fn export_to_obj(mesh: &Mesh) -> String {
    let mut obj = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(obj, "# Mesh: {}", mesh.name);
    let _ = writeln!(obj, "# Vertices: {}", mesh.vertex_count());
    let _ = writeln!(obj, "# Triangles: {}", mesh.triangle_count());
    let _ = writeln!(obj, "o {}", mesh.name);

    for v in &mesh.vertices {
        let _ = writeln!(obj, "v {} {} {}", v.x, v.y, v.z);
    }
    let has_normals = mesh.normals.len() == mesh.vertices.len() && mesh.has_normals();
    let has_uvs = mesh.uvs.len() == mesh.vertices.len() && mesh.has_uvs();
    if has_normals {
        for n in &mesh.normals {
            let _ = writeln!(obj, "vn {} {} {}", n.x, n.y, n.z);
        }
    }
    if has_uvs {
        for uv in &mesh.uvs {
            let _ = writeln!(obj, "vt {} {}", uv.x, uv.y);
        }
    }

    for (i, sub_mesh) in mesh.sub_meshes.iter().enumerate() {
        let _ = writeln!(obj, "g sub_mesh_{}", i);
        for tri in sub_mesh.indices.chunks_exact(3) {
            // OBJ indices are 1-based
            let corner = |index: u32| {
                let k = index + 1;
                match (has_uvs, has_normals) {
                    (true, true) => format!("{k}/{k}/{k}"),
                    (true, false) => format!("{k}/{k}"),
                    (false, true) => format!("{k}//{k}"),
                    (false, false) => format!("{k}"),
                }
            };
            let _ = writeln!(
                obj,
                "f {} {} {}",
                corner(tri[0]),
                corner(tri[1]),
                corner(tri[2])
            );
        }
    }
    obj
}

/// Write a mesh to an OBJ file
pub fn save_obj(path: &Path, mesh: &Mesh) -> Result<()> {
    fs::write(path, export_to_obj(mesh))?;
    Ok(())
}

/// Replace characters that do not belong in a file name
pub fn file_safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_combine_core::Vec3;

    #[test]
    fn test_export_cube() {
        let obj = export_to_obj(&Mesh::cube("cube", 1.0));
        assert_eq!(obj.lines().filter(|l| l.starts_with("v ")).count(), 24);
        assert_eq!(obj.lines().filter(|l| l.starts_with("vn ")).count(), 24);
        assert_eq!(obj.lines().filter(|l| l.starts_with("vt ")).count(), 24);
        assert_eq!(obj.lines().filter(|l| l.starts_with("f ")).count(), 12);
        assert!(obj.contains("f 1/1/1 2/2/2 3/3/3"));
    }

    #[test]
    fn test_export_positions_only() {
        let mesh = Mesh::new("tri", vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        let obj = export_to_obj(&mesh);
        assert!(obj.contains("f 1 2 3"));
        assert!(!obj.contains("vn "));
    }

    #[test]
    fn test_save_obj() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.obj");
        save_obj(&path, &Mesh::cube("cube", 2.0)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Mesh: cube"));
    }

    #[test]
    fn test_file_safe_name() {
        assert_eq!(file_safe_name("a b/c_1-2"), "a_b_c_1-2");
    }
}
