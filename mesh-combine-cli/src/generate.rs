//! Random demo scenes

use mesh_combine_studio::{
    LodGroup, Mesh, MeshRenderer, Quat, Scene, SceneNode, StaticEditorFlags, SubMesh, Transform,
    Vec3,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MATERIALS: [&str; 4] = ["stone", "wood", "metal", "glass"];

/// Every n-th object becomes a two level LOD group
const LOD_EVERY: usize = 10;

/// Scatter `count` objects over a `size` wide square, all static
pub fn generate_scene(count: usize, size: f32, seed: u64) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Scene::new();

    let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
    let crate_low = scene.add_mesh(Mesh::cube("crate_low", 1.0));
    let pillar = scene.add_mesh(two_material_pillar());
    let meshes = [cube, pillar];

    let mut ground = SceneNode::new("ground");
    ground.has_collider = true;
    ground.transform.scale = Vec3::new(size * 2.0, 0.1, size * 2.0);
    ground.transform.position = Vec3::new(size * 0.5, -0.05, size * 0.5);
    ground.renderer = Some(MeshRenderer::new(cube, "grass"));
    scene.add_node(ground, None);

    let root = scene.add_node(SceneNode::new("objects"), None);
    for i in 0..count {
        let position = Vec3::new(
            rng.gen_range(0.0..size),
            rng.gen_range(0.0..2.0),
            rng.gen_range(0.0..size),
        );
        let mut node = SceneNode::new(format!("object_{i}"));
        node.static_flags = StaticEditorFlags::all();
        node.transform = Transform {
            position,
            rotation: Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)),
            scale: Vec3::splat(rng.gen_range(0.5..2.0)),
        };
        let material = MATERIALS[rng.gen_range(0..MATERIALS.len())];

        if i % LOD_EVERY == LOD_EVERY - 1 {
            let parent = scene.add_node(node, Some(root));
            let mut levels = Vec::with_capacity(2);
            for (level, mesh) in [cube, crate_low].into_iter().enumerate() {
                let mut child = SceneNode::new(format!("object_{i}_lod{level}"));
                child.static_flags = StaticEditorFlags::all();
                child.renderer = Some(MeshRenderer::new(mesh, material));
                levels.push(vec![scene.add_node(child, Some(parent))]);
            }
            if let Some(parent) = scene.node_mut(parent) {
                parent.lod_group = Some(LodGroup { levels });
            }
        } else {
            let mesh = meshes[rng.gen_range(0..meshes.len())];
            let mut renderer = MeshRenderer::new(mesh, material);
            renderer.materials.push("trim".to_string());
            node.renderer = Some(renderer);
            scene.add_node(node, Some(root));
        }
    }
    scene
}

/// Tall box whose top face uses a second material
fn two_material_pillar() -> Mesh {
    let mut mesh = Mesh::cube("pillar", 1.0);
    for v in &mut mesh.vertices {
        v.y *= 3.0;
    }
    let indices = std::mem::take(&mut mesh.sub_meshes[0].indices);
    let (top, sides): (Vec<[u32; 3]>, Vec<[u32; 3]>) = indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .partition(|t| t.iter().all(|&i| mesh.normals[i as usize].y > 0.5));
    mesh.sub_meshes = vec![
        SubMesh::new(sides.into_iter().flatten().collect()),
        SubMesh::new(top.into_iter().flatten().collect()),
    ];
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate_scene(30, 40.0, 9);
        let b = generate_scene(30, 40.0, 9);
        assert_eq!(a, b);
        assert!(a.validate().is_ok());
        assert_eq!(
            a.nodes.iter().filter(|n| n.lod_group.is_some()).count(),
            3
        );
    }

    #[test]
    fn test_pillar_has_two_sub_meshes() {
        let pillar = two_material_pillar();
        assert_eq!(pillar.sub_meshes.len(), 2);
        assert_eq!(pillar.sub_meshes[1].triangle_count(), 2);
        assert_eq!(pillar.triangle_count(), 12);
    }
}
