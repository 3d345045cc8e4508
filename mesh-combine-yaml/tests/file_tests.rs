//! Scene and settings files on disk

use mesh_combine_core::{
    LodGroup, Mesh, MeshRenderer, NodeId, Scene, SceneNode, StaticEditorFlags, Transform, Vec3,
};
use mesh_combine_engine::{CombineMode, MeshCombinerSettings};
use mesh_combine_yaml::{SceneDocument, YamlError, load_scene, load_settings, save_scene, save_settings};

fn sample_scene() -> Scene {
    let mut scene = Scene::new();
    let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
    let mut root = SceneNode::new("root");
    root.static_flags = StaticEditorFlags::all();
    root.components.push("MCSDynamicObject".to_string());
    let root = scene.add_node(root, None);

    let mut levels = Vec::new();
    for level in 0..2 {
        let mut node = SceneNode::new(format!("lod{level}"));
        node.transform = Transform::from_position(Vec3::new(level as f32, 0.0, 0.0));
        node.renderer = Some(MeshRenderer::new(cube, "stone"));
        levels.push(vec![scene.add_node(node, Some(root))]);
    }
    if let Some(node) = scene.node_mut(root) {
        node.lod_group = Some(LodGroup { levels });
    }
    scene
}

#[test]
fn test_scene_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scene.yaml");
    let scene = sample_scene();
    save_scene(&path, &scene)?;

    let loaded = load_scene(&path)?;
    assert_eq!(loaded, scene);
    assert_eq!(loaded.nodes[0].children, vec![NodeId(1), NodeId(2)]);
    Ok(())
}

#[test]
fn test_settings_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("settings.yaml");
    let mut settings = MeshCombinerSettings::default();
    settings.output.combine_mode = CombineMode::DynamicObjects;
    settings.output.vertex_output_limit = 20000;
    save_settings(&path, &settings)?;

    let text = std::fs::read_to_string(&path)?;
    assert!(text.contains("combine_mode: DynamicObjects"));
    assert_eq!(load_settings(&path)?, settings);
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = load_scene("does/not/exist.yaml").unwrap_err();
    assert!(matches!(err, YamlError::Io { .. }));
    assert!(err.to_string().contains("exist.yaml"));
}

#[test]
fn test_scene_document_save_in_place() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scene.yaml");
    save_scene(&path, &sample_scene())?;

    let mut doc = SceneDocument::load_scene(&path)?;
    doc.value.nodes[1].active = false;
    doc.save()?;

    assert!(!load_scene(&path)?.nodes[1].active);
    Ok(())
}
