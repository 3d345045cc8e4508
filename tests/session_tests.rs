//! Session tests over scene and settings files

use mesh_combine_studio::session::CombineSession;
use mesh_combine_studio::{
    CombineJobMode, Mesh, MeshCombinerSettings, MeshRenderer, Scene, SceneNode,
    StaticEditorFlags, Transform, Vec3, load_scene, save_scene, save_settings,
};

fn row_of_cubes(count: usize) -> Scene {
    let mut scene = Scene::new();
    let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
    let root = scene.add_node(SceneNode::new("row"), None);
    for i in 0..count {
        let mut node = SceneNode::new(format!("cube_{i}"));
        node.static_flags = StaticEditorFlags::all();
        node.transform = Transform::from_position(Vec3::new(i as f32 * 2.0 + 1.0, 1.0, 1.0));
        node.renderer = Some(MeshRenderer::new(cube, "stone"));
        scene.add_node(node, Some(root));
    }
    scene
}

#[test]
fn test_open_combine_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let scene_path = dir.path().join("scene.yaml");
    let settings_path = dir.path().join("settings.yaml");

    save_scene(&scene_path, &row_of_cubes(10)).unwrap();
    let mut settings = MeshCombinerSettings::default();
    settings.output.cell_size = 8;
    settings.job_settings.use_multi_threading = false;
    save_settings(&settings_path, &settings).unwrap();

    let mut session = CombineSession::open(&scene_path, Some(&settings_path)).unwrap();
    assert_eq!(session.scene_path(), Some(scene_path.as_path()));

    let found = session.search();
    assert_eq!(found.objects, 10);
    assert_eq!(found.cells, 3);

    let report = session.combine().unwrap();
    assert_eq!(report.combined_meshes, 3);
    assert_eq!(report.stats.original_draw_calls, 10);
    assert_eq!(report.stats.new_draw_calls, 3);
    assert_eq!(report.stats.new_triangles, 120);
    assert!(report.failures.is_empty());

    let mesh_dir = dir.path().join("meshes");
    let written = session.save_meshes(&mesh_dir).unwrap();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|p| p.extension().is_some_and(|e| e == "obj")));

    // Source renderers are saved switched off.
    let out_path = dir.path().join("combined.yaml");
    session.save_scene(&out_path).unwrap();
    let reloaded = load_scene(&out_path).unwrap();
    let enabled = reloaded
        .nodes
        .iter()
        .filter_map(|n| n.renderer.as_ref())
        .filter(|r| r.enabled)
        .count();
    assert_eq!(enabled, 0);
}

#[test]
fn test_per_frame_session() {
    let mut settings = MeshCombinerSettings::default();
    settings.output.cell_size = 4;
    settings.job_settings.combine_job_mode = CombineJobMode::CombinePerFrame;
    settings.job_settings.combine_meshes_per_frame = 1;
    let mut session = CombineSession::new(row_of_cubes(12), settings);

    let report = session.combine().unwrap();
    assert_eq!(report.combined_meshes, report.jobs);
    assert_eq!(report.stats.new_triangles, 144);
    assert!(!session.combiner().is_combining());
    assert_eq!(session.restore(), 12);
}

#[test]
fn test_open_missing_scene() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.yaml");
    assert!(CombineSession::open(&missing, None::<&std::path::Path>).is_err());
}
