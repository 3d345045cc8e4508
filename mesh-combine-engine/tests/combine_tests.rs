//! End to end combine tests
//!
//! Scenes are generated from a fixed seed so every run sees the same
//! layout.

use mesh_combine_core::{
    Mesh, MeshRenderer, NodeId, Scene, SceneNode, StaticEditorFlags, Transform, Vec3,
};
use mesh_combine_engine::{
    CombineJobMode, CombinedObject, GroupScope, JobSettings, MeshCombineJobManager, MeshCombiner,
    ThreadAmountMode, cell_key,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

const MATERIALS: [&str; 3] = ["stone", "wood", "metal"];

fn static_node(name: &str, position: Vec3) -> SceneNode {
    let mut node = SceneNode::new(name);
    node.static_flags = StaticEditorFlags::all();
    node.transform = Transform::from_position(position);
    node
}

/// `count` small meshes scattered through a 40 unit cube
fn random_scene(count: usize, seed: u64) -> (Scene, Vec<NodeId>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Scene::new();
    let meshes: Vec<_> = (0..4)
        .map(|i| scene.add_mesh(Mesh::cube(format!("cube{i}"), 0.5 + i as f32 * 0.25)))
        .collect();

    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let position = Vec3::new(
            rng.gen_range(0.0..40.0),
            rng.gen_range(0.0..40.0),
            rng.gen_range(0.0..40.0),
        );
        let mut node = static_node(&format!("object{i}"), position);
        let mesh = meshes[rng.gen_range(0..meshes.len())];
        let material = MATERIALS[rng.gen_range(0..MATERIALS.len())];
        node.renderer = Some(MeshRenderer::new(mesh, material));
        nodes.push(scene.add_node(node, None));
    }
    (scene, nodes)
}

fn single_threaded() -> Arc<MeshCombineJobManager> {
    let settings = JobSettings {
        use_multi_threading: false,
        ..JobSettings::default()
    };
    Arc::new(MeshCombineJobManager::with_cores(settings, 4))
}

fn multi_threaded(workers: usize, use_main_thread: bool) -> Arc<MeshCombineJobManager> {
    let settings = JobSettings {
        use_multi_threading: true,
        thread_amount_mode: ThreadAmountMode::Custom,
        custom_thread_amount: workers,
        use_main_thread,
        ..JobSettings::default()
    };
    Arc::new(MeshCombineJobManager::with_cores(settings, workers))
}

fn combiner_for(manager: &Arc<MeshCombineJobManager>, cell_size: i32) -> MeshCombiner {
    let mut combiner = MeshCombiner::new("combiner", Arc::clone(manager));
    combiner.settings.output.cell_size = cell_size;
    combiner.settings.job_settings = manager.job_settings();
    combiner
}

fn enabled(scene: &Scene, node: NodeId) -> bool {
    scene
        .node(node)
        .and_then(|n| n.renderer.as_ref())
        .is_some_and(|r| r.enabled)
}

fn sorted_meshes(objects: &[CombinedObject]) -> Vec<Mesh> {
    let mut meshes: Vec<Mesh> = objects.iter().map(|o| o.mesh.clone()).collect();
    meshes.sort_by(|a, b| a.name.cmp(&b.name));
    meshes
}

#[test]
fn test_random_scene_combines_by_cell() {
    let (mut scene, nodes) = random_scene(100, 7);
    let manager = single_threaded();
    let mut combiner = combiner_for(&manager, 10);

    let jobs = combiner.combine_all(&mut scene).unwrap();
    assert!(jobs > 0);
    assert!(combiner.cell_index().cell_count() <= 64);
    assert_eq!(combiner.found().objects.len(), 100);
    assert_eq!(combiner.found_combine_conditions().material_count, 3);
    assert!(combiner.failures().is_empty());

    // Nothing is culled, so every triangle survives.
    let stats = combiner.stats();
    assert_eq!(stats.original_draw_calls, 100);
    assert_eq!(stats.original_triangles, 1200);
    assert_eq!(stats.new_triangles, 1200);
    assert_eq!(stats.new_vertices, 2400);
    assert!(stats.new_draw_calls < stats.original_draw_calls);

    // Every source sits in the cell its output is bound to.
    let settings = &combiner.settings.output;
    for object in combiner.combined_objects() {
        let GroupScope::Cell(cell) = object.scope else {
            panic!("static combine produced a dynamic group");
        };
        for &source in &object.sources {
            let center = scene.renderer_bounds(source).unwrap().center;
            assert_eq!(cell_key(center, settings.cell_size, settings.cell_offset), cell);
        }
    }
    assert!(nodes.iter().all(|&n| !enabled(&scene, n)));

    assert_eq!(combiner.restore_originals(&mut scene), 100);
    assert!(nodes.iter().all(|&n| enabled(&scene, n)));
}

#[test]
fn test_worker_threads_match_single_thread() {
    let (mut scene, _) = random_scene(100, 11);
    let single = single_threaded();
    let mut combiner = combiner_for(&single, 10);
    combiner.combine_all(&mut scene).unwrap();
    let expected = sorted_meshes(combiner.combined_objects());
    combiner.reset(&mut scene);

    let threaded = multi_threaded(4, false);
    let mut combiner = combiner_for(&threaded, 10);
    combiner.combine_all(&mut scene).unwrap();
    assert_eq!(sorted_meshes(combiner.combined_objects()), expected);

    let status = threaded.status();
    assert_eq!(status.unfinished(), 0);
    assert_eq!(status.worker_states.len(), 4);
    assert_eq!(
        status.worker_jobs_done.iter().sum::<usize>(),
        combiner.progress().total_jobs
    );
}

#[test]
fn test_combine_is_idempotent() {
    let (mut scene, _) = random_scene(60, 3);
    let manager = multi_threaded(2, true);
    let mut combiner = combiner_for(&manager, 10);

    combiner.combine_all(&mut scene).unwrap();
    let first = sorted_meshes(combiner.combined_objects());
    let first_stats = combiner.stats().clone();
    combiner.combine_all(&mut scene).unwrap();

    assert_eq!(sorted_meshes(combiner.combined_objects()), first);
    assert_eq!(combiner.stats().new_draw_calls, first_stats.new_draw_calls);
    assert_eq!(combiner.stats().new_vertices, first_stats.new_vertices);
}

/// Flat grid of `side * side` vertices
fn grid_mesh(side: u32) -> Mesh {
    let mut vertices = Vec::with_capacity((side * side) as usize);
    for z in 0..side {
        for x in 0..side {
            vertices.push(Vec3::new(x as f32 * 0.1, 0.0, z as f32 * 0.1));
        }
    }
    let mut indices = Vec::new();
    for z in 0..side - 1 {
        for x in 0..side - 1 {
            let i = z * side + x;
            indices.extend_from_slice(&[i, i + side, i + 1, i + 1, i + side, i + side + 1]);
        }
    }
    Mesh::new("grid", vertices, indices)
}

#[test]
fn test_vertex_limit_splits_output() {
    let mut scene = Scene::new();
    let mesh = scene.add_mesh(grid_mesh(50));
    let mut node = static_node("grid", Vec3::new(1.0, 1.0, 1.0));
    node.renderer = Some(MeshRenderer::new(mesh, "stone"));
    scene.add_node(node, None);

    let manager = single_threaded();
    let mut combiner = combiner_for(&manager, 32);
    combiner.settings.output.use_vertex_output_limit = true;
    combiner.settings.output.vertex_output_limit = 1000;
    combiner.combine_all(&mut scene).unwrap();

    let objects = combiner.combined_objects();
    assert!(objects.len() >= 3);
    assert!(objects.iter().all(|o| o.mesh.vertex_count() <= 1000));
    let triangles: usize = objects.iter().map(|o| o.mesh.triangle_count()).sum();
    assert_eq!(triangles, 49 * 49 * 2);
}

#[test]
fn test_weld_cube() {
    let mut scene = Scene::new();
    let mesh = scene.add_mesh(Mesh::cube("cube", 1.0));
    let mut node = static_node("cube", Vec3::ONE);
    node.renderer = Some(MeshRenderer::new(mesh, "stone"));
    scene.add_node(node, None);

    let manager = single_threaded();
    let mut combiner = combiner_for(&manager, 32);
    combiner.settings.output.weld_vertices = true;
    combiner.combine_all(&mut scene).unwrap();

    let mesh = &combiner.combined_objects()[0].mesh;
    assert_eq!(mesh.vertex_count(), 8);
    assert_eq!(mesh.triangle_count(), 12);

    // With normals compared, the faces stay apart.
    combiner.settings.output.weld_include_normals = true;
    combiner.combine_all(&mut scene).unwrap();
    assert_eq!(combiner.combined_objects()[0].mesh.vertex_count(), 24);
}

#[test]
fn test_abort_then_recombine() {
    let (mut scene, nodes) = random_scene(100, 21);
    let manager = multi_threaded(2, false);
    let mut combiner = combiner_for(&manager, 10);
    combiner.settings.job_settings.combine_job_mode = CombineJobMode::CombinePerFrame;
    combiner.settings.job_settings.combine_meshes_per_frame = 1;

    let jobs = combiner.combine_all(&mut scene).unwrap();
    assert!(jobs > 1);
    combiner.update(&mut scene);
    combiner.abort_and_clear();
    assert!(!combiner.is_combining());

    let status = manager.status();
    assert_eq!(status.pending_jobs, 0);
    assert_eq!(status.queued_jobs, 0);

    // Results still in flight are dropped; nothing more is applied.
    let applied = combiner.combined_objects().len();
    assert_eq!(combiner.update(&mut scene), 0);
    assert_eq!(combiner.combined_objects().len(), applied);

    combiner.settings.job_settings.combine_job_mode = CombineJobMode::CombineAtOnce;
    combiner.combine_all(&mut scene).unwrap();
    assert_eq!(combiner.progress().finished_jobs, combiner.progress().total_jobs);
    assert_eq!(combiner.stats().new_triangles, 1200);
    assert!(nodes.iter().all(|&n| !enabled(&scene, n)));
}

#[test]
fn test_below_surface_triangles_removed() {
    let mut scene = Scene::new();
    let ground = scene.add_mesh(Mesh::new(
        "ground",
        vec![
            Vec3::new(-100.0, 0.0, -100.0),
            Vec3::new(100.0, 0.0, -100.0),
            Vec3::new(100.0, 0.0, 100.0),
            Vec3::new(-100.0, 0.0, 100.0),
        ],
        vec![0, 2, 1, 0, 3, 2],
    ));
    let mut node = SceneNode::new("ground");
    node.has_collider = true;
    node.renderer = Some(MeshRenderer::new(ground, "grass"));
    scene.add_node(node, None);

    let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
    for (name, y) in [("buried", -5.0), ("visible", 5.0)] {
        let mut node = static_node(name, Vec3::new(2.0, y, 2.0));
        node.renderer = Some(MeshRenderer::new(cube, "stone"));
        scene.add_node(node, None);
    }

    let manager = single_threaded();
    let mut combiner = combiner_for(&manager, 32);
    combiner.settings.output.remove_triangles_below_surface = true;
    combiner.combine_all(&mut scene).unwrap();

    let triangles: usize = combiner
        .combined_objects()
        .iter()
        .map(|o| o.mesh.triangle_count())
        .sum();
    assert_eq!(triangles, 12);
}

#[test]
fn test_overlapping_triangles_removed() {
    let mut scene = Scene::new();
    for (name, size, x) in [
        ("hall", 4.0, 3.0),
        ("crate", 0.5, 3.0),
        ("left", 1.0, 10.0),
        ("right", 1.0, 11.0),
    ] {
        let mesh = scene.add_mesh(Mesh::cube(name, size));
        let mut node = static_node(name, Vec3::new(x, 3.0, 3.0));
        node.renderer = Some(MeshRenderer::new(mesh, "stone"));
        scene.add_node(node, None);
    }

    let manager = single_threaded();
    let mut combiner = combiner_for(&manager, 32);
    combiner.settings.output.remove_overlapping_triangles = true;
    combiner.combine_all(&mut scene).unwrap();
    // The crate sits inside the hall.
    assert_eq!(combiner.stats().new_triangles, 36);

    combiner.settings.output.remove_same_position_triangles = true;
    combiner.combine_all(&mut scene).unwrap();
    assert_eq!(combiner.stats().new_triangles, 32);

    combiner.settings.output.overlap_layer_mask = mesh_combine_core::LayerMask::NOTHING;
    combiner.combine_all(&mut scene).unwrap();
    assert_eq!(combiner.stats().new_triangles, 48);
}

#[test]
fn test_combiners_share_a_manager() {
    let (mut scene, nodes) = random_scene(40, 5);
    let manager = multi_threaded(2, true);

    let mut first = combiner_for(&manager, 10);
    first.settings.search_options.parent_nodes = nodes[..20].to_vec();
    let mut second = combiner_for(&manager, 10);
    second.settings.search_options.parent_nodes = nodes[20..].to_vec();

    first.combine_all(&mut scene).unwrap();
    second.combine_all(&mut scene).unwrap();

    assert_eq!(first.found().objects.len(), 20);
    assert_eq!(second.found().objects.len(), 20);
    assert_eq!(first.stats().new_triangles + second.stats().new_triangles, 480);

    let mut per_node: HashMap<NodeId, usize> = HashMap::new();
    for object in first.combined_objects().iter().chain(second.combined_objects()) {
        for &source in &object.sources {
            *per_node.entry(source).or_default() += 1;
        }
    }
    assert_eq!(per_node.len(), 40);
    assert!(manager.metrics().jobs_completed > 0);
}
