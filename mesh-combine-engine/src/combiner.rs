//! Mesh combiner
//!
//! Owns one combine configuration and the results it produced. Searching,
//! grouping and result bookkeeping happen here; the merging itself runs on
//! a shared [`MeshCombineJobManager`].

use crate::batching::{self, BatchingPolicyProvider};
use crate::cells::{CellIndex, GroupScope, LodSlot};
use crate::conditions::{FoundCombineConditions, OutputAttributes};
use crate::error::{CombineError, Result};
use crate::export::{file_safe_name, save_obj};
use crate::jobs::{JobFailure, JobManagerStatus, JobOutcome, MeshCombineJob, MeshCombineJobManager};
use crate::merge::{MergeOutput, MergeSettings, MergeSource, OverlapVolumes, SurfaceIndex};
use crate::search::{self, SearchNotice, SearchResult};
use crate::settings::{CombineJobMode, MeshCombinerSettings, OutputSettings, SettingsAdjustment};
use indexmap::IndexSet;
use mesh_combine_core::{Bounds, CoreError, Mesh, NodeId, Scene, ShadowCastingMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Draw call, vertex and triangle counts before and after combining
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombineStats {
    pub original_draw_calls: usize,
    pub original_vertices: usize,
    pub original_triangles: usize,
    pub new_draw_calls: usize,
    pub new_vertices: usize,
    pub new_triangles: usize,
    /// Wall time of the last combine, from `combine_all` to the last result
    pub combine_duration: Duration,
    pub failed_jobs: usize,
}

impl CombineStats {
    /// Fraction of draw calls saved, 0 when nothing was combined
    pub fn draw_call_reduction(&self) -> f64 {
        if self.original_draw_calls == 0 || self.new_draw_calls == 0 {
            0.0
        } else {
            1.0 - self.new_draw_calls as f64 / self.original_draw_calls as f64
        }
    }

    fn clear_output(&mut self) {
        self.new_draw_calls = 0;
        self.new_vertices = 0;
        self.new_triangles = 0;
        self.combine_duration = Duration::ZERO;
        self.failed_jobs = 0;
    }
}

/// Per level bookkeeping of LOD groups sharing a level count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodLevelStats {
    pub found_objects: usize,
    pub combined_meshes: usize,
}

/// LOD groups with the same number of levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodParentHolder {
    pub lod_count: usize,
    pub lod_groups: usize,
    pub levels: Vec<LodLevelStats>,
}

impl LodParentHolder {
    fn new(lod_count: usize) -> Self {
        Self {
            lod_count,
            lod_groups: 0,
            levels: vec![LodLevelStats::default(); lod_count],
        }
    }
}

/// How a combined mesh gets its baked lighting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightmapBake {
    /// Left to the next bake
    None,
    /// Keeps the lightmap index shared by its sources
    Copied,
    /// Flagged for a fresh bake at this lightmap scale
    Rebake { scale_in_lightmap: f32 },
}

impl LightmapBake {
    fn from_settings(settings: &OutputSettings) -> Self {
        if settings.copy_baked_lighting {
            Self::Copied
        } else if settings.rebake_lighting {
            Self::Rebake {
                scale_in_lightmap: settings.scale_in_lightmap,
            }
        } else {
            Self::None
        }
    }
}

/// One mesh produced by a combine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedObject {
    pub name: String,
    pub mesh: Mesh,
    pub attributes: OutputAttributes,
    pub scope: GroupScope,
    pub lod: Option<LodSlot>,
    /// World bounds of the mesh
    pub bounds: Bounds,
    pub has_collider: bool,
    pub lightmap: LightmapBake,
    /// Whether this object is rendered instead of its sources
    pub active: bool,
    /// Nodes whose geometry ended up in this mesh
    pub sources: Vec<NodeId>,
}

/// Progress of the running combine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombineProgress {
    pub total_jobs: usize,
    pub finished_jobs: usize,
}

impl CombineProgress {
    pub fn fraction(&self) -> f32 {
        if self.total_jobs == 0 {
            1.0
        } else {
            self.finished_jobs as f32 / self.total_jobs as f32
        }
    }
}

/// Searches a scene and combines what it finds
#[derive(Debug)]
pub struct MeshCombiner {
    name: String,
    node: Option<NodeId>,
    pub settings: MeshCombinerSettings,
    manager: Arc<MeshCombineJobManager>,

    found: SearchResult,
    cells: CellIndex,
    adjustments: Vec<SettingsAdjustment>,
    lod_parent_holders: Vec<LodParentHolder>,

    combined_objects: Vec<CombinedObject>,
    /// Nodes whose renderers were switched off by combining
    source_nodes: IndexSet<NodeId>,
    /// Nodes that fed a failed job; never switched off
    failed_nodes: IndexSet<NodeId>,
    originals_active: bool,
    failures: Vec<JobFailure>,

    generation: Option<u64>,
    total_jobs: usize,
    finished_jobs: usize,
    started: Option<Instant>,
    stats: CombineStats,
    combined: bool,
}

impl MeshCombiner {
    pub fn new(name: impl Into<String>, manager: Arc<MeshCombineJobManager>) -> Self {
        Self {
            name: name.into(),
            node: None,
            settings: MeshCombinerSettings::default(),
            manager,
            found: SearchResult::default(),
            cells: CellIndex::default(),
            adjustments: Vec::new(),
            lod_parent_holders: Vec::new(),
            combined_objects: Vec::new(),
            source_nodes: IndexSet::new(),
            failed_nodes: IndexSet::new(),
            originals_active: true,
            failures: Vec::new(),
            generation: None,
            total_jobs: 0,
            finished_jobs: 0,
            started: None,
            stats: CombineStats::default(),
            combined: false,
        }
    }

    /// Attach the combiner to a scene node, which is never searched
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_settings(mut self, settings: MeshCombinerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn manager(&self) -> &Arc<MeshCombineJobManager> {
        &self.manager
    }

    /// Find candidates and group them into cells
    ///
    /// Settings are sanitized in place first; the adjustments are kept in
    /// [`settings_adjustments`](Self::settings_adjustments).
    #[instrument(skip(self, scene), fields(combiner = %self.name))]
    pub fn search(&mut self, scene: &Scene) -> &SearchResult {
        self.adjustments = self.settings.sanitize(self.manager.cores());

        let found = search::search(scene, &self.settings, self.node);
        self.cells = CellIndex::build(scene, &found, &self.settings);
        self.lod_parent_holders = lod_parent_holders(&found);
        self.found = found;
        self.count_originals(scene);

        info!(
            objects = self.found.objects.len(),
            lod_groups = self.found.lod_groups.len(),
            unreadable = self.found.unreadable_meshes.len(),
            cells = self.cells.cell_count(),
            groups = self.cells.group_count(),
            "search finished"
        );
        &self.found
    }

    fn count_originals(&mut self, scene: &Scene) {
        let mut draw_calls = 0;
        let mut vertices = 0;
        let mut triangles = 0;
        for group in self.cells.groups() {
            draw_calls += group.entries.len();
        }
        let objects = self
            .found
            .objects
            .iter()
            .chain(self.found.lod_groups.iter().flat_map(|g| g.levels.iter().flatten()));
        for object in objects {
            if let Some(mesh) = scene.mesh(object.mesh) {
                vertices += mesh.vertex_count();
                triangles += mesh.triangle_count();
            }
        }
        self.stats.original_draw_calls = draw_calls;
        self.stats.original_vertices = vertices;
        self.stats.original_triangles = triangles;
    }

    /// Combine everything the search finds
    ///
    /// Previous results are reset first. In `CombineAtOnce` mode this
    /// returns after every job has been applied; in `CombinePerFrame` mode
    /// the host drives the combine by calling [`update`](Self::update).
    /// Returns the number of jobs created.
    #[instrument(skip(self, scene), fields(combiner = %self.name))]
    pub fn combine_all(&mut self, scene: &mut Scene) -> Result<usize> {
        self.reset(scene);
        self.search(scene);
        if !self.cells.contains_objects() {
            warn!("no matching objects found, nothing to combine");
            return Ok(0);
        }

        if self.manager.job_settings() != self.settings.job_settings {
            self.manager.set_job_settings(self.settings.job_settings.clone());
        }

        let generation = self.manager.begin_generation()?;
        let jobs = match self.build_jobs(scene, generation) {
            Ok(jobs) => jobs,
            Err(e) => {
                self.manager.abort(generation);
                return Err(e);
            }
        };
        let count = jobs.len();
        self.manager.enqueue(jobs)?;

        self.generation = Some(generation);
        self.total_jobs = count;
        self.finished_jobs = 0;
        self.started = Some(Instant::now());
        self.originals_active = false;
        info!(generation, jobs = count, "combine started");

        if self.manager.job_settings().combine_job_mode == CombineJobMode::CombineAtOnce {
            self.manager.run_generation(generation);
            self.update(scene);
        }
        Ok(count)
    }

    fn build_jobs(&self, scene: &Scene, generation: u64) -> Result<Vec<MeshCombineJob>> {
        let output = &self.settings.output;
        let surface = output.remove_triangles_below_surface.then(|| {
            Arc::new(SurfaceIndex::build(
                scene,
                output.surface_layer_mask,
                output.no_colliders,
                output.max_surface_height,
            ))
        });
        let overlap = output
            .remove_overlapping_triangles
            .then(|| Arc::new(OverlapVolumes::build(scene, output.overlap_layer_mask)));
        let merge_settings = Arc::new(MergeSettings::from_output(output, surface, overlap));
        let cache = self.manager.mesh_cache();
        let metrics = self.manager.combine_metrics();

        let mut jobs = Vec::with_capacity(self.cells.group_count());
        for group in self.cells.groups() {
            let mut sources = Vec::with_capacity(group.entries.len());
            for entry in &group.entries {
                let mesh = scene
                    .mesh(entry.mesh)
                    .ok_or(CoreError::MeshNotFound(entry.mesh.0))?;
                if !mesh.is_readable {
                    return Err(CombineError::mesh_unavailable(&mesh.name, "mesh is not readable"));
                }
                sources.push(MergeSource {
                    node: entry.node,
                    mesh: cache.get_or_insert(entry.mesh, mesh, metrics),
                    sub_mesh: entry.sub_mesh,
                    world: scene.world_matrix(entry.node),
                });
            }

            let key = &group.key;
            let name = match key.lod {
                Some(slot) => format!("{}_{}_lod{}", self.name, key.scope, slot.level),
                None => format!("{}_{}", self.name, key.scope),
            };
            jobs.push(MeshCombineJob {
                id: self.manager.next_job_id(),
                generation,
                name,
                scope: key.scope,
                lod: key.lod,
                output: group.output.clone(),
                sources,
                settings: Arc::clone(&merge_settings),
            });
        }
        Ok(jobs)
    }

    /// Apply finished jobs
    ///
    /// In `CombinePerFrame` mode this also dispatches the next batch of
    /// jobs, so the host calls it once per frame. Returns the number of
    /// outcomes applied.
    pub fn update(&mut self, scene: &mut Scene) -> usize {
        let Some(generation) = self.generation else {
            return 0;
        };
        if self.manager.job_settings().combine_job_mode == CombineJobMode::CombinePerFrame {
            self.manager.tick();
        }

        let outcomes = self.manager.take_completed(generation);
        let applied = outcomes.len();
        for outcome in outcomes {
            self.apply(scene, outcome);
        }

        if self.manager.outstanding(generation) == 0 {
            self.manager.release(generation);
            self.finish();
        }
        applied
    }

    fn apply(&mut self, scene: &mut Scene, outcome: JobOutcome) {
        self.finished_jobs += 1;
        let JobOutcome {
            header,
            worker,
            duration,
            result,
        } = outcome;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(job = header.id, name = %header.name, "combine job failed: {}", e);
                self.stats.failed_jobs += 1;
                self.failures.push(JobFailure::new(&header, worker, e.to_string()));
                for &node in &header.source_nodes {
                    self.failed_nodes.insert(node);
                    if self.source_nodes.shift_remove(&node) {
                        set_renderer_enabled(scene, node, true);
                    }
                }
                return;
            }
        };

        debug!(
            job = header.id,
            meshes = output.meshes.len(),
            vertices_in = output.vertices_in,
            vertices_out = output.vertices_out(),
            overlapping_removed = output.overlapping_removed,
            ?duration,
            "applying combine job"
        );
        let attributes = self.output_attributes(&header.output, &output);
        let settings = &self.settings.output;
        let lightmap = LightmapBake::from_settings(settings);
        for (i, buffer) in output.meshes.iter().enumerate() {
            if buffer.triangle_count() == 0 {
                continue;
            }
            let mut mesh = buffer.to_mesh(format!("{}_{}", header.name, i));
            mesh.is_readable = !settings.make_meshes_unreadable;
            let bounds = buffer.bounds();
            let has_collider = settings.add_mesh_colliders
                && (!settings.add_mesh_colliders_in_range
                    || bounds.intersects(&settings.add_mesh_colliders_bounds));

            self.stats.new_draw_calls += 1;
            self.stats.new_vertices += mesh.vertex_count();
            self.stats.new_triangles += mesh.triangle_count();
            if let Some(slot) = header.lod {
                if let Some(level) = self
                    .lod_parent_holders
                    .iter_mut()
                    .find(|h| h.lod_count == slot.lod_count)
                    .and_then(|h| h.levels.get_mut(slot.level))
                {
                    level.combined_meshes += 1;
                }
            }
            self.combined_objects.push(CombinedObject {
                name: mesh.name.clone(),
                mesh,
                attributes: attributes.clone(),
                scope: header.scope,
                lod: header.lod,
                bounds,
                has_collider,
                lightmap,
                active: true,
                sources: buffer.sources.clone(),
            });
        }
        // Buffers return to the pool here.
        drop(output);

        for &node in &header.source_nodes {
            if self.failed_nodes.contains(&node) {
                continue;
            }
            if self.source_nodes.insert(node) {
                set_renderer_enabled(scene, node, false);
            }
        }
    }

    fn output_attributes(&self, resolved: &OutputAttributes, output: &MergeOutput) -> OutputAttributes {
        let mut attributes = resolved.clone();
        if self.settings.output.two_sided_shadows
            && output.back_faces_removed > 0
            && attributes.shadow_casting_mode != ShadowCastingMode::Off
        {
            attributes.shadow_casting_mode = ShadowCastingMode::TwoSided;
        }
        attributes
    }

    fn finish(&mut self) {
        self.generation = None;
        self.combined = true;
        if let Some(started) = self.started.take() {
            self.stats.combine_duration = started.elapsed();
        }
        info!(
            meshes = self.combined_objects.len(),
            draw_calls = self.stats.new_draw_calls,
            original_draw_calls = self.stats.original_draw_calls,
            failed = self.stats.failed_jobs,
            duration = ?self.stats.combine_duration,
            "combine finished"
        );
    }

    /// Stop the running combine
    ///
    /// Jobs not applied yet are dropped; results already applied stay.
    /// Returns the number of jobs dropped.
    #[instrument(skip(self), fields(combiner = %self.name))]
    pub fn abort_and_clear(&mut self) -> usize {
        let Some(generation) = self.generation.take() else {
            return 0;
        };
        let dropped = self.manager.abort(generation);
        self.combined = !self.combined_objects.is_empty();
        if let Some(started) = self.started.take() {
            self.stats.combine_duration = started.elapsed();
        }
        info!(dropped, applied = self.finished_jobs, "combine aborted");
        dropped
    }

    /// Switch the source renderers back on and hide the combined meshes
    ///
    /// Returns the number of renderers switched on.
    #[instrument(skip(self, scene), fields(combiner = %self.name))]
    pub fn restore_originals(&mut self, scene: &mut Scene) -> usize {
        let mut restored = 0;
        for &node in &self.source_nodes {
            if set_renderer_enabled(scene, node, true) {
                restored += 1;
            }
        }
        for object in &mut self.combined_objects {
            object.active = false;
        }
        self.originals_active = true;
        if restored > 0 {
            info!(restored, "original renderers restored");
        }
        restored
    }

    /// Undo [`restore_originals`](Self::restore_originals)
    ///
    /// Returns the number of renderers switched off.
    pub fn show_combined(&mut self, scene: &mut Scene) -> usize {
        if !self.combined {
            return 0;
        }
        let mut hidden = 0;
        for &node in &self.source_nodes {
            if set_renderer_enabled(scene, node, false) {
                hidden += 1;
            }
        }
        for object in &mut self.combined_objects {
            object.active = true;
        }
        self.originals_active = false;
        hidden
    }

    /// Drop every result and restore the scene to its state before combining
    #[instrument(skip(self, scene), fields(combiner = %self.name))]
    pub fn reset(&mut self, scene: &mut Scene) {
        self.abort_and_clear();
        self.restore_originals(scene);
        self.combined_objects.clear();
        self.source_nodes.clear();
        self.failed_nodes.clear();
        self.failures.clear();
        self.total_jobs = 0;
        self.finished_jobs = 0;
        self.stats.clear_output();
        for holder in &mut self.lod_parent_holders {
            for level in &mut holder.levels {
                level.combined_meshes = 0;
            }
        }
        self.combined = false;
        self.originals_active = true;
    }

    /// Write every combined mesh as an OBJ file into `dir`
    ///
    /// Files are named `<combiner>_<index>_<scope>.obj`. Returns the written
    /// paths.
    #[instrument(skip(self, dir), fields(combiner = %self.name))]
    pub fn save_combined_meshes(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.combined_objects.len());
        for (index, object) in self.combined_objects.iter().enumerate() {
            let file_name = format!(
                "{}_{}_{}.obj",
                file_safe_name(&self.name),
                index,
                object.scope
            );
            let path = dir.join(file_name);
            save_obj(&path, &object.mesh)?;
            written.push(path);
        }
        info!(files = written.len(), dir = %dir.display(), "combined meshes saved");
        Ok(written)
    }

    /// Turn off host static batching, which fights combined meshes
    pub fn resolve_batching_conflicts(&self, provider: &mut dyn BatchingPolicyProvider) -> Option<String> {
        batching::resolve_batching_conflicts(provider)
    }

    pub fn found(&self) -> &SearchResult {
        &self.found
    }

    pub fn search_notices(&self) -> &[SearchNotice] {
        &self.found.notices
    }

    pub fn settings_adjustments(&self) -> &[SettingsAdjustment] {
        &self.adjustments
    }

    pub fn cell_index(&self) -> &CellIndex {
        &self.cells
    }

    pub fn found_combine_conditions(&self) -> &FoundCombineConditions {
        self.cells.found_combine_conditions()
    }

    pub fn cells_contain_objects(&self) -> bool {
        self.cells.contains_objects()
    }

    pub fn lod_parent_holders(&self) -> &[LodParentHolder] {
        &self.lod_parent_holders
    }

    pub fn combined_objects(&self) -> &[CombinedObject] {
        &self.combined_objects
    }

    /// Nodes whose renderers the combine switched off
    pub fn source_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.source_nodes.iter().copied()
    }

    pub fn failures(&self) -> &[JobFailure] {
        &self.failures
    }

    pub fn stats(&self) -> &CombineStats {
        &self.stats
    }

    pub fn is_combined(&self) -> bool {
        self.combined
    }

    pub fn is_combining(&self) -> bool {
        self.generation.is_some()
    }

    pub fn originals_active(&self) -> bool {
        self.originals_active
    }

    pub fn progress(&self) -> CombineProgress {
        CombineProgress {
            total_jobs: self.total_jobs,
            finished_jobs: self.finished_jobs,
        }
    }

    pub fn job_status(&self) -> JobManagerStatus {
        self.manager.status()
    }
}

impl Drop for MeshCombiner {
    fn drop(&mut self) {
        if let Some(generation) = self.generation.take() {
            self.manager.abort(generation);
        }
    }
}

fn lod_parent_holders(found: &SearchResult) -> Vec<LodParentHolder> {
    let mut holders: Vec<LodParentHolder> = Vec::new();
    for group in &found.lod_groups {
        let lod_count = group.lod_count();
        let index = match holders.iter().position(|h| h.lod_count == lod_count) {
            Some(index) => index,
            None => {
                holders.push(LodParentHolder::new(lod_count));
                holders.len() - 1
            }
        };
        let holder = &mut holders[index];
        holder.lod_groups += 1;
        for (level, objects) in group.levels.iter().enumerate() {
            holder.levels[level].found_objects += objects.len();
        }
    }
    holders.sort_by_key(|h| h.lod_count);
    holders
}

/// Returns true if the renderer's state changed
fn set_renderer_enabled(scene: &mut Scene, node: NodeId, enabled: bool) -> bool {
    match scene.node_mut(node).and_then(|n| n.renderer.as_mut()) {
        Some(renderer) if renderer.enabled != enabled => {
            renderer.enabled = enabled;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::InMemoryBatchingPolicy;
    use crate::settings::JobSettings;
    use mesh_combine_core::{LodGroup, MeshRenderer, SceneNode, StaticEditorFlags, Transform, Vec3};

    fn manager() -> Arc<MeshCombineJobManager> {
        let settings = JobSettings {
            use_multi_threading: false,
            ..JobSettings::default()
        };
        Arc::new(MeshCombineJobManager::with_cores(settings, 2))
    }

    fn combiner(manager: &Arc<MeshCombineJobManager>) -> MeshCombiner {
        let mut combiner = MeshCombiner::new("test", Arc::clone(manager));
        combiner.settings.output.cell_size = 10;
        combiner.settings.job_settings = manager.job_settings();
        combiner
    }

    fn add_cube(scene: &mut Scene, position: Vec3, material: &str) -> NodeId {
        let mesh = scene.add_mesh(Mesh::cube("cube", 1.0));
        let mut node = SceneNode::new("cube");
        node.static_flags = StaticEditorFlags::all();
        node.transform = Transform::from_position(position);
        node.renderer = Some(MeshRenderer::new(mesh, material));
        scene.add_node(node, None)
    }

    fn renderer_enabled(scene: &Scene, node: NodeId) -> bool {
        scene.node(node).and_then(|n| n.renderer.as_ref()).is_some_and(|r| r.enabled)
    }

    #[test]
    fn test_combine_and_restore() {
        let manager = manager();
        let mut scene = Scene::new();
        let a = add_cube(&mut scene, Vec3::new(1.0, 1.0, 1.0), "stone");
        let b = add_cube(&mut scene, Vec3::new(3.0, 1.0, 1.0), "stone");
        let c = add_cube(&mut scene, Vec3::new(25.0, 1.0, 1.0), "stone");

        let mut combiner = combiner(&manager);
        let jobs = combiner.combine_all(&mut scene).unwrap();
        assert_eq!(jobs, 2);
        assert!(combiner.is_combined());
        assert!(!combiner.is_combining());
        assert_eq!(combiner.combined_objects().len(), 2);
        assert_eq!(combiner.stats().original_draw_calls, 3);
        assert_eq!(combiner.stats().new_draw_calls, 2);
        assert_eq!(combiner.stats().new_vertices, 72);
        assert!(!renderer_enabled(&scene, a));
        assert!(!renderer_enabled(&scene, c));
        assert!(combiner.combined_objects().iter().all(|o| !o.mesh.is_readable));

        assert_eq!(combiner.restore_originals(&mut scene), 3);
        assert!(renderer_enabled(&scene, a));
        assert!(renderer_enabled(&scene, b));
        assert!(combiner.combined_objects().iter().all(|o| !o.active));

        assert_eq!(combiner.show_combined(&mut scene), 3);
        assert!(!renderer_enabled(&scene, b));
    }

    #[test]
    fn test_combine_twice_is_idempotent() {
        let manager = manager();
        let mut scene = Scene::new();
        for i in 0..6 {
            add_cube(&mut scene, Vec3::new(i as f32 * 4.0, 1.0, 1.0), "stone");
        }
        let mut combiner = combiner(&manager);
        combiner.combine_all(&mut scene).unwrap();
        let first: Vec<Mesh> = combiner.combined_objects().iter().map(|o| o.mesh.clone()).collect();
        let stats = combiner.stats().clone();

        combiner.combine_all(&mut scene).unwrap();
        let second: Vec<Mesh> = combiner.combined_objects().iter().map(|o| o.mesh.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(stats.new_draw_calls, combiner.stats().new_draw_calls);
    }

    #[test]
    fn test_per_frame_combine_and_abort() {
        let manager = manager();
        let mut scene = Scene::new();
        let nodes: Vec<NodeId> = (0..8)
            .map(|i| add_cube(&mut scene, Vec3::new(i as f32 * 10.0 + 1.0, 1.0, 1.0), "stone"))
            .collect();

        let mut combiner = combiner(&manager);
        combiner.settings.job_settings.combine_job_mode = CombineJobMode::CombinePerFrame;
        combiner.settings.job_settings.combine_meshes_per_frame = 2;
        assert_eq!(combiner.combine_all(&mut scene).unwrap(), 8);
        assert!(combiner.is_combining());

        assert_eq!(combiner.update(&mut scene), 2);
        assert_eq!(combiner.progress().finished_jobs, 2);
        let dropped = combiner.abort_and_clear();
        assert_eq!(dropped, 6);
        assert!(!combiner.is_combining());
        assert!(combiner.is_combined());
        assert_eq!(combiner.combined_objects().len(), 2);
        assert_eq!(nodes.iter().filter(|&&n| !renderer_enabled(&scene, n)).count(), 2);
        assert_eq!(combiner.update(&mut scene), 0);

        // A fresh combine after the abort sees every source again.
        combiner.settings.job_settings.combine_job_mode = CombineJobMode::CombineAtOnce;
        combiner.combine_all(&mut scene).unwrap();
        assert_eq!(combiner.combined_objects().len(), 8);
        assert!(nodes.iter().all(|&n| !renderer_enabled(&scene, n)));
    }

    #[test]
    fn test_reset_clears_results() {
        let manager = manager();
        let mut scene = Scene::new();
        let node = add_cube(&mut scene, Vec3::ONE, "stone");
        let mut combiner = combiner(&manager);
        combiner.combine_all(&mut scene).unwrap();
        combiner.reset(&mut scene);
        assert!(!combiner.is_combined());
        assert!(combiner.combined_objects().is_empty());
        assert_eq!(combiner.stats().new_draw_calls, 0);
        assert!(renderer_enabled(&scene, node));
    }

    #[test]
    fn test_nothing_to_combine() {
        let manager = manager();
        let mut scene = Scene::new();
        let mut combiner = combiner(&manager);
        assert_eq!(combiner.combine_all(&mut scene).unwrap(), 0);
        assert!(!combiner.is_combined());
    }

    #[test]
    fn test_lod_parent_holders() {
        let manager = manager();
        let mut scene = Scene::new();
        let root = scene.add_node(
            {
                let mut node = SceneNode::new("lod");
                node.static_flags = StaticEditorFlags::all();
                node
            },
            None,
        );
        let mut levels = Vec::new();
        for level in 0..3 {
            let mesh = scene.add_mesh(Mesh::cube(format!("lod{level}"), 1.0));
            let mut child = SceneNode::new(format!("lod{level}"));
            child.static_flags = StaticEditorFlags::all();
            child.renderer = Some(MeshRenderer::new(mesh, "stone"));
            levels.push(vec![scene.add_node(child, Some(root))]);
        }
        if let Some(node) = scene.node_mut(root) {
            node.lod_group = Some(LodGroup { levels });
        }

        let mut combiner = combiner(&manager);
        combiner.combine_all(&mut scene).unwrap();
        let holders = combiner.lod_parent_holders();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].lod_count, 3);
        assert_eq!(holders[0].lod_groups, 1);
        assert!(holders[0].levels.iter().all(|l| l.found_objects == 1 && l.combined_meshes == 1));
        assert!(combiner.combined_objects().iter().all(|o| o.lod.is_some()));
    }

    #[test]
    fn test_back_face_removal_makes_shadows_two_sided() {
        let manager = manager();
        let mut scene = Scene::new();
        add_cube(&mut scene, Vec3::ONE, "stone");
        let mut combiner = combiner(&manager);
        combiner.settings.output.remove_back_face_triangles = true;
        combiner.settings.output.back_face_triangle_mode = crate::settings::BackFaceTriangleMode::Direction;
        combiner.settings.output.back_face_direction = Vec3::Y;
        combiner.combine_all(&mut scene).unwrap();

        let object = &combiner.combined_objects()[0];
        assert_eq!(object.mesh.triangle_count(), 10);
        assert_eq!(object.attributes.shadow_casting_mode, ShadowCastingMode::TwoSided);
    }

    #[test]
    fn test_colliders_in_range() {
        let manager = manager();
        let mut scene = Scene::new();
        add_cube(&mut scene, Vec3::ONE, "stone");
        add_cube(&mut scene, Vec3::new(95.0, 1.0, 1.0), "stone");
        let mut combiner = combiner(&manager);
        combiner.settings.output.add_mesh_colliders = true;
        combiner.settings.output.add_mesh_colliders_in_range = true;
        combiner.settings.output.add_mesh_colliders_bounds = Bounds::new(Vec3::ZERO, Vec3::splat(20.0));
        combiner.combine_all(&mut scene).unwrap();

        let with_collider: Vec<bool> = combiner.combined_objects().iter().map(|o| o.has_collider).collect();
        assert_eq!(with_collider, vec![true, false]);
    }

    #[test]
    fn test_lightmap_bake_follows_settings() {
        let manager = manager();
        let mut scene = Scene::new();
        add_cube(&mut scene, Vec3::ONE, "stone");
        let mut combiner = combiner(&manager);
        combiner.combine_all(&mut scene).unwrap();
        assert_eq!(combiner.combined_objects()[0].lightmap, LightmapBake::None);

        combiner.settings.output.rebake_lighting = true;
        combiner.settings.output.scale_in_lightmap = 0.5;
        combiner.combine_all(&mut scene).unwrap();
        assert_eq!(
            combiner.combined_objects()[0].lightmap,
            LightmapBake::Rebake { scale_in_lightmap: 0.5 }
        );

        combiner.settings.output.rebake_lighting = false;
        combiner.settings.output.copy_baked_lighting = true;
        combiner.combine_all(&mut scene).unwrap();
        assert_eq!(combiner.combined_objects()[0].lightmap, LightmapBake::Copied);
    }

    #[test]
    fn test_save_combined_meshes() {
        let manager = manager();
        let mut scene = Scene::new();
        add_cube(&mut scene, Vec3::ONE, "stone");
        let mut combiner = combiner(&manager);
        combiner.combine_all(&mut scene).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("meshes");
        let paths = combiner.save_combined_meshes(&out).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].file_name().and_then(|n| n.to_str()),
            Some("test_0_cell_0_0_0.obj")
        );
        assert!(paths[0].exists());
    }

    #[test]
    fn test_resolve_batching_conflicts() {
        let manager = manager();
        let combiner = combiner(&manager);
        let mut policy = InMemoryBatchingPolicy {
            static_batching: true,
            dynamic_batching: false,
        };
        assert!(combiner.resolve_batching_conflicts(&mut policy).is_some());
        assert!(!policy.static_batching);
    }
}
