//! Mesh Combine Studio
//!
//! Cell based mesh combining for static scenery and dynamic objects, with a
//! threaded job engine. This crate re-exports the workspace crates and adds
//! a [`session::CombineSession`] that owns a scene and a combiner.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mesh_combine_studio::session::CombineSession;
//!
//! let mut session = CombineSession::open("scene.yaml", Some("settings.yaml"))?;
//! let report = session.combine()?;
//! println!(
//!     "{} draw calls -> {}",
//!     report.stats.original_draw_calls, report.stats.new_draw_calls
//! );
//! session.save_meshes("combined")?;
//!
//! # Ok::<(), mesh_combine_studio::StudioError>(())
//! ```

// Re-export from the workspace crates
pub use mesh_combine_core::{
    Bounds, CoreError, LayerMask, LodGroup, Mat4, Mesh, MeshId, MeshRenderer, NodeId, Quat,
    Scene, SceneNode, ShadowCastingMode, StaticEditorFlags, SubMesh, Transform, Vec2, Vec3,
};
pub use mesh_combine_engine::{
    BatchingPolicyProvider, CombineError, CombineJobMode, CombineMode, CombineStats,
    CombinedObject, InMemoryBatchingPolicy, JobManagerStatus, JobSettings, MeshCombineJobManager,
    MeshCombiner, MeshCombinerSettings, SearchResult,
};
pub use mesh_combine_yaml::{
    YamlError, YamlLoader, load_scene, load_settings, save_scene, save_settings,
};

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Errors raised by a combine session
#[derive(Error, Debug)]
pub enum StudioError {
    #[error(transparent)]
    Yaml(#[from] YamlError),

    #[error(transparent)]
    Combine(#[from] CombineError),
}

/// A scene and its combiner
pub mod session {
    use crate::Result;
    use mesh_combine_core::Scene;
    use mesh_combine_engine::{
        CombineJobMode, CombineMetricsStats, CombineStats, FoundCombineConditions, JobFailure,
        JobManagerStatus, MeshCombineJobManager, MeshCombiner, MeshCombinerSettings,
        SearchNotice, SettingsAdjustment,
    };
    use mesh_combine_yaml::{YamlLoader, save_scene};
    use serde::Serialize;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tracing::info;

    /// What a search found
    #[derive(Debug, Clone, Serialize)]
    pub struct SearchReport {
        pub objects: usize,
        pub lod_groups: usize,
        pub unreadable_meshes: usize,
        pub cells: usize,
        pub groups: usize,
        pub conditions: FoundCombineConditions,
        pub notices: Vec<SearchNotice>,
        pub adjustments: Vec<SettingsAdjustment>,
    }

    /// What a combine produced
    #[derive(Debug, Clone, Serialize)]
    pub struct CombineReport {
        pub jobs: usize,
        pub combined_meshes: usize,
        pub stats: CombineStats,
        pub failures: Vec<JobFailure>,
        pub status: JobManagerStatus,
        pub metrics: CombineMetricsStats,
    }

    /// Owns a scene and the combiner working on it
    #[derive(Debug)]
    pub struct CombineSession {
        scene: Scene,
        combiner: MeshCombiner,
        scene_path: Option<PathBuf>,
    }

    impl CombineSession {
        /// Create a session with its own job manager
        pub fn new(scene: Scene, settings: MeshCombinerSettings) -> Self {
            let manager = Arc::new(MeshCombineJobManager::new(settings.job_settings.clone()));
            Self::with_manager(scene, settings, manager)
        }

        /// Create a session on a shared job manager
        pub fn with_manager(
            scene: Scene,
            settings: MeshCombinerSettings,
            manager: Arc<MeshCombineJobManager>,
        ) -> Self {
            let combiner = MeshCombiner::new("combiner", manager).with_settings(settings);
            Self {
                scene,
                combiner,
                scene_path: None,
            }
        }

        /// Load a scene file and an optional settings file
        pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
            scene_path: P,
            settings_path: Option<Q>,
        ) -> Result<Self> {
            let loader = YamlLoader::new();
            let scene = loader.load_scene(&scene_path)?;
            let settings = match settings_path {
                Some(path) => loader.load_settings(path)?,
                None => MeshCombinerSettings::default(),
            };
            let mut session = Self::new(scene, settings);
            session.scene_path = Some(scene_path.as_ref().to_path_buf());
            Ok(session)
        }

        pub fn scene(&self) -> &Scene {
            &self.scene
        }

        pub fn scene_mut(&mut self) -> &mut Scene {
            &mut self.scene
        }

        pub fn scene_path(&self) -> Option<&Path> {
            self.scene_path.as_deref()
        }

        pub fn combiner(&self) -> &MeshCombiner {
            &self.combiner
        }

        pub fn combiner_mut(&mut self) -> &mut MeshCombiner {
            &mut self.combiner
        }

        /// Run a search without combining
        pub fn search(&mut self) -> SearchReport {
            self.combiner.search(&self.scene);
            let found = self.combiner.found();
            SearchReport {
                objects: found.objects.len(),
                lod_groups: found.lod_groups.len(),
                unreadable_meshes: found.unreadable_meshes.len(),
                cells: self.combiner.cell_index().cell_count(),
                groups: self.combiner.cell_index().group_count(),
                conditions: self.combiner.found_combine_conditions().clone(),
                notices: found.notices.clone(),
                adjustments: self.combiner.settings_adjustments().to_vec(),
            }
        }

        /// Combine and wait for every job
        ///
        /// In per-frame mode the session plays the host and calls
        /// `update` in a loop.
        pub fn combine(&mut self) -> Result<CombineReport> {
            let jobs = self.combiner.combine_all(&mut self.scene)?;
            if self.combiner.settings.job_settings.combine_job_mode == CombineJobMode::CombinePerFrame {
                let mut frames = 0usize;
                while self.combiner.is_combining() {
                    if self.combiner.update(&mut self.scene) == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                    frames += 1;
                }
                info!(frames, "per frame combine finished");
            }
            Ok(self.report(jobs))
        }

        fn report(&self, jobs: usize) -> CombineReport {
            CombineReport {
                jobs,
                combined_meshes: self.combiner.combined_objects().len(),
                stats: self.combiner.stats().clone(),
                failures: self.combiner.failures().to_vec(),
                status: self.combiner.job_status(),
                metrics: self.combiner.manager().metrics(),
            }
        }

        /// Switch the original renderers back on
        pub fn restore(&mut self) -> usize {
            self.combiner.restore_originals(&mut self.scene)
        }

        /// Drop every combined result and zero the job metrics
        pub fn reset(&mut self) {
            self.combiner.reset(&mut self.scene);
            self.combiner.manager().reset_metrics();
        }

        /// Write combined meshes as OBJ files
        pub fn save_meshes<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
            Ok(self.combiner.save_combined_meshes(dir.as_ref())?)
        }

        /// Write the scene, with its renderer states, to a YAML file
        pub fn save_scene<P: AsRef<Path>>(&self, path: P) -> Result<()> {
            save_scene(path, &self.scene)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::session::CombineSession;
    use super::*;

    #[test]
    fn test_session_combine() {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
        for x in [1.0, 2.0, 40.0] {
            let mut node = SceneNode::new("cube");
            node.static_flags = StaticEditorFlags::all();
            node.transform = Transform::from_position(Vec3::new(x, 1.0, 1.0));
            node.renderer = Some(MeshRenderer::new(cube, "stone"));
            scene.add_node(node, None);
        }
        let mut settings = MeshCombinerSettings::default();
        settings.job_settings.use_multi_threading = false;
        let mut session = CombineSession::new(scene, settings);

        let found = session.search();
        assert_eq!(found.objects, 3);
        assert_eq!(found.cells, 2);

        let report = session.combine().unwrap();
        assert_eq!(report.jobs, 2);
        assert_eq!(report.combined_meshes, 2);
        assert_eq!(report.stats.new_draw_calls, 2);
        assert_eq!(session.restore(), 3);
    }

    #[test]
    fn test_session_reset_clears_metrics() {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::cube("cube", 1.0));
        let mut node = SceneNode::new("cube");
        node.static_flags = StaticEditorFlags::all();
        node.renderer = Some(MeshRenderer::new(cube, "stone"));
        scene.add_node(node, None);
        let mut settings = MeshCombinerSettings::default();
        settings.job_settings.use_multi_threading = false;
        let mut session = CombineSession::new(scene, settings);

        let report = session.combine().unwrap();
        assert_eq!(report.metrics.jobs_completed, 1);
        session.reset();
        assert!(session.combiner().combined_objects().is_empty());
        assert_eq!(session.combiner().manager().metrics().jobs_completed, 0);
        assert!(session.scene().nodes[0].renderer.as_ref().unwrap().enabled);
    }
}
