//! Mesh Combine Engine
//!
//! This crate combines many small meshes of a scene into fewer, larger
//! meshes to save draw calls:
//! - Candidate search over a scene with a conjunction of filters
//! - Grouping by spatial cell (or dynamic object), LOD level and renderer
//!   attributes
//! - Merge passes: world transform, below-surface and back-face culling,
//!   vertex limit splitting and welding
//! - A job manager running merges on worker threads
//!
//! # Features
//!
//! - **Static and dynamic combining**: cells for static scenery, one group
//!   per marked object for moving parts
//! - **Per-frame combining**: spread the work over frames with
//!   [`MeshCombiner::update`]
//! - **Abort and restore**: stop a combine midway and bring the original
//!   renderers back
//! - **Metrics**: job, vertex and cache counters through
//!   [`MeshCombineJobManager::metrics`]
//!
//! # Example
//!
//! ```rust,no_run
//! use mesh_combine_engine::{JobSettings, MeshCombineJobManager, MeshCombiner};
//! use mesh_combine_core::Scene;
//! use std::sync::Arc;
//!
//! let mut scene = Scene::new();
//! // ... populate the scene ...
//!
//! let manager = Arc::new(MeshCombineJobManager::new(JobSettings::default()));
//! let mut combiner = MeshCombiner::new("combiner", manager);
//! combiner.settings.output.cell_size = 16;
//!
//! let jobs = combiner.combine_all(&mut scene)?;
//! println!("{} jobs, {} draw calls", jobs, combiner.stats().new_draw_calls);
//! combiner.save_combined_meshes(std::path::Path::new("combined"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod batching;
pub mod cells;
pub mod combiner;
pub mod conditions;
pub mod error;
pub mod export;
pub mod jobs;
pub mod merge;
pub mod performance;
pub mod search;
pub mod settings;

// Re-export main types
pub use batching::{BatchingPolicyProvider, InMemoryBatchingPolicy};
pub use cells::{CellIndex, CombineGroup, GroupScope, LodSlot, cell_key};
pub use combiner::{
    CombineProgress, CombineStats, CombinedObject, LightmapBake, LodLevelStats, LodParentHolder,
    MeshCombiner,
};
pub use conditions::{CombineConditionKey, FoundCombineConditions, OutputAttributes};
pub use error::{CombineError, ErrorSeverity, Result};
pub use export::{export_to_obj, save_obj};
pub use jobs::{
    JobFailure, JobManagerStatus, MeshCache, MeshCombineJob, MeshCombineJobManager, ThreadState,
};
pub use merge::{
    MergeOutput, MergeSettings, MeshBuffer, OverlapVolume, OverlapVolumes, SurfaceIndex, merge_group,
};
pub use performance::{CombineMetrics, CombineMetricsStats, MemoryPool, PerformanceTimer};
pub use search::{FoundLodGroup, FoundObject, SearchNotice, SearchResult, search};
pub use settings::{
    BackFaceTriangleMode, CombineConditionSettings, CombineJobMode, CombineMode,
    ComponentCondition, JobSettings, LodGroupSearchMode, MeshCombinerSettings, ObjectCenter,
    OutputSettings, SearchOptions, SettingsAdjustment, ThreadAmountMode,
};
