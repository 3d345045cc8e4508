//! Combiner configuration
//!
//! Plain data edited by the host: what to search, which renderer attributes
//! must match, how outputs are built and how jobs are scheduled. Everything
//! loads from YAML with missing fields falling back to defaults, so values
//! are checked by [`MeshCombinerSettings::sanitize`] before the engine uses
//! them.

use mesh_combine_core::math::clamp_min;
use mesh_combine_core::{
    Bounds, LayerMask, LightProbeUsage, MotionVectorGenerationMode, NodeId, ReceiveGi,
    ReflectionProbeUsage, ShadowCastingMode, StaticEditorFlags, UNTAGGED, Vec3,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Smallest search box edge
pub const MIN_SEARCH_BOX_SIZE: f32 = 0.01;
/// Smallest cell edge
pub const MIN_CELL_SIZE: i32 = 4;
/// Smallest weld snap size
pub const MIN_WELD_SNAP_SIZE: f32 = 0.00001;
/// Smallest edge of the backface and collider range boxes
pub const MIN_BOUNDS_SIZE: f32 = 0.001;
/// Upper bound for jobs dispatched per frame
pub const MAX_MESHES_PER_FRAME: usize = 128;

/// What a combiner groups by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CombineMode {
    /// Static objects grouped into spatial cells
    #[default]
    StaticObjects,
    /// Parts of one `MCSDynamicObject` hierarchy are combined together
    DynamicObjects,
}

/// Which point of an object decides its cell and search box membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectCenter {
    #[default]
    BoundsCenter,
    TransformPosition,
}

/// How LOD groups are searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LodGroupSearchMode {
    /// LOD groups are combined level by level as units
    #[default]
    LodGroup,
    /// LOD renderers are treated as plain renderers
    LodRenderers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComponentCondition {
    /// Every listed component must be present
    #[default]
    And,
    /// Any listed component suffices
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackFaceTriangleMode {
    /// The camera stays inside a box
    #[default]
    Box,
    /// The camera always looks along one direction
    Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineJobMode {
    /// Block until every job has finished
    #[default]
    CombineAtOnce,
    /// Dispatch a bounded number of jobs per host frame
    CombinePerFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadAmountMode {
    /// One worker per detected core
    #[default]
    Auto,
    /// `custom_thread_amount` workers
    Custom,
}

/// Filters selecting candidate renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Roots of the search; empty means the whole scene
    pub parent_nodes: Vec<NodeId>,
    pub object_center: ObjectCenter,
    pub lod_group_search_mode: LodGroupSearchMode,
    pub use_search_box: bool,
    pub search_box_pivot: Vec3,
    pub search_box_size: Vec3,
    /// Use the x size for every axis
    pub search_box_square: bool,
    pub only_active: bool,
    pub only_active_mesh_renderers: bool,
    pub only_static: bool,
    pub use_layer_mask: bool,
    pub layer_mask: LayerMask,
    pub use_tag: bool,
    pub tag: String,
    pub use_components_filter: bool,
    pub component_condition: ComponentCondition,
    pub component_names: Vec<String>,
    pub use_name_contains: bool,
    pub name_contains: Vec<String>,
    pub use_vertex_input_limit: bool,
    pub vertex_input_limit: usize,
    /// Skip objects whose largest axis exceeds `cell_size * factor`
    pub use_max_bounds_factor: bool,
    pub max_bounds_factor: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            parent_nodes: Vec::new(),
            object_center: ObjectCenter::BoundsCenter,
            lod_group_search_mode: LodGroupSearchMode::LodGroup,
            use_search_box: false,
            search_box_pivot: Vec3::ZERO,
            search_box_size: Vec3::splat(25.0),
            search_box_square: false,
            only_active: true,
            only_active_mesh_renderers: true,
            only_static: true,
            use_layer_mask: false,
            layer_mask: LayerMask::EVERYTHING,
            use_tag: false,
            tag: UNTAGGED.to_string(),
            use_components_filter: false,
            component_condition: ComponentCondition::And,
            component_names: Vec::new(),
            use_name_contains: false,
            name_contains: Vec::new(),
            use_vertex_input_limit: false,
            vertex_input_limit: 5000,
            use_max_bounds_factor: false,
            max_bounds_factor: 1.5,
        }
    }
}

impl SearchOptions {
    /// Effective search box, after the square option
    pub fn search_box(&self) -> Bounds {
        let size = if self.search_box_square {
            Vec3::splat(self.search_box_size.x)
        } else {
            self.search_box_size
        };
        Bounds::new(self.search_box_pivot, size)
    }

    fn sanitize(&mut self, notices: &mut Vec<SettingsAdjustment>) {
        let size = clamp_min(self.search_box_size, MIN_SEARCH_BOX_SIZE);
        if size != self.search_box_size {
            notices.push(SettingsAdjustment::new(
                "search_options.search_box_size",
                format!("raised {} to at least {}", self.search_box_size, MIN_SEARCH_BOX_SIZE),
            ));
            self.search_box_size = size;
        }
        if self.vertex_input_limit < 1 {
            notices.push(SettingsAdjustment::new(
                "search_options.vertex_input_limit",
                "raised 0 to 1",
            ));
            self.vertex_input_limit = 1;
        }
        if self.max_bounds_factor.is_nan() || self.max_bounds_factor < 1.0 {
            notices.push(SettingsAdjustment::new(
                "search_options.max_bounds_factor",
                format!("raised {} to 1", self.max_bounds_factor),
            ));
            self.max_bounds_factor = 1.0;
        }
    }
}

/// Which renderer attributes must match and what the others become
///
/// For each attribute, `same_*` keeps the source value and only merges
/// renderers that agree on it; otherwise every output gets the override
/// value next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConditionSettings {
    pub same_material: bool,
    pub material: String,
    pub same_shadow_casting_mode: bool,
    pub shadow_casting_mode: ShadowCastingMode,
    pub same_receive_shadows: bool,
    pub receive_shadows: bool,
    pub same_receive_gi: bool,
    pub receive_gi: ReceiveGi,
    pub same_light_probe_usage: bool,
    pub light_probe_usage: LightProbeUsage,
    pub same_reflection_probe_usage: bool,
    pub reflection_probe_usage: ReflectionProbeUsage,
    pub same_probe_anchor: bool,
    pub probe_anchor: Option<NodeId>,
    pub same_motion_vector_generation_mode: bool,
    pub motion_vector_generation_mode: MotionVectorGenerationMode,
    pub same_static_editor_flags: bool,
    pub static_editor_flags: StaticEditorFlags,
    pub same_layer: bool,
    pub layer: u8,
}

impl Default for CombineConditionSettings {
    fn default() -> Self {
        Self {
            same_material: true,
            material: "Default-Material".to_string(),
            same_shadow_casting_mode: true,
            shadow_casting_mode: ShadowCastingMode::On,
            same_receive_shadows: true,
            receive_shadows: true,
            same_receive_gi: false,
            receive_gi: ReceiveGi::Lightmaps,
            same_light_probe_usage: false,
            light_probe_usage: LightProbeUsage::BlendProbes,
            same_reflection_probe_usage: false,
            reflection_probe_usage: ReflectionProbeUsage::BlendProbes,
            same_probe_anchor: false,
            probe_anchor: None,
            same_motion_vector_generation_mode: false,
            motion_vector_generation_mode: MotionVectorGenerationMode::Object,
            same_static_editor_flags: true,
            static_editor_flags: StaticEditorFlags::all().without_batching(),
            same_layer: false,
            layer: 0,
        }
    }
}

impl CombineConditionSettings {
    fn sanitize(&mut self, notices: &mut Vec<SettingsAdjustment>) {
        if self
            .static_editor_flags
            .contains(StaticEditorFlags::BATCHING_STATIC)
        {
            notices.push(SettingsAdjustment::new(
                "combine_conditions.static_editor_flags",
                "removed BATCHING_STATIC, combined meshes are never statically batched",
            ));
            self.static_editor_flags = self.static_editor_flags.without_batching();
        }
        if self.layer >= mesh_combine_core::LAYER_COUNT {
            notices.push(SettingsAdjustment::new(
                "combine_conditions.layer",
                format!("layer {} does not exist, using 0", self.layer),
            ));
            self.layer = 0;
        }
    }
}

/// How combined meshes are built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub combine_mode: CombineMode,
    pub cell_size: i32,
    pub cell_offset: Vec3,

    pub use_vertex_output_limit: bool,
    pub vertex_output_limit: usize,

    pub remove_triangles_below_surface: bool,
    /// Use every renderer on the surface layers instead of colliders only
    pub no_colliders: bool,
    pub surface_layer_mask: LayerMask,
    /// Height the downward surface rays start from
    pub max_surface_height: f32,

    pub remove_back_face_triangles: bool,
    pub back_face_triangle_mode: BackFaceTriangleMode,
    pub back_face_direction: Vec3,
    pub back_face_bounds: Bounds,
    pub two_sided_shadows: bool,

    /// Drop triangles buried inside closed meshes on the overlap layers
    pub remove_overlapping_triangles: bool,
    /// Also drop faces pressed against an opposed face of another volume
    pub remove_same_position_triangles: bool,
    pub overlap_layer_mask: LayerMask,

    pub weld_vertices: bool,
    pub weld_snap_vertices: bool,
    pub weld_snap_size: f32,
    pub weld_include_normals: bool,

    pub add_mesh_colliders: bool,
    pub add_mesh_colliders_in_range: bool,
    pub add_mesh_colliders_bounds: Bounds,

    pub make_meshes_unreadable: bool,

    /// Keep source lightmap indices; only equal indices combine
    pub copy_baked_lighting: bool,
    pub rebake_lighting: bool,
    pub scale_in_lightmap: f32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            combine_mode: CombineMode::StaticObjects,
            cell_size: 32,
            cell_offset: Vec3::ZERO,
            use_vertex_output_limit: false,
            vertex_output_limit: 65534,
            remove_triangles_below_surface: false,
            no_colliders: false,
            surface_layer_mask: LayerMask::EVERYTHING,
            max_surface_height: 1000.0,
            remove_back_face_triangles: false,
            back_face_triangle_mode: BackFaceTriangleMode::Box,
            back_face_direction: Vec3::ZERO,
            back_face_bounds: Bounds::new(Vec3::ZERO, Vec3::splat(50.0)),
            two_sided_shadows: true,
            remove_overlapping_triangles: false,
            remove_same_position_triangles: false,
            overlap_layer_mask: LayerMask::EVERYTHING,
            weld_vertices: false,
            weld_snap_vertices: false,
            weld_snap_size: 0.025,
            weld_include_normals: false,
            add_mesh_colliders: false,
            add_mesh_colliders_in_range: false,
            add_mesh_colliders_bounds: Bounds::new(Vec3::ZERO, Vec3::splat(50.0)),
            make_meshes_unreadable: true,
            copy_baked_lighting: false,
            rebake_lighting: false,
            scale_in_lightmap: 1.0,
        }
    }
}

impl OutputSettings {
    /// Change the cell size, scaling the offset along with it
    pub fn set_cell_size(&mut self, cell_size: i32) {
        let old = self.cell_size.max(MIN_CELL_SIZE);
        let new = cell_size.max(MIN_CELL_SIZE);
        if old != new {
            self.cell_offset *= new as f32 / old as f32;
        }
        self.cell_size = new;
        self.cell_offset = clamp_cell_offset(self.cell_offset, new);
    }

    fn sanitize(&mut self, notices: &mut Vec<SettingsAdjustment>) {
        if self.cell_size < MIN_CELL_SIZE {
            notices.push(SettingsAdjustment::new(
                "output.cell_size",
                format!("raised {} to {}", self.cell_size, MIN_CELL_SIZE),
            ));
            self.cell_size = MIN_CELL_SIZE;
        }

        let offset = clamp_cell_offset(self.cell_offset, self.cell_size);
        if offset != self.cell_offset {
            notices.push(SettingsAdjustment::new(
                "output.cell_offset",
                format!(
                    "clamped {} into [0, {}]",
                    self.cell_offset,
                    self.cell_size / 2
                ),
            ));
            self.cell_offset = offset;
        }

        if self.vertex_output_limit < 1 {
            notices.push(SettingsAdjustment::new(
                "output.vertex_output_limit",
                "raised 0 to 1",
            ));
            self.vertex_output_limit = 1;
        }

        if self.weld_snap_size.is_nan() || self.weld_snap_size < MIN_WELD_SNAP_SIZE {
            notices.push(SettingsAdjustment::new(
                "output.weld_snap_size",
                format!("raised {} to {}", self.weld_snap_size, MIN_WELD_SNAP_SIZE),
            ));
            self.weld_snap_size = MIN_WELD_SNAP_SIZE;
        }

        for (field, bounds) in [
            ("output.back_face_bounds", &mut self.back_face_bounds),
            ("output.add_mesh_colliders_bounds", &mut self.add_mesh_colliders_bounds),
        ] {
            let size = clamp_min(bounds.size(), MIN_BOUNDS_SIZE);
            if size != bounds.size() {
                notices.push(SettingsAdjustment::new(
                    field,
                    format!("raised size {} to at least {}", bounds.size(), MIN_BOUNDS_SIZE),
                ));
                *bounds = Bounds::new(bounds.center, size);
            }
        }

        if !self.max_surface_height.is_finite() {
            notices.push(SettingsAdjustment::new(
                "output.max_surface_height",
                "not a finite number, using 1000",
            ));
            self.max_surface_height = 1000.0;
        }

        if self.copy_baked_lighting && self.rebake_lighting {
            notices.push(SettingsAdjustment::new(
                "output.rebake_lighting",
                "disabled, copy_baked_lighting is on",
            ));
            self.rebake_lighting = false;
        }

        if self.scale_in_lightmap.is_nan() || self.scale_in_lightmap < 0.0 {
            notices.push(SettingsAdjustment::new(
                "output.scale_in_lightmap",
                format!("raised {} to 0", self.scale_in_lightmap),
            ));
            self.scale_in_lightmap = 0.0;
        }
    }
}

/// Clamp each offset axis into `[0, cell_size / 2]`
pub fn clamp_cell_offset(offset: Vec3, cell_size: i32) -> Vec3 {
    // Integer division, an odd cell size of 5 allows offsets up to 2.
    let half = (cell_size.max(MIN_CELL_SIZE) / 2) as f32;
    let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, half) };
    Vec3::new(clamp(offset.x), clamp(offset.y), clamp(offset.z))
}

/// How jobs are scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub combine_job_mode: CombineJobMode,
    pub combine_meshes_per_frame: usize,
    pub use_multi_threading: bool,
    pub thread_amount_mode: ThreadAmountMode,
    pub custom_thread_amount: usize,
    /// The dispatching thread also runs queued jobs
    pub use_main_thread: bool,
    pub show_stats: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            combine_job_mode: CombineJobMode::CombineAtOnce,
            combine_meshes_per_frame: 4,
            use_multi_threading: true,
            thread_amount_mode: ThreadAmountMode::Auto,
            custom_thread_amount: 1,
            use_main_thread: true,
            show_stats: false,
        }
    }
}

impl JobSettings {
    /// Number of worker threads for a machine with `cores` cores
    pub fn worker_count(&self, cores: usize) -> usize {
        let cores = cores.max(1);
        if !self.use_multi_threading {
            return 0;
        }
        match self.thread_amount_mode {
            ThreadAmountMode::Auto => cores,
            ThreadAmountMode::Custom => self.custom_thread_amount.clamp(1, cores),
        }
    }

    /// Clamp the per frame limit and thread amount for `cores` cores
    pub fn sanitize(&mut self, cores: usize) -> Vec<SettingsAdjustment> {
        let mut notices = Vec::new();
        let per_frame = self.combine_meshes_per_frame.clamp(1, MAX_MESHES_PER_FRAME);
        if per_frame != self.combine_meshes_per_frame {
            notices.push(SettingsAdjustment::new(
                "job_settings.combine_meshes_per_frame",
                format!(
                    "clamped {} into [1, {}]",
                    self.combine_meshes_per_frame, MAX_MESHES_PER_FRAME
                ),
            ));
            self.combine_meshes_per_frame = per_frame;
        }
        let threads = self.custom_thread_amount.clamp(1, cores.max(1));
        if threads != self.custom_thread_amount {
            notices.push(SettingsAdjustment::new(
                "job_settings.custom_thread_amount",
                format!("clamped {} into [1, {}]", self.custom_thread_amount, cores.max(1)),
            ));
            self.custom_thread_amount = threads;
        }
        notices
    }
}

/// Everything a combiner is configured with
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshCombinerSettings {
    pub search_options: SearchOptions,
    pub combine_conditions: CombineConditionSettings,
    pub output: OutputSettings,
    pub job_settings: JobSettings,
}

impl MeshCombinerSettings {
    /// Bring every value into its valid range
    ///
    /// Returns one notice per adjusted field; each is also logged.
    pub fn sanitize(&mut self, cores: usize) -> Vec<SettingsAdjustment> {
        let mut notices = Vec::new();
        self.search_options.sanitize(&mut notices);
        self.combine_conditions.sanitize(&mut notices);
        self.output.sanitize(&mut notices);
        notices.extend(self.job_settings.sanitize(cores));
        for notice in &notices {
            warn!(field = notice.field, "{}", notice.message);
        }
        notices
    }

    /// A sanitized copy, leaving `self` untouched
    pub fn sanitized(&self, cores: usize) -> (Self, Vec<SettingsAdjustment>) {
        let mut copy = self.clone();
        let notices = copy.sanitize(cores);
        (copy, notices)
    }
}

/// A value changed by sanitizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsAdjustment {
    pub field: &'static str,
    pub message: String,
}

impl SettingsAdjustment {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
