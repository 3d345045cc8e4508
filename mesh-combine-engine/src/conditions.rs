//! Combine condition keys
//!
//! Two renderer entries may share a combined mesh when their
//! [`CombineConditionKey`]s are equal. The key holds the source value of
//! every attribute that must match and nothing for the rest, so grouping is
//! plain key equality.

use crate::settings::CombineConditionSettings;
use mesh_combine_core::{
    LightProbeUsage, MeshRenderer, MotionVectorGenerationMode, NodeId, ReceiveGi,
    ReflectionProbeUsage, SceneNode, ShadowCastingMode, StaticEditorFlags,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Source attributes of one renderer entry (one sub-mesh of a renderer)
#[derive(Debug, Clone, PartialEq)]
pub struct RendererAttributes {
    pub material: String,
    pub lightmap_index: i32,
    pub shadow_casting_mode: ShadowCastingMode,
    pub receive_shadows: bool,
    pub receive_gi: ReceiveGi,
    pub light_probe_usage: LightProbeUsage,
    pub reflection_probe_usage: ReflectionProbeUsage,
    pub probe_anchor: Option<NodeId>,
    pub motion_vector_generation_mode: MotionVectorGenerationMode,
    pub static_flags: StaticEditorFlags,
    pub layer: u8,
}

impl RendererAttributes {
    /// Attributes of `sub_mesh` drawn by `renderer` on `node`
    pub fn from_renderer(node: &SceneNode, renderer: &MeshRenderer, sub_mesh: usize) -> Self {
        Self {
            material: renderer.material_for(sub_mesh).unwrap_or_default().to_string(),
            lightmap_index: renderer.lightmap_index,
            shadow_casting_mode: renderer.shadow_casting_mode,
            receive_shadows: renderer.receive_shadows,
            receive_gi: renderer.receive_gi,
            light_probe_usage: renderer.light_probe_usage,
            reflection_probe_usage: renderer.reflection_probe_usage,
            probe_anchor: renderer.probe_anchor,
            motion_vector_generation_mode: renderer.motion_vector_generation_mode,
            static_flags: node.static_flags,
            layer: node.layer,
        }
    }
}

/// Hashable grouping key; `None` marks an attribute that is overridden
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CombineConditionKey {
    pub material: Option<String>,
    pub lightmap_index: Option<i32>,
    pub shadow_casting_mode: Option<ShadowCastingMode>,
    pub receive_shadows: Option<bool>,
    pub receive_gi: Option<ReceiveGi>,
    pub light_probe_usage: Option<LightProbeUsage>,
    pub reflection_probe_usage: Option<ReflectionProbeUsage>,
    pub probe_anchor: Option<Option<NodeId>>,
    pub motion_vector_generation_mode: Option<MotionVectorGenerationMode>,
    pub static_flags: Option<StaticEditorFlags>,
    pub layer: Option<u8>,
}

impl CombineConditionKey {
    /// Build the key of an entry
    ///
    /// `copy_baked_lighting` makes the lightmap index a matching attribute.
    pub fn new(
        attributes: &RendererAttributes,
        conditions: &CombineConditionSettings,
        copy_baked_lighting: bool,
    ) -> Self {
        fn keep<T: Clone>(same: bool, value: &T) -> Option<T> {
            same.then(|| value.clone())
        }

        Self {
            material: keep(conditions.same_material, &attributes.material),
            lightmap_index: keep(copy_baked_lighting, &attributes.lightmap_index),
            shadow_casting_mode: keep(
                conditions.same_shadow_casting_mode,
                &attributes.shadow_casting_mode,
            ),
            receive_shadows: keep(conditions.same_receive_shadows, &attributes.receive_shadows),
            receive_gi: keep(conditions.same_receive_gi, &attributes.receive_gi),
            light_probe_usage: keep(
                conditions.same_light_probe_usage,
                &attributes.light_probe_usage,
            ),
            reflection_probe_usage: keep(
                conditions.same_reflection_probe_usage,
                &attributes.reflection_probe_usage,
            ),
            probe_anchor: keep(conditions.same_probe_anchor, &attributes.probe_anchor),
            motion_vector_generation_mode: keep(
                conditions.same_motion_vector_generation_mode,
                &attributes.motion_vector_generation_mode,
            ),
            static_flags: keep(
                conditions.same_static_editor_flags,
                &attributes.static_flags.without_batching(),
            ),
            layer: keep(conditions.same_layer, &attributes.layer),
        }
    }

    /// Attributes every output of this group receives
    pub fn resolve(&self, conditions: &CombineConditionSettings) -> OutputAttributes {
        OutputAttributes {
            material: self
                .material
                .clone()
                .unwrap_or_else(|| conditions.material.clone()),
            lightmap_index: self.lightmap_index.unwrap_or(-1),
            shadow_casting_mode: self
                .shadow_casting_mode
                .unwrap_or(conditions.shadow_casting_mode),
            receive_shadows: self.receive_shadows.unwrap_or(conditions.receive_shadows),
            receive_gi: self.receive_gi.unwrap_or(conditions.receive_gi),
            light_probe_usage: self
                .light_probe_usage
                .unwrap_or(conditions.light_probe_usage),
            reflection_probe_usage: self
                .reflection_probe_usage
                .unwrap_or(conditions.reflection_probe_usage),
            probe_anchor: self.probe_anchor.unwrap_or(conditions.probe_anchor),
            motion_vector_generation_mode: self
                .motion_vector_generation_mode
                .unwrap_or(conditions.motion_vector_generation_mode),
            static_flags: self
                .static_flags
                .unwrap_or(conditions.static_editor_flags)
                .without_batching(),
            layer: self.layer.unwrap_or(conditions.layer),
        }
    }
}

/// Renderer attributes of a combined mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAttributes {
    pub material: String,
    pub lightmap_index: i32,
    pub shadow_casting_mode: ShadowCastingMode,
    pub receive_shadows: bool,
    pub receive_gi: ReceiveGi,
    pub light_probe_usage: LightProbeUsage,
    pub reflection_probe_usage: ReflectionProbeUsage,
    pub probe_anchor: Option<NodeId>,
    pub motion_vector_generation_mode: MotionVectorGenerationMode,
    pub static_flags: StaticEditorFlags,
    pub layer: u8,
}

/// How many distinct values of each attribute the last search found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundCombineConditions {
    pub material_count: usize,
    pub lightmap_index_count: usize,
    pub shadow_casting_mode_count: usize,
    pub receive_shadows_count: usize,
    pub receive_gi_count: usize,
    pub light_probe_usage_count: usize,
    pub reflection_probe_usage_count: usize,
    pub probe_anchor_count: usize,
    pub motion_vector_generation_mode_count: usize,
    pub static_flags_count: usize,
    pub layer_count: usize,
    /// Distinct condition keys
    pub combine_conditions_count: usize,
    pub cell_count: usize,
}

/// Collects distinct attribute values while entries are grouped
#[derive(Debug, Default)]
pub struct ConditionTally {
    materials: HashSet<String>,
    lightmap_indices: HashSet<i32>,
    shadow_casting_modes: HashSet<ShadowCastingMode>,
    receive_shadows: HashSet<bool>,
    receive_gi: HashSet<ReceiveGi>,
    light_probe_usages: HashSet<LightProbeUsage>,
    reflection_probe_usages: HashSet<ReflectionProbeUsage>,
    probe_anchors: HashSet<Option<NodeId>>,
    motion_vector_modes: HashSet<MotionVectorGenerationMode>,
    static_flags: HashSet<StaticEditorFlags>,
    layers: HashSet<u8>,
    keys: HashSet<CombineConditionKey>,
}

impl ConditionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attributes: &RendererAttributes, key: &CombineConditionKey) {
        if !self.materials.contains(&attributes.material) {
            self.materials.insert(attributes.material.clone());
        }
        self.lightmap_indices.insert(attributes.lightmap_index);
        self.shadow_casting_modes.insert(attributes.shadow_casting_mode);
        self.receive_shadows.insert(attributes.receive_shadows);
        self.receive_gi.insert(attributes.receive_gi);
        self.light_probe_usages.insert(attributes.light_probe_usage);
        self.reflection_probe_usages
            .insert(attributes.reflection_probe_usage);
        self.probe_anchors.insert(attributes.probe_anchor);
        self.motion_vector_modes
            .insert(attributes.motion_vector_generation_mode);
        self.static_flags
            .insert(attributes.static_flags.without_batching());
        self.layers.insert(attributes.layer);
        if !self.keys.contains(key) {
            self.keys.insert(key.clone());
        }
    }

    pub fn finish(self, cell_count: usize) -> FoundCombineConditions {
        FoundCombineConditions {
            material_count: self.materials.len(),
            lightmap_index_count: self.lightmap_indices.len(),
            shadow_casting_mode_count: self.shadow_casting_modes.len(),
            receive_shadows_count: self.receive_shadows.len(),
            receive_gi_count: self.receive_gi.len(),
            light_probe_usage_count: self.light_probe_usages.len(),
            reflection_probe_usage_count: self.reflection_probe_usages.len(),
            probe_anchor_count: self.probe_anchors.len(),
            motion_vector_generation_mode_count: self.motion_vector_modes.len(),
            static_flags_count: self.static_flags.len(),
            layer_count: self.layers.len(),
            combine_conditions_count: self.keys.len(),
            cell_count,
        }
    }
}
