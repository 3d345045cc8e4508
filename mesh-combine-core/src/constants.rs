//! Renderer constants and enums
//!
//! Value types mirroring the renderer settings a host engine exposes per
//! mesh renderer. These are the attributes the combiner compares when it
//! decides which meshes may share one combined mesh.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tag given to nodes that have none
pub const UNTAGGED: &str = "Untagged";

/// Number of layers addressable by a [`LayerMask`]
pub const LAYER_COUNT: u8 = 32;

/// How a renderer casts shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowCastingMode {
    Off,
    #[default]
    On,
    TwoSided,
    ShadowsOnly,
}

/// Which global illumination source a renderer receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReceiveGi {
    #[default]
    Lightmaps,
    LightProbes,
}

/// Light probe interpolation used by a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightProbeUsage {
    Off,
    #[default]
    BlendProbes,
    UseProxyVolume,
    CustomProvided,
}

/// Reflection probe usage of a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReflectionProbeUsage {
    Off,
    #[default]
    BlendProbes,
    BlendProbesAndSkybox,
    Simple,
}

/// Motion vector generation of a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionVectorGenerationMode {
    Camera,
    #[default]
    Object,
    ForceNoMotion,
}

bitflags! {
    /// Static flags set on a node in the editor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StaticEditorFlags: u32 {
        const CONTRIBUTE_GI = 1;
        const OCCLUDER_STATIC = 2;
        const BATCHING_STATIC = 4;
        const NAVIGATION_STATIC = 8;
        const OCCLUDEE_STATIC = 16;
        const OFF_MESH_LINK_GENERATION = 32;
        const REFLECTION_PROBE_STATIC = 64;
    }
}

impl StaticEditorFlags {
    /// Flags with the batching bit removed.
    ///
    /// Combined meshes are batched by the combiner itself, so the host's
    /// static batching must never be requested for them.
    pub fn without_batching(self) -> Self {
        self - Self::BATCHING_STATIC
    }
}

/// A 32 bit set of layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Mask containing every layer
    pub const EVERYTHING: LayerMask = LayerMask(u32::MAX);

    /// Mask containing no layer
    pub const NOTHING: LayerMask = LayerMask(0);

    /// Mask holding exactly one layer
    pub fn from_layer(layer: u8) -> Self {
        if layer >= LAYER_COUNT {
            Self::NOTHING
        } else {
            Self(1 << layer)
        }
    }

    /// Mask holding all given layers
    pub fn from_layers(layers: &[u8]) -> Self {
        layers
            .iter()
            .fold(Self::NOTHING, |mask, &layer| mask.with(layer))
    }

    /// Return a copy with `layer` added
    pub fn with(self, layer: u8) -> Self {
        Self(self.0 | Self::from_layer(layer).0)
    }

    /// Check if the mask contains a layer
    pub fn contains(&self, layer: u8) -> bool {
        layer < LAYER_COUNT && self.0 & (1 << layer) != 0
    }

    /// Check if the mask is empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::EVERYTHING
    }
}

impl fmt::Display for LayerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Component names the combiner looks for on scene nodes
pub mod component_names {
    pub const TRANSFORM: &str = "Transform";
    pub const MESH_FILTER: &str = "MeshFilter";
    pub const MESH_RENDERER: &str = "MeshRenderer";
    pub const LOD_GROUP: &str = "LODGroup";
    pub const MESH_COLLIDER: &str = "MeshCollider";
    /// Marker for parts that combine as one dynamic object
    pub const DYNAMIC_OBJECT: &str = "MCSDynamicObject";
}
