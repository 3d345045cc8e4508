//! Scene model
//!
//! A small, engine-neutral scene graph standing in for the host engine's
//! hierarchy: nodes with transforms, optional mesh renderers and LOD groups,
//! and a table of meshes referenced by id.

use crate::constants::{
    LightProbeUsage, MotionVectorGenerationMode, ReceiveGi, ReflectionProbeUsage,
    ShadowCastingMode, StaticEditorFlags, UNTAGGED,
};
use crate::error::{CoreError, Result};
use crate::math::Bounds;
use crate::mesh::{Mesh, MeshId};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Index of a node inside a [`Scene`]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Local transform of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Mesh renderer attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshRenderer {
    pub mesh: Option<MeshId>,
    /// One material per sub-mesh
    pub materials: Vec<String>,
    pub enabled: bool,
    pub shadow_casting_mode: ShadowCastingMode,
    pub receive_shadows: bool,
    pub receive_gi: ReceiveGi,
    pub light_probe_usage: LightProbeUsage,
    pub reflection_probe_usage: ReflectionProbeUsage,
    pub probe_anchor: Option<NodeId>,
    pub motion_vector_generation_mode: MotionVectorGenerationMode,
    /// Lightmap the renderer was baked into, -1 for none
    pub lightmap_index: i32,
}

impl Default for MeshRenderer {
    fn default() -> Self {
        Self {
            mesh: None,
            materials: Vec::new(),
            enabled: true,
            shadow_casting_mode: ShadowCastingMode::default(),
            receive_shadows: true,
            receive_gi: ReceiveGi::default(),
            light_probe_usage: LightProbeUsage::default(),
            reflection_probe_usage: ReflectionProbeUsage::default(),
            probe_anchor: None,
            motion_vector_generation_mode: MotionVectorGenerationMode::default(),
            lightmap_index: -1,
        }
    }
}

impl MeshRenderer {
    pub fn new(mesh: MeshId, material: impl Into<String>) -> Self {
        Self {
            mesh: Some(mesh),
            materials: vec![material.into()],
            ..Self::default()
        }
    }

    /// Material used by a sub-mesh; extra sub-meshes reuse the last material
    pub fn material_for(&self, sub_mesh: usize) -> Option<&str> {
        self.materials
            .get(sub_mesh)
            .or_else(|| self.materials.last())
            .map(String::as_str)
    }
}

/// Level of detail group; `levels[0]` is the most detailed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LodGroup {
    pub levels: Vec<Vec<NodeId>>,
}

impl LodGroup {
    pub fn lod_count(&self) -> usize {
        self.levels.len()
    }
}

/// A node of the scene hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneNode {
    pub name: String,
    pub tag: String,
    pub layer: u8,
    pub active: bool,
    pub static_flags: StaticEditorFlags,
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Names of attached components besides renderer and LOD group
    pub components: Vec<String>,
    pub renderer: Option<MeshRenderer>,
    pub lod_group: Option<LodGroup>,
    pub has_collider: bool,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            tag: UNTAGGED.to_string(),
            layer: 0,
            active: true,
            static_flags: StaticEditorFlags::empty(),
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            renderer: None,
            lod_group: None,
            has_collider: false,
        }
    }
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Any static flag set counts as static
    pub fn is_static(&self) -> bool {
        !self.static_flags.is_empty()
    }

    /// Check for a component by name, including the implicit ones
    pub fn has_component(&self, name: &str) -> bool {
        use crate::constants::component_names as names;
        match name {
            names::TRANSFORM => true,
            names::MESH_RENDERER | names::MESH_FILTER => self.renderer.is_some(),
            names::LOD_GROUP => self.lod_group.is_some(),
            names::MESH_COLLIDER if self.has_collider => true,
            _ => self.components.iter().any(|c| c == name),
        }
    }
}

/// Scene graph holding nodes and the meshes they reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub nodes: Vec<SceneNode>,
    pub meshes: Vec<Mesh>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh and return its id
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() as u32 - 1)
    }

    /// Add a node under `parent` and return its id
    pub fn add_node(&mut self, mut node: SceneNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        node.parent = parent;
        self.nodes.push(node);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p.index())) {
            parent.children.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0 as usize)
    }

    /// Get a node or fail with a lookup error
    pub fn require_node(&self, id: NodeId) -> Result<&SceneNode> {
        self.node(id).ok_or(CoreError::NodeNotFound(id.0))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Nodes without a parent
    pub fn roots(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id.index()].parent.is_none())
            .collect()
    }

    /// Iterate the ancestors of a node, nearest first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            scene: self,
            next: self.node(id).and_then(|n| n.parent),
            remaining: self.nodes.len(),
        }
    }

    /// Check if `id` lies strictly below `ancestor`
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// `node` and every node below it, depth first, parents before children
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(n) = self.node(id) else { continue };
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            out.push(id);
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    /// Active flag of the node and all of its ancestors
    pub fn is_active_in_hierarchy(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.active)
            && self
                .ancestors(id)
                .all(|a| self.node(a).is_some_and(|n| n.active))
    }

    /// Local-to-world matrix of a node
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let Some(node) = self.node(id) else {
            return Mat4::IDENTITY;
        };
        let mut matrix = node.transform.matrix();
        for ancestor in self.ancestors(id).filter_map(|a| self.node(a)) {
            matrix = ancestor.transform.matrix() * matrix;
        }
        matrix
    }

    /// World position of a node's pivot
    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).w_axis.truncate()
    }

    /// World bounds of a node's rendered mesh
    pub fn renderer_bounds(&self, id: NodeId) -> Option<Bounds> {
        let mesh_id = self.node(id)?.renderer.as_ref()?.mesh?;
        let mesh = self.mesh(mesh_id)?;
        Some(mesh.bounds().transformed(&self.world_matrix(id)))
    }

    /// Check every id stored in the scene
    pub fn validate(&self) -> Result<()> {
        let node_count = self.nodes.len() as u32;
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent.0 >= node_count {
                    return Err(CoreError::NodeNotFound(parent.0));
                }
            }
            for child in &node.children {
                if child.0 >= node_count {
                    return Err(CoreError::NodeNotFound(child.0));
                }
                if self.nodes[child.index()].parent != Some(NodeId(i as u32)) {
                    return Err(CoreError::ChildMismatch {
                        parent: i as u32,
                        child: child.0,
                    });
                }
            }
            if let Some(mesh) = node.renderer.as_ref().and_then(|r| r.mesh) {
                if mesh.0 as usize >= self.meshes.len() {
                    return Err(CoreError::MeshNotFound(mesh.0));
                }
            }
            if let Some(lod_group) = &node.lod_group {
                for id in lod_group.levels.iter().flatten() {
                    if id.0 >= node_count {
                        return Err(CoreError::NodeNotFound(id.0));
                    }
                }
            }
            if self.ancestors(NodeId(i as u32)).count() >= self.nodes.len() {
                return Err(CoreError::HierarchyCycle(i as u32));
            }
        }
        for mesh in self.meshes.iter().filter(|m| m.is_readable) {
            mesh.validate()?;
        }
        Ok(())
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a> {
    scene: &'a Scene,
    next: Option<NodeId>,
    // Guards against cycles in hand written scenes.
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.scene.node(current).and_then(|n| n.parent);
        Some(current)
    }
}
