//! Candidate search
//!
//! Walks the search scope and selects the renderers and LOD groups a
//! combine will consume. All filters form a conjunction.

use crate::settings::{
    CombineMode, ComponentCondition, LodGroupSearchMode, MeshCombinerSettings, ObjectCenter,
};
use mesh_combine_core::component_names::DYNAMIC_OBJECT;
use mesh_combine_core::{Bounds, MeshId, NodeId, Scene, SceneNode, Vec3};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A renderer selected for combining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundObject {
    pub node: NodeId,
    pub mesh: MeshId,
    /// Point deciding cell membership
    pub center: Vec3,
    /// World bounds of the rendered mesh
    pub bounds: Bounds,
    pub vertex_count: usize,
    /// Nearest node at or above this one marked as a dynamic object
    pub dynamic_root: Option<NodeId>,
}

/// A LOD group selected for combining, with its renderers per level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundLodGroup {
    pub node: NodeId,
    pub center: Vec3,
    pub levels: Vec<Vec<FoundObject>>,
    pub dynamic_root: Option<NodeId>,
}

impl FoundLodGroup {
    pub fn lod_count(&self) -> usize {
        self.levels.len()
    }
}

/// Something the search skipped and the user should know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchNotice {
    pub node: NodeId,
    pub reason: String,
}

/// Everything a search found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Parents actually searched
    pub search_roots: Vec<NodeId>,
    pub objects: Vec<FoundObject>,
    pub lod_groups: Vec<FoundLodGroup>,
    /// Meshes that passed every filter but have no CPU side data
    pub unreadable_meshes: Vec<MeshId>,
    pub notices: Vec<SearchNotice>,
}

impl SearchResult {
    /// Renderers found, counting every LOD level
    pub fn renderer_count(&self) -> usize {
        self.objects.len()
            + self
                .lod_groups
                .iter()
                .map(|g| g.levels.iter().map(Vec::len).sum::<usize>())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.lod_groups.is_empty()
    }
}

/// Drop search parents that would search the combiner itself or search
/// a subtree twice
pub fn validate_search_parents(
    scene: &Scene,
    combiner_node: Option<NodeId>,
    parents: &[NodeId],
) -> (Vec<NodeId>, Vec<SearchNotice>) {
    let mut notices = Vec::new();
    let mut reject = |node: NodeId, reason: String| {
        warn!(node = node.0, "search parent rejected: {}", reason);
        notices.push(SearchNotice { node, reason });
    };

    let mut unique: Vec<NodeId> = Vec::with_capacity(parents.len());
    for &parent in parents {
        if scene.node(parent).is_none() {
            reject(parent, "node does not exist".to_string());
        } else if unique.contains(&parent) {
            reject(parent, "listed twice".to_string());
        } else if Some(parent) == combiner_node {
            reject(parent, "is the combiner itself".to_string());
        } else if combiner_node.is_some_and(|c| scene.is_descendant_of(parent, c)) {
            reject(parent, "is a child of the combiner".to_string());
        } else {
            unique.push(parent);
        }
    }

    let mut valid = Vec::with_capacity(unique.len());
    for &parent in &unique {
        match unique
            .iter()
            .find(|&&other| other != parent && scene.is_descendant_of(parent, other))
        {
            Some(other) => reject(
                parent,
                format!("is already searched as a child of node {}", other.0),
            ),
            None => valid.push(parent),
        }
    }
    (valid, notices)
}

/// Why a renderer was not selected
enum Skip {
    Filtered,
    Unreadable(MeshId),
}

/// Search the scene with the given settings
///
/// `combiner_node` is the node owning the combiner; it and everything
/// below it are never searched.
pub fn search(
    scene: &Scene,
    settings: &MeshCombinerSettings,
    combiner_node: Option<NodeId>,
) -> SearchResult {
    CandidateSearch {
        scene,
        settings,
        combiner_node,
    }
    .run()
}

struct CandidateSearch<'a> {
    scene: &'a Scene,
    settings: &'a MeshCombinerSettings,
    combiner_node: Option<NodeId>,
}

impl CandidateSearch<'_> {
    fn run(&self) -> SearchResult {
        let options = &self.settings.search_options;
        let (roots, notices) = if options.parent_nodes.is_empty() {
            (self.scene.roots(), Vec::new())
        } else {
            validate_search_parents(self.scene, self.combiner_node, &options.parent_nodes)
        };

        let mut scope = Vec::new();
        for &root in &roots {
            scope.extend(
                self.scene
                    .subtree(root)
                    .into_iter()
                    .filter(|&id| !self.is_combiner_owned(id)),
            );
        }

        let lod_mode = options.lod_group_search_mode == LodGroupSearchMode::LodGroup;
        let lod_members: HashSet<NodeId> = if lod_mode {
            scope
                .iter()
                .filter_map(|&id| self.scene.node(id)?.lod_group.as_ref())
                .flat_map(|g| g.levels.iter().flatten().copied())
                .collect()
        } else {
            HashSet::new()
        };

        let mut result = SearchResult {
            search_roots: roots,
            notices,
            ..SearchResult::default()
        };
        let mut unreadable = IndexSet::new();

        for &id in &scope {
            let Some(node) = self.scene.node(id) else {
                continue;
            };

            if lod_mode && node.lod_group.is_some() {
                if let Some(group) = self.lod_group_candidate(id, node, &mut unreadable) {
                    result.lod_groups.push(group);
                }
                continue;
            }

            if node.renderer.is_none() || lod_members.contains(&id) {
                continue;
            }
            match self.renderer_candidate(id) {
                Ok(found) => {
                    let dynamic_ok = self.settings.output.combine_mode
                        == CombineMode::StaticObjects
                        || found.dynamic_root.is_some();
                    if dynamic_ok && self.passes_node_filters(id, node, found.center) {
                        result.objects.push(found);
                    }
                }
                Err(Skip::Unreadable(mesh))
                    if self.passes_node_filters(id, node, self.center_of(id)) =>
                {
                    unreadable.insert(mesh);
                }
                Err(_) => {}
            }
        }
        result.unreadable_meshes = unreadable.into_iter().collect();

        debug!(
            objects = result.objects.len(),
            lod_groups = result.lod_groups.len(),
            unreadable = result.unreadable_meshes.len(),
            "search finished"
        );
        result
    }

    fn is_combiner_owned(&self, id: NodeId) -> bool {
        self.combiner_node
            .is_some_and(|c| id == c || self.scene.is_descendant_of(id, c))
    }

    fn center_of(&self, id: NodeId) -> Vec3 {
        match self.settings.search_options.object_center {
            ObjectCenter::BoundsCenter => self
                .scene
                .renderer_bounds(id)
                .map(|b| b.center)
                .unwrap_or_else(|| self.scene.world_position(id)),
            ObjectCenter::TransformPosition => self.scene.world_position(id),
        }
    }

    fn dynamic_root(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.scene.ancestors(id))
            .find(|&a| self.scene.node(a).is_some_and(|n| n.has_component(DYNAMIC_OBJECT)))
    }

    /// Filters that look at the node itself, not at its renderer
    fn passes_node_filters(&self, id: NodeId, node: &SceneNode, center: Vec3) -> bool {
        let options = &self.settings.search_options;

        if options.only_active && !self.scene.is_active_in_hierarchy(id) {
            return false;
        }
        if options.only_static && !node.is_static() {
            return false;
        }
        if options.use_layer_mask && !options.layer_mask.contains(node.layer) {
            return false;
        }
        if options.use_tag && node.tag != options.tag {
            return false;
        }
        if options.use_components_filter && !options.component_names.is_empty() {
            let mut present = options
                .component_names
                .iter()
                .map(|name| node.has_component(name));
            let ok = match options.component_condition {
                ComponentCondition::And => present.all(|p| p),
                ComponentCondition::Or => present.any(|p| p),
            };
            if !ok {
                return false;
            }
        }
        if options.use_name_contains
            && !options.name_contains.is_empty()
            && !options
                .name_contains
                .iter()
                .any(|part| node.name.contains(part.as_str()))
        {
            return false;
        }
        if options.use_search_box && !options.search_box().contains(center) {
            return false;
        }
        true
    }

    /// Checks on the renderer and its mesh
    fn renderer_candidate(&self, id: NodeId) -> Result<FoundObject, Skip> {
        let options = &self.settings.search_options;
        let renderer = self
            .scene
            .node(id)
            .and_then(|n| n.renderer.as_ref())
            .ok_or(Skip::Filtered)?;
        let mesh_id = renderer.mesh.ok_or(Skip::Filtered)?;
        let Some(mesh) = self.scene.mesh(mesh_id) else {
            warn!(node = id.0, mesh = mesh_id.0, "renderer references a missing mesh");
            return Err(Skip::Filtered);
        };

        if options.only_active_mesh_renderers && !renderer.enabled {
            return Err(Skip::Filtered);
        }
        if !mesh.is_readable {
            return Err(Skip::Unreadable(mesh_id));
        }
        if options.use_vertex_input_limit && mesh.vertex_count() > options.vertex_input_limit {
            return Err(Skip::Filtered);
        }

        let bounds = mesh.bounds().transformed(&self.scene.world_matrix(id));
        if options.use_max_bounds_factor
            && self.settings.output.combine_mode == CombineMode::StaticObjects
            && bounds.max_size() > self.settings.output.cell_size as f32 * options.max_bounds_factor
        {
            return Err(Skip::Filtered);
        }

        Ok(FoundObject {
            node: id,
            mesh: mesh_id,
            center: self.center_of(id),
            bounds,
            vertex_count: mesh.vertex_count(),
            dynamic_root: self.dynamic_root(id),
        })
    }

    fn lod_group_candidate(
        &self,
        id: NodeId,
        node: &SceneNode,
        unreadable: &mut IndexSet<MeshId>,
    ) -> Option<FoundLodGroup> {
        let lod_group = node.lod_group.as_ref()?;
        let dynamic_root = self.dynamic_root(id);
        if self.settings.output.combine_mode == CombineMode::DynamicObjects
            && dynamic_root.is_none()
        {
            return None;
        }

        let mut levels = Vec::with_capacity(lod_group.lod_count());
        for level in &lod_group.levels {
            let mut found = Vec::new();
            for &member in level {
                if self.settings.search_options.only_active
                    && !self.scene.is_active_in_hierarchy(member)
                {
                    continue;
                }
                match self.renderer_candidate(member) {
                    Ok(object) => found.push(object),
                    Err(Skip::Unreadable(mesh)) => {
                        unreadable.insert(mesh);
                    }
                    Err(Skip::Filtered) => {}
                }
            }
            levels.push(found);
        }
        if levels.iter().all(Vec::is_empty) {
            return None;
        }

        let center = match self.settings.search_options.object_center {
            ObjectCenter::BoundsCenter => levels
                .iter()
                .find(|l| !l.is_empty())
                .and_then(|l| {
                    l.iter().map(|o| o.bounds).reduce(|mut acc, b| {
                        acc.encapsulate(&b);
                        acc
                    })
                })
                .map(|b| b.center)
                .unwrap_or_else(|| self.scene.world_position(id)),
            ObjectCenter::TransformPosition => self.scene.world_position(id),
        };
        if !self.passes_node_filters(id, node, center) {
            return None;
        }

        Some(FoundLodGroup {
            node: id,
            center,
            levels,
            dynamic_root,
        })
    }
}
