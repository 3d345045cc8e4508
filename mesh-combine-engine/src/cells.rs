//! Spatial cells and combine groups
//!
//! Found renderers are split into one entry per sub-mesh and bucketed by
//! cell (or dynamic object), LOD slot and condition key. Each bucket
//! becomes one combine job.

use crate::conditions::{CombineConditionKey, ConditionTally, FoundCombineConditions, OutputAttributes, RendererAttributes};
use crate::search::{FoundObject, SearchResult};
use crate::settings::{CombineMode, MeshCombinerSettings};
use glam::IVec3;
use indexmap::{IndexMap, IndexSet};
use mesh_combine_core::{MeshId, NodeId, Scene, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell holding a point
pub fn cell_key(center: Vec3, cell_size: i32, cell_offset: Vec3) -> IVec3 {
    ((center - cell_offset) / cell_size as f32).floor().as_ivec3()
}

/// What a group is spatially bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupScope {
    Cell(IVec3),
    /// Root node of a dynamic object
    Dynamic(NodeId),
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupScope::Cell(c) => write!(f, "cell_{}_{}_{}", c.x, c.y, c.z),
            GroupScope::Dynamic(node) => write!(f, "object_{}", node.0),
        }
    }
}

/// Level of a LOD group with a given level count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LodSlot {
    pub lod_count: usize,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CombineGroupKey {
    pub scope: GroupScope,
    pub lod: Option<LodSlot>,
    pub condition: CombineConditionKey,
}

/// One sub-mesh of a found renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshEntry {
    pub node: NodeId,
    pub mesh: MeshId,
    pub sub_mesh: usize,
}

/// Entries that end up in the same combined mesh (before splitting)
#[derive(Debug, Clone)]
pub struct CombineGroup {
    pub key: CombineGroupKey,
    pub output: OutputAttributes,
    pub entries: Vec<MeshEntry>,
}

/// Groups of the last search, in discovery order
#[derive(Debug, Clone, Default)]
pub struct CellIndex {
    groups: IndexMap<CombineGroupKey, CombineGroup>,
    cells: IndexSet<IVec3>,
    found: FoundCombineConditions,
}

impl CellIndex {
    /// Group everything a search found
    pub fn build(scene: &Scene, found: &SearchResult, settings: &MeshCombinerSettings) -> Self {
        let mut builder = Builder {
            scene,
            settings,
            index: CellIndex::default(),
            tally: ConditionTally::new(),
        };

        for object in &found.objects {
            let scope = builder.scope_for(object.center, object.dynamic_root);
            builder.add_object(object, scope, None);
        }
        for group in &found.lod_groups {
            let scope = builder.scope_for(group.center, group.dynamic_root);
            let lod_count = group.lod_count();
            for (level, objects) in group.levels.iter().enumerate() {
                for object in objects {
                    builder.add_object(object, scope, Some(LodSlot { lod_count, level }));
                }
            }
        }

        let Builder {
            mut index, tally, ..
        } = builder;
        index.found = tally.finish(index.cells.len());
        index
    }

    pub fn groups(&self) -> impl Iterator<Item = &CombineGroup> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Cells holding at least one entry
    pub fn cells(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.cells.iter().copied()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn contains_objects(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn found_combine_conditions(&self) -> &FoundCombineConditions {
        &self.found
    }

    /// Number of groups bound to one cell
    pub fn groups_in_cell(&self, cell: IVec3) -> usize {
        self.groups
            .keys()
            .filter(|k| k.scope == GroupScope::Cell(cell))
            .count()
    }
}

struct Builder<'a> {
    scene: &'a Scene,
    settings: &'a MeshCombinerSettings,
    index: CellIndex,
    tally: ConditionTally,
}

impl Builder<'_> {
    fn scope_for(&self, center: Vec3, dynamic_root: Option<NodeId>) -> GroupScope {
        let output = &self.settings.output;
        match (output.combine_mode, dynamic_root) {
            (CombineMode::DynamicObjects, Some(root)) => GroupScope::Dynamic(root),
            _ => {
                let cell = cell_key(center, output.cell_size, output.cell_offset);
                GroupScope::Cell(cell)
            }
        }
    }

    fn add_object(&mut self, object: &FoundObject, scope: GroupScope, lod: Option<LodSlot>) {
        let Some(node) = self.scene.node(object.node) else {
            return;
        };
        let Some(renderer) = node.renderer.as_ref() else {
            return;
        };
        let Some(mesh) = self.scene.mesh(object.mesh) else {
            return;
        };

        for (sub_mesh, data) in mesh.sub_meshes.iter().enumerate() {
            if !data.is_valid() {
                continue;
            }
            let attributes = RendererAttributes::from_renderer(node, renderer, sub_mesh);
            let condition = CombineConditionKey::new(
                &attributes,
                &self.settings.combine_conditions,
                self.settings.output.copy_baked_lighting,
            );
            self.tally.add(&attributes, &condition);

            if let GroupScope::Cell(cell) = scope {
                self.index.cells.insert(cell);
            }
            let key = CombineGroupKey {
                scope,
                lod,
                condition,
            };
            let conditions = &self.settings.combine_conditions;
            self.index
                .groups
                .entry(key)
                .or_insert_with_key(|key| CombineGroup {
                    key: key.clone(),
                    output: key.condition.resolve(conditions),
                    entries: Vec::new(),
                })
                .entries
                .push(MeshEntry {
                    node: object.node,
                    mesh: object.mesh,
                    sub_mesh,
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::search;
    use mesh_combine_core::{Mesh, MeshRenderer, SceneNode, StaticEditorFlags, SubMesh, Transform};

    fn add_box(scene: &mut Scene, mesh: MeshId, position: Vec3, material: &str) -> NodeId {
        let mut node = SceneNode::new("box");
        node.static_flags = StaticEditorFlags::all();
        node.transform = Transform::from_position(position);
        node.renderer = Some(MeshRenderer::new(mesh, material));
        scene.add_node(node, None)
    }

    #[test]
    fn test_cell_key() {
        assert_eq!(cell_key(Vec3::new(5.0, -0.1, 19.9), 10, Vec3::ZERO), IVec3::new(0, -1, 1));
        assert_eq!(
            cell_key(Vec3::new(5.0, 5.0, 5.0), 10, Vec3::splat(5.0)),
            IVec3::ZERO
        );
        assert_eq!(
            cell_key(Vec3::new(4.9, 0.0, 0.0), 10, Vec3::splat(5.0)),
            IVec3::new(-1, -1, -1)
        );
    }

    #[test]
    fn test_groups_by_cell_and_material() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::cube("cube", 1.0));
        add_box(&mut scene, mesh, Vec3::new(1.0, 1.0, 1.0), "stone");
        add_box(&mut scene, mesh, Vec3::new(2.0, 1.0, 1.0), "stone");
        add_box(&mut scene, mesh, Vec3::new(3.0, 1.0, 1.0), "wood");
        add_box(&mut scene, mesh, Vec3::new(15.0, 1.0, 1.0), "stone");

        let mut settings = MeshCombinerSettings::default();
        settings.output.cell_size = 10;
        let found = search(&scene, &settings, None);
        let index = CellIndex::build(&scene, &found, &settings);

        assert_eq!(index.cell_count(), 2);
        assert_eq!(index.group_count(), 3);
        assert_eq!(index.groups_in_cell(IVec3::ZERO), 2);
        let conditions = index.found_combine_conditions();
        assert_eq!(conditions.material_count, 2);
        assert_eq!(conditions.combine_conditions_count, 2);
        assert_eq!(conditions.cell_count, 2);
    }

    #[test]
    fn test_sub_meshes_become_entries() {
        let mut scene = Scene::new();
        let mut mesh = Mesh::cube("cube", 1.0);
        let indices = mesh.sub_meshes[0].indices.split_off(18);
        mesh.sub_meshes.push(SubMesh::new(indices));
        let mesh = scene.add_mesh(mesh);
        let node = add_box(&mut scene, mesh, Vec3::ZERO, "stone");
        scene.nodes[node.index()]
            .renderer
            .as_mut()
            .unwrap()
            .materials
            .push("glass".to_string());

        let settings = MeshCombinerSettings::default();
        let index = CellIndex::build(&scene, &search(&scene, &settings, None), &settings);
        assert_eq!(index.group_count(), 2);
        assert!(index.groups().all(|g| g.entries.len() == 1));
    }
}
