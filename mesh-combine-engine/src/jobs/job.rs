//! Combine jobs and their outcomes

use crate::cells::{GroupScope, LodSlot};
use crate::conditions::OutputAttributes;
use crate::error::Result;
use crate::merge::{MergeOutput, MergeSettings, MergeSource, MeshBufferPool, merge_group};
use mesh_combine_core::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One combine group ready to merge
#[derive(Debug, Clone)]
pub struct MeshCombineJob {
    pub id: u64,
    /// Combine run this job belongs to; aborting the run retires it
    pub generation: u64,
    pub name: String,
    pub scope: GroupScope,
    pub lod: Option<LodSlot>,
    pub output: OutputAttributes,
    pub sources: Vec<MergeSource>,
    pub settings: Arc<MergeSettings>,
}

impl MeshCombineJob {
    /// Everything about the job except its geometry
    pub fn header(&self) -> JobHeader {
        let mut source_nodes: Vec<NodeId> = self.sources.iter().map(|s| s.node).collect();
        source_nodes.dedup();
        JobHeader {
            id: self.id,
            generation: self.generation,
            name: self.name.clone(),
            scope: self.scope,
            lod: self.lod,
            output: self.output.clone(),
            source_nodes,
        }
    }

    /// Source vertices referenced by this job, before any pass
    pub fn source_vertex_count(&self) -> usize {
        self.sources.iter().map(|s| s.mesh.vertex_count()).sum()
    }

    pub fn run(&self, pool: &MeshBufferPool) -> Result<MergeOutput> {
        merge_group(&self.sources, &self.settings, pool)
    }
}

/// Identity of a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHeader {
    pub id: u64,
    pub generation: u64,
    pub name: String,
    pub scope: GroupScope,
    pub lod: Option<LodSlot>,
    pub output: OutputAttributes,
    /// Every node that fed the job, culled or not
    pub source_nodes: Vec<NodeId>,
}

/// A finished job
#[derive(Debug)]
pub struct JobOutcome {
    pub header: JobHeader,
    /// Worker index, `None` when run on the dispatching thread
    pub worker: Option<usize>,
    pub duration: Duration,
    pub result: Result<MergeOutput>,
}

/// A job that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job: u64,
    pub name: String,
    pub worker: Option<usize>,
    pub message: String,
}

impl JobFailure {
    pub fn new(header: &JobHeader, worker: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            job: header.id,
            name: header.name.clone(),
            worker,
            message: message.into(),
        }
    }
}
