// src/graph/command_group.rs

//! The per-submission handler shared by queue submission and graph building.

use crate::errors::{GraphError, Result};
use crate::exec::backend::{HostTask, KernelLaunch, MemCopy, MemFill};
use crate::exec::buffer::DeviceBuffer;
use crate::graph::executable::ExecutableGraph;
use crate::graph::node::{Dependency, NodePayload};

/// Collects one payload plus its dependencies.
///
/// Handed to the closure passed to [`Queue::submit`](crate::queue::Queue::submit)
/// and [`Graph::add`](crate::graph::Graph::add). A group without a payload
/// becomes an empty node; setting two payloads is an error reported when the
/// group is submitted.
#[derive(Debug, Default)]
pub struct CommandGroup {
    dependencies: Vec<Dependency>,
    payload: Option<NodePayload>,
    conflict: Option<&'static str>,
}

impl CommandGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order this group after `dep`.
    pub fn depends_on(&mut self, dep: impl Into<Dependency>) -> &mut Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn parallel_for<F>(&mut self, name: impl Into<String>, range: usize, body: F) -> &mut Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.set_payload(NodePayload::Kernel(KernelLaunch::new(name, range, body)))
    }

    pub fn fill(&mut self, dst: &DeviceBuffer, value: i64) -> &mut Self {
        self.set_payload(NodePayload::Fill(MemFill {
            dst: dst.clone(),
            value,
        }))
    }

    /// Copy the whole of `src` to the start of `dst`.
    pub fn copy(&mut self, src: &DeviceBuffer, dst: &DeviceBuffer) -> &mut Self {
        self.set_payload(NodePayload::MemCopy(MemCopy::whole(src, dst)))
    }

    pub fn copy_region(&mut self, copy: MemCopy) -> &mut Self {
        self.set_payload(NodePayload::MemCopy(copy))
    }

    pub fn host_task<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_payload(NodePayload::HostTask(HostTask::new(name, callback)))
    }

    pub fn execute_graph(&mut self, graph: &ExecutableGraph) -> &mut Self {
        self.set_payload(NodePayload::SubGraph(graph.clone()))
    }

    pub fn set_payload(&mut self, payload: NodePayload) -> &mut Self {
        if let Some(existing) = &self.payload {
            self.conflict.get_or_insert(existing.kind_name());
        } else {
            self.payload = Some(payload);
        }
        self
    }

    /// Consume the group, yielding its payload and dependencies.
    pub(crate) fn into_parts(self) -> Result<(NodePayload, Vec<Dependency>)> {
        if let Some(first) = self.conflict {
            return Err(GraphError::InvalidCommandGroup(format!(
                "a command group holds exactly one command, but a second one was added after '{first}'"
            )));
        }
        Ok((self.payload.unwrap_or(NodePayload::Empty), self.dependencies))
    }
}
