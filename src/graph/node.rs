// src/graph/node.rs

//! Node payloads and per-node metadata.

use crate::exec::backend::{HostTask, KernelLaunch, MemCopy, MemFill};
use crate::exec::completion::{CompletionHandle, CompletionSignal, NodeSlot};
use crate::graph::executable::ExecutableGraph;
use crate::types::{NodeId, QueueId};

/// The work a node performs. Exactly one variant per node.
#[derive(Debug, Clone)]
pub enum NodePayload {
    Kernel(KernelLaunch),
    MemCopy(MemCopy),
    Fill(MemFill),
    HostTask(HostTask),
    /// No work; useful as a join point.
    Empty,
    /// Run another executable graph as a single step.
    SubGraph(ExecutableGraph),
}

impl NodePayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodePayload::Kernel(_) => "kernel",
            NodePayload::MemCopy(_) => "memcpy",
            NodePayload::Fill(_) => "fill",
            NodePayload::HostTask(_) => "host_task",
            NodePayload::Empty => "empty",
            NodePayload::SubGraph(_) => "subgraph",
        }
    }
}

/// How a node entered its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrigin {
    Explicit,
    Recorded { queue: QueueId },
}

/// A dependency as supplied by a caller.
#[derive(Debug, Clone)]
pub enum Dependency {
    Node(NodeId),
    Handle(CompletionHandle),
}

impl From<NodeId> for Dependency {
    fn from(node: NodeId) -> Self {
        Dependency::Node(node)
    }
}

impl From<CompletionHandle> for Dependency {
    fn from(handle: CompletionHandle) -> Self {
        Dependency::Handle(handle)
    }
}

impl From<&CompletionHandle> for Dependency {
    fn from(handle: &CompletionHandle) -> Self {
        Dependency::Handle(handle.clone())
    }
}

/// Dependencies split by how they are resolved.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedDeps {
    /// Node tokens, possibly owned by another graph.
    pub nodes: Vec<NodeId>,
    /// Live execution signals.
    pub signals: Vec<CompletionSignal>,
}

impl ResolvedDeps {
    pub fn from_dependencies(deps: impl IntoIterator<Item = Dependency>) -> Self {
        let mut resolved = Self::default();
        for dep in deps {
            match dep {
                Dependency::Node(id) => resolved.push_node(id),
                Dependency::Handle(handle) => match (handle.node(), handle.signal()) {
                    (Some(id), _) => resolved.push_node(id),
                    (None, Some(signal)) => resolved.signals.push(signal.clone()),
                    (None, None) => {}
                },
            }
        }
        resolved
    }

    pub fn push_node(&mut self, id: NodeId) {
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }
}

/// A node stored in a graph. Immutable once created.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) payload: NodePayload,
    pub(crate) origin: NodeOrigin,
    pub(crate) deps: ResolvedDeps,
    /// Shared with every handle for this node and every scheduled copy.
    pub(crate) slot: NodeSlot,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn payload(&self) -> &NodePayload {
        &self.payload
    }

    pub fn origin(&self) -> NodeOrigin {
        self.origin
    }

    /// Declared node predecessors (recording chain included).
    pub fn node_dependencies(&self) -> &[NodeId] {
        &self.deps.nodes
    }

    /// Number of external execution signals this node waits for.
    pub fn external_dependency_count(&self) -> usize {
        self.deps.signals.len()
    }
}
