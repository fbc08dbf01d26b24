// src/graph/executable.rs

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::exec::completion::{CompletionHandle, CompletionSignal, NodeSlot};
use crate::exec::launch;
use crate::graph::node::NodePayload;
use crate::queue::Queue;
use crate::types::{ExecGraphId, ExecutionContext, GraphId, NodeId};

/// One node of an executable graph, with dependencies resolved to schedule
/// positions.
#[derive(Debug, Clone)]
pub(crate) struct ScheduledNode {
    pub id: NodeId,
    pub payload: NodePayload,
    /// Positions (in the schedule) of every predecessor. Always smaller than
    /// this node's own position.
    pub predecessors: Vec<usize>,
    /// Signals of already-submitted work this node waits for.
    pub external: Vec<CompletionSignal>,
    /// Receives this node's signal on every launch.
    pub slot: NodeSlot,
}

#[derive(Debug)]
struct ExecutableInner {
    id: ExecGraphId,
    source: GraphId,
    context: ExecutionContext,
    nodes: Vec<ScheduledNode>,
}

/// Immutable, validated snapshot of a graph, ready to be submitted any
/// number of times.
///
/// Later changes to the source graph are not reflected here. Cloning is
/// cheap and shares the snapshot.
#[derive(Clone)]
pub struct ExecutableGraph {
    inner: Arc<ExecutableInner>,
}

impl ExecutableGraph {
    pub(crate) fn new(
        source: GraphId,
        context: ExecutionContext,
        nodes: Vec<ScheduledNode>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutableInner {
                id: ExecGraphId::next(),
                source,
                context,
                nodes,
            }),
        }
    }

    pub fn id(&self) -> ExecGraphId {
        self.inner.id
    }

    /// Graph this snapshot was finalized from.
    pub fn source_graph(&self) -> GraphId {
        self.inner.source
    }

    pub fn context(&self) -> ExecutionContext {
        self.inner.context
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    /// Node ids in dispatch order. Every node appears after all of its
    /// predecessors.
    pub fn schedule(&self) -> Vec<NodeId> {
        self.inner.nodes.iter().map(|n| n.id).collect()
    }

    pub fn position_of(&self, node: NodeId) -> Option<usize> {
        self.inner.nodes.iter().position(|n| n.id == node)
    }

    /// Predecessors of `node` inside this snapshot.
    pub fn predecessors_of(&self, node: NodeId) -> Vec<NodeId> {
        let Some(pos) = self.position_of(node) else {
            return Vec::new();
        };
        self.inner.nodes[pos]
            .predecessors
            .iter()
            .map(|p| self.inner.nodes[*p].id)
            .collect()
    }

    pub(crate) fn scheduled(&self) -> &[ScheduledNode] {
        &self.inner.nodes
    }

    /// Submit one instance of this graph to `queue`.
    ///
    /// Equivalent to [`Queue::submit_graph`].
    pub fn submit(&self, queue: &Queue) -> Result<CompletionHandle> {
        launch::submit(self, queue)
    }
}

impl fmt::Debug for ExecutableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableGraph")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("context", &self.inner.context)
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}
