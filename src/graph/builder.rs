// src/graph/builder.rs

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{GraphError, Result};
use crate::exec::completion::{CompletionHandle, NodeSlot};
use crate::graph::command_group::CommandGroup;
use crate::graph::executable::ExecutableGraph;
use crate::graph::finalize;
use crate::graph::node::{Dependency, Node, NodeOrigin, NodePayload, ResolvedDeps};
use crate::queue::{Queue, QueueInner};
use crate::types::{ExecutionContext, GraphId, NodeId, QueueId};

/// Mutable part of a graph. Guarded because recording queues append to it
/// from whichever thread submits through them.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    nodes: Vec<Node>,
    /// Extra edges from `make_edge`, as (from, to).
    edges: Vec<(NodeId, NodeId)>,
    /// Queues currently funnelling submissions into this graph.
    recording: Vec<(QueueId, Weak<QueueInner>)>,
}

#[derive(Debug)]
pub(crate) struct GraphShared {
    id: GraphId,
    context: ExecutionContext,
    state: Mutex<GraphState>,
}

impl GraphShared {
    pub(crate) fn id(&self) -> GraphId {
        self.id
    }

    pub(crate) fn push_node(
        &self,
        payload: NodePayload,
        deps: ResolvedDeps,
        origin: NodeOrigin,
    ) -> (NodeId, NodeSlot) {
        let mut state = self.state.lock();
        let id = NodeId::new(self.id, state.nodes.len());
        debug!(
            node = %id,
            kind = payload.kind_name(),
            ?origin,
            deps = deps.nodes.len(),
            external = deps.signals.len(),
            "node added"
        );
        let slot = NodeSlot::default();
        state.nodes.push(Node {
            id,
            payload,
            origin,
            deps,
            slot: slot.clone(),
        });
        (id, slot)
    }

    pub(crate) fn register_recording(&self, queue: QueueId, inner: Weak<QueueInner>) {
        self.state.lock().recording.push((queue, inner));
    }

    pub(crate) fn unregister_recording(&self, queue: QueueId) {
        self.state.lock().recording.retain(|(q, _)| *q != queue);
    }
}

/// Point-in-time copy of a graph, taken by the finalizer.
#[derive(Debug, Clone)]
pub(crate) struct GraphSnapshot {
    pub id: GraphId,
    pub context: ExecutionContext,
    pub nodes: Vec<Node>,
    pub edges: Vec<(NodeId, NodeId)>,
}

/// An open, mutable graph of device work.
///
/// Nodes are appended either explicitly ([`add_node`](Self::add_node),
/// [`add`](Self::add)) or by a queue that is recording into this graph. Both
/// styles produce the same kind of node and can depend on each other through
/// [`CompletionHandle`](crate::exec::CompletionHandle)s.
pub struct Graph {
    shared: Arc<GraphShared>,
}

impl Graph {
    /// Create an empty graph for `context`.
    pub fn new(context: ExecutionContext) -> Self {
        let id = GraphId::next();
        debug!(graph = %id, %context, "graph created");
        Self {
            shared: Arc::new(GraphShared {
                id,
                context,
                state: Mutex::new(GraphState::default()),
            }),
        }
    }

    /// Create an empty graph for the context of `queue`.
    pub fn for_queue(queue: &Queue) -> Self {
        Self::new(queue.context())
    }

    pub fn id(&self) -> GraphId {
        self.shared.id
    }

    pub fn context(&self) -> ExecutionContext {
        self.shared.context
    }

    pub fn node_count(&self) -> usize {
        self.shared.state.lock().nodes.len()
    }

    /// Copy of the node with the given id, if it belongs to this graph.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        if id.graph() != self.id() {
            return None;
        }
        self.shared.state.lock().nodes.get(id.index()).cloned()
    }

    /// Handle for a node of this graph.
    ///
    /// Usable as a dependency right away. After the graph has been finalized
    /// and submitted it also reports the node's execution in the latest
    /// instance. Ids of other graphs get a token that stays unsubmitted.
    pub fn handle(&self, id: NodeId) -> CompletionHandle {
        let state = self.shared.state.lock();
        match state.nodes.get(id.index()).filter(|n| n.id == id) {
            Some(node) => CompletionHandle::for_node(id, node.slot.clone()),
            None => CompletionHandle::from(id),
        }
    }

    /// All node predecessors of `id`: declared dependencies, recording order
    /// and `make_edge` edges.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let state = self.shared.state.lock();
        let Some(node) = state.nodes.get(id.index()).filter(|n| n.id == id) else {
            return Vec::new();
        };
        let mut preds = node.deps.nodes.clone();
        for (from, to) in &state.edges {
            if *to == id && !preds.contains(from) {
                preds.push(*from);
            }
        }
        preds
    }

    /// Append a node with the given dependencies.
    ///
    /// Dependencies may be nodes of this graph, handles returned by a queue
    /// that recorded into this graph, or handles of already-submitted work.
    /// References that cannot be resolved are accepted here and reported by
    /// [`finalize`](Self::finalize).
    pub fn add_node(
        &self,
        payload: NodePayload,
        dependencies: impl IntoIterator<Item = Dependency>,
    ) -> NodeId {
        let deps = ResolvedDeps::from_dependencies(dependencies);
        let (id, _) = self.shared.push_node(payload, deps, NodeOrigin::Explicit);
        id
    }

    /// Command-group form of [`add_node`](Self::add_node).
    pub fn add<F>(&self, build: F) -> Result<NodeId>
    where
        F: FnOnce(&mut CommandGroup),
    {
        let mut group = CommandGroup::new();
        build(&mut group);
        let (payload, deps) = group.into_parts()?;
        Ok(self.add_node(payload, deps))
    }

    /// Add an edge so that `from` completes before `to` begins.
    pub fn make_edge(&self, from: NodeId, to: NodeId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let known = |id: NodeId| id.graph() == self.shared.id && id.index() < state.nodes.len();

        if !known(to) {
            return Err(GraphError::DanglingDependency {
                node: from,
                dependency: to,
            });
        }
        if !known(from) {
            return Err(GraphError::DanglingDependency {
                node: to,
                dependency: from,
            });
        }

        if !state.edges.contains(&(from, to)) {
            state.edges.push((from, to));
            debug!(%from, %to, "edge added");
        }
        Ok(())
    }

    /// Start intercepting submissions on `queue` into this graph.
    pub fn begin_recording(&self, queue: &Queue) -> Result<()> {
        if queue.context() != self.context() {
            return Err(GraphError::ContextMismatch {
                expected: self.context(),
                actual: queue.context(),
            });
        }

        queue.attach_recording(&self.shared)?;
        info!(graph = %self.id(), queue = %queue.id(), "recording started");
        Ok(())
    }

    /// Stop intercepting submissions on `queue`.
    pub fn end_recording(&self, queue: &Queue) -> Result<()> {
        queue.detach_recording(self.id())?;
        info!(graph = %self.id(), queue = %queue.id(), "recording ended");
        Ok(())
    }

    /// Stop every recording into this graph.
    pub fn end_recording_all(&self) {
        let queues: Vec<_> = {
            let state = self.shared.state.lock();
            state.recording.iter().map(|(_, q)| q.clone()).collect()
        };

        for weak in queues {
            if let Some(inner) = weak.upgrade() {
                let queue = Queue::from_inner(inner);
                if let Err(err) = self.end_recording(&queue) {
                    debug!(graph = %self.id(), error = %err, "queue already detached");
                }
            }
        }
    }

    /// Whether `queue` is currently recording into this graph.
    pub fn is_recording(&self, queue: &Queue) -> bool {
        queue.recording_graph() == Some(self.id())
    }

    pub fn recording_queue_count(&self) -> usize {
        self.shared.state.lock().recording.len()
    }

    /// Validate and schedule the graph's current state.
    pub fn finalize(&self) -> Result<ExecutableGraph> {
        finalize::finalize(self)
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        let state = self.shared.state.lock();
        GraphSnapshot {
            id: self.shared.id,
            context: self.shared.context,
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        let recording = self.recording_queue_count();
        if recording > 0 {
            warn!(
                graph = %self.id(),
                queues = recording,
                "graph dropped while queues were still recording; ending those recordings"
            );
            self.end_recording_all();
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Graph")
            .field("id", &self.shared.id)
            .field("context", &self.shared.context)
            .field("nodes", &state.nodes.len())
            .field("edges", &state.edges.len())
            .field("recording", &state.recording.len())
            .finish()
    }
}
