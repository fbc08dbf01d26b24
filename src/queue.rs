// src/queue.rs

//! Execution queues.
//!
//! A queue is bound to one device executor. Submissions either run
//! immediately on that executor or, while a graph is recording the queue,
//! are turned into graph nodes instead.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{GraphError, Result};
use crate::exec::backend::DeviceExecutor;
use crate::exec::completion::CompletionHandle;
use crate::exec::launch::dispatch_payload;
use crate::graph::builder::GraphShared;
use crate::graph::command_group::CommandGroup;
use crate::graph::executable::ExecutableGraph;
use crate::graph::node::{Dependency, NodeOrigin, NodePayload, ResolvedDeps};
use crate::types::{ExecutionContext, GraphId, NodeId, QueueId};

/// The graph a queue is recording into, plus the last node recorded in this
/// session (the implicit predecessor of the next one).
struct RecordingBinding {
    graph: Arc<GraphShared>,
    last: Option<NodeId>,
}

pub(crate) struct QueueInner {
    id: QueueId,
    context: ExecutionContext,
    executor: Arc<dyn DeviceExecutor>,
    /// At most one graph at a time. Locked before the graph's own state.
    recording: Mutex<Option<RecordingBinding>>,
}

impl fmt::Debug for QueueInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueInner")
            .field("id", &self.id)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Cheaply cloneable handle to an execution queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Queue {
    /// Create a queue on `executor` and make the executor's context current
    /// on the calling thread.
    pub fn new(executor: Arc<dyn DeviceExecutor>) -> Self {
        let id = QueueId::next();
        let context = executor.context_of(id);
        executor.bind_current_thread();
        debug!(queue = %id, %context, "queue created");

        Self {
            inner: Arc::new(QueueInner {
                id,
                context,
                executor,
                recording: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<QueueInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    pub fn context(&self) -> ExecutionContext {
        self.inner.context
    }

    pub fn executor(&self) -> &Arc<dyn DeviceExecutor> {
        &self.inner.executor
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.lock().is_some()
    }

    /// The graph this queue is recording into, if any.
    pub fn recording_graph(&self) -> Option<GraphId> {
        self.inner.recording.lock().as_ref().map(|b| b.graph.id())
    }

    /// Submit one command group.
    ///
    /// While recording, the group becomes a node of the recording graph that
    /// depends on the previous node recorded on this queue and on every
    /// `depends_on` dependency, and the returned handle is a node token.
    /// Otherwise the command is enqueued right away and the handle can be
    /// waited on.
    pub fn submit<F>(&self, build: F) -> Result<CompletionHandle>
    where
        F: FnOnce(&mut CommandGroup),
    {
        let mut group = CommandGroup::new();
        build(&mut group);
        let (payload, deps) = group.into_parts()?;
        self.submit_payload(payload, deps)
    }

    /// Submit an executable graph for execution on this queue.
    ///
    /// While recording, the whole graph is recorded as a single sub-graph
    /// node.
    pub fn submit_graph(&self, graph: &ExecutableGraph) -> Result<CompletionHandle> {
        self.check_context(graph.context())?;
        info!(
            queue = %self.id(),
            exec = %graph.id(),
            nodes = graph.len(),
            "submitting executable graph"
        );
        self.submit_payload(NodePayload::SubGraph(graph.clone()), Vec::new())
    }

    fn submit_payload(
        &self,
        payload: NodePayload,
        deps: Vec<Dependency>,
    ) -> Result<CompletionHandle> {
        {
            let mut slot = self.inner.recording.lock();
            if let Some(binding) = slot.as_mut() {
                let mut resolved = ResolvedDeps::default();
                if let Some(prev) = binding.last {
                    resolved.push_node(prev);
                }
                let explicit = ResolvedDeps::from_dependencies(deps);
                for node in explicit.nodes {
                    resolved.push_node(node);
                }
                resolved.signals = explicit.signals;

                let (node, node_slot) = binding.graph.push_node(
                    payload,
                    resolved,
                    NodeOrigin::Recorded {
                        queue: self.inner.id,
                    },
                );
                binding.last = Some(node);
                return Ok(CompletionHandle::for_node(node, node_slot));
            }
        }

        self.dispatch_immediate(payload, deps)
    }

    fn dispatch_immediate(
        &self,
        payload: NodePayload,
        deps: Vec<Dependency>,
    ) -> Result<CompletionHandle> {
        let resolved = ResolvedDeps::from_dependencies(deps);
        if let Some(node) = resolved.nodes.first() {
            return Err(GraphError::UnsubmittedDependency { node: *node });
        }
        if let NodePayload::SubGraph(graph) = &payload {
            self.check_context(graph.context())?;
        }

        debug!(
            queue = %self.id(),
            kind = payload.kind_name(),
            waits = resolved.signals.len(),
            "immediate submission"
        );
        let signal = dispatch_payload(&payload, self.inner.executor.as_ref(), resolved.signals);
        Ok(CompletionHandle::for_signal(signal))
    }

    fn check_context(&self, expected: ExecutionContext) -> Result<()> {
        if expected != self.context() {
            return Err(GraphError::ContextMismatch {
                expected,
                actual: self.context(),
            });
        }
        Ok(())
    }

    pub(crate) fn attach_recording(&self, graph: &Arc<GraphShared>) -> Result<()> {
        let mut slot = self.inner.recording.lock();
        if let Some(binding) = slot.as_ref() {
            return Err(GraphError::AlreadyRecording {
                queue: self.inner.id,
                graph: binding.graph.id(),
            });
        }

        graph.register_recording(self.inner.id, Arc::downgrade(&self.inner));
        *slot = Some(RecordingBinding {
            graph: Arc::clone(graph),
            last: None,
        });
        Ok(())
    }

    pub(crate) fn detach_recording(&self, graph: GraphId) -> Result<()> {
        let mut slot = self.inner.recording.lock();
        let Some(binding) = slot.take_if(|b| b.graph.id() == graph) else {
            return Err(GraphError::NotRecording {
                queue: self.inner.id,
                graph,
            });
        };

        binding.graph.unregister_recording(self.inner.id);
        Ok(())
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context)
            .field("recording", &self.recording_graph())
            .finish()
    }
}
