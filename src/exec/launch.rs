// src/exec/launch.rs

//! Turning payloads and executable graphs into device work.

use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::backend::{DeviceCommand, DeviceExecutor};
use crate::exec::completion::{CompletionHandle, CompletionSignal};
use crate::graph::executable::ExecutableGraph;
use crate::graph::node::NodePayload;
use crate::queue::Queue;
use crate::types::next_instance_id;

/// Submit one instance of `graph` to `queue`.
pub fn submit(graph: &ExecutableGraph, queue: &Queue) -> Result<CompletionHandle> {
    queue.submit_graph(graph)
}

/// Hand one payload to `executor`, gated on `predecessors`.
pub(crate) fn dispatch_payload(
    payload: &NodePayload,
    executor: &dyn DeviceExecutor,
    predecessors: Vec<CompletionSignal>,
) -> CompletionSignal {
    match payload {
        NodePayload::Kernel(kernel) => {
            executor.enqueue(DeviceCommand::Kernel(kernel.clone()), predecessors)
        }
        NodePayload::MemCopy(copy) => {
            executor.enqueue(DeviceCommand::MemCopy(copy.clone()), predecessors)
        }
        NodePayload::Fill(fill) => executor.enqueue(DeviceCommand::Fill(fill.clone()), predecessors),
        NodePayload::HostTask(task) => {
            executor.enqueue(DeviceCommand::HostTask(task.clone()), predecessors)
        }
        NodePayload::Empty => executor.enqueue(DeviceCommand::Barrier, predecessors),
        NodePayload::SubGraph(child) => launch_instance(child, executor, predecessors),
    }
}

/// Dispatch every node of `graph` as a fresh instance.
///
/// Nodes are handed over in schedule order, so each node's predecessor
/// signals already exist when it is dispatched. Nodes without in-graph
/// predecessors additionally wait for `gate`. Each node's signal is published
/// to the node's handles. The returned signal is a barrier over all node
/// signals of this instance.
pub(crate) fn launch_instance(
    graph: &ExecutableGraph,
    executor: &dyn DeviceExecutor,
    gate: Vec<CompletionSignal>,
) -> CompletionSignal {
    let instance = next_instance_id();
    info!(
        exec = %graph.id(),
        instance,
        nodes = graph.len(),
        "launching graph instance"
    );

    if graph.is_empty() {
        return executor.enqueue(DeviceCommand::Barrier, gate);
    }

    let mut signals: Vec<CompletionSignal> = Vec::with_capacity(graph.len());
    for node in graph.scheduled() {
        let mut preds: Vec<CompletionSignal> = node
            .predecessors
            .iter()
            .map(|pos| signals[*pos].clone())
            .collect();
        preds.extend(node.external.iter().cloned());
        if node.predecessors.is_empty() {
            preds.extend(gate.iter().cloned());
        }

        debug!(
            instance,
            node = %node.id,
            kind = node.payload.kind_name(),
            waits = preds.len(),
            "dispatching node"
        );
        let signal = dispatch_payload(&node.payload, executor, preds);
        node.slot.publish(signal.clone());
        signals.push(signal);
    }

    executor.enqueue(DeviceCommand::Barrier, signals)
}
