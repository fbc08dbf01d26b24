// src/config/build.rs

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::config::model::{Manifest, NodeKindSpec, NodeMode, NodeSpec};
use crate::errors::{GraphError, Result};
use crate::exec::backend::{HostTask, KernelLaunch, MemCopy, MemFill};
use crate::exec::buffer::DeviceBuffer;
use crate::exec::completion::CompletionHandle;
use crate::graph::{CommandGroup, Graph, NodePayload};
use crate::queue::Queue;
use crate::types::NodeId;

/// A graph built from a manifest, plus the buffers its nodes act on.
#[derive(Debug)]
pub struct ManifestGraph {
    pub graph: Graph,
    /// Buffers by name.
    pub buffers: BTreeMap<String, DeviceBuffer>,
    /// Node names in manifest order.
    nodes: Vec<(String, NodeId)>,
}

impl ManifestGraph {
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(_, n)| *n == id)
            .map(|(name, _)| name.as_str())
    }

    pub fn buffer(&self, name: &str) -> Option<&DeviceBuffer> {
        self.buffers.get(name)
    }
}

/// Build an open graph from `manifest`, recording `recorded` nodes through
/// `queue`.
///
/// Recorded nodes form one recording session, so each of them is chained
/// after the previous recorded node. The queue is back in immediate mode when
/// this returns, whether or not building succeeded.
pub fn build_graph(manifest: &Manifest, queue: &Queue) -> Result<ManifestGraph> {
    let buffers: BTreeMap<String, DeviceBuffer> = manifest
        .buffer
        .iter()
        .map(|b| (b.name.clone(), DeviceBuffer::new(b.len, b.init)))
        .collect();

    let graph = Graph::for_queue(queue);
    let recording = manifest.has_recorded_nodes();
    if recording {
        graph.begin_recording(queue)?;
    }

    let added = add_nodes(manifest, &graph, queue, &buffers);
    if recording {
        graph.end_recording(queue)?;
    }
    let nodes = added?;

    for edge in &manifest.edge {
        let from = lookup(&nodes, &edge.from)?;
        let to = lookup(&nodes, &edge.to)?;
        graph.make_edge(from, to)?;
    }

    info!(
        graph = %graph.id(),
        nodes = nodes.len(),
        buffers = buffers.len(),
        "graph built from manifest"
    );

    Ok(ManifestGraph {
        graph,
        buffers,
        nodes,
    })
}

fn add_nodes(
    manifest: &Manifest,
    graph: &Graph,
    queue: &Queue,
    buffers: &BTreeMap<String, DeviceBuffer>,
) -> Result<Vec<(String, NodeId)>> {
    let mut handles: HashMap<&str, CompletionHandle> = HashMap::new();
    let mut nodes = Vec::with_capacity(manifest.node.len());

    for spec in &manifest.node {
        let payload = payload_for(spec, buffers)?;
        let deps = spec
            .after
            .iter()
            .map(|name| {
                handles.get(name.as_str()).cloned().ok_or_else(|| {
                    GraphError::ConfigError(format!(
                        "node '{}' depends on '{}', which has not been added",
                        spec.name, name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fill_group = |cg: &mut CommandGroup| {
            for dep in &deps {
                cg.depends_on(dep);
            }
            cg.set_payload(payload);
        };

        let handle = match spec.mode {
            NodeMode::Recorded => queue.submit(fill_group)?,
            NodeMode::Explicit => graph.handle(graph.add(fill_group)?),
        };
        let id = handle.node().ok_or_else(|| {
            GraphError::ConfigError(format!(
                "node '{}' was executed instead of being added to the graph",
                spec.name
            ))
        })?;

        debug!(node = %id, name = %spec.name, mode = ?spec.mode, "manifest node added");
        handles.insert(spec.name.as_str(), handle);
        nodes.push((spec.name.clone(), id));
    }
    Ok(nodes)
}

fn lookup(nodes: &[(String, NodeId)], name: &str) -> Result<NodeId> {
    nodes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| GraphError::ConfigError(format!("unknown node '{name}'")))
}

fn buffer(
    spec: &NodeSpec,
    name: Option<&String>,
    buffers: &BTreeMap<String, DeviceBuffer>,
) -> Result<DeviceBuffer> {
    let name = name.ok_or_else(|| {
        GraphError::ConfigError(format!("node '{}' is missing a buffer reference", spec.name))
    })?;
    buffers.get(name).cloned().ok_or_else(|| {
        GraphError::ConfigError(format!(
            "node '{}' references unknown buffer '{}'",
            spec.name, name
        ))
    })
}

fn payload_for(spec: &NodeSpec, buffers: &BTreeMap<String, DeviceBuffer>) -> Result<NodePayload> {
    let payload = match spec.kind {
        NodeKindSpec::Fill => NodePayload::Fill(MemFill {
            dst: buffer(spec, spec.buffer.as_ref(), buffers)?,
            value: spec.value.unwrap_or_default(),
        }),
        NodeKindSpec::Copy => {
            let src = buffer(spec, spec.src.as_ref(), buffers)?;
            let dst = buffer(spec, spec.dst.as_ref(), buffers)?;
            NodePayload::MemCopy(MemCopy {
                len: spec.len.unwrap_or(src.len()),
                src,
                src_offset: 0,
                dst,
                dst_offset: 0,
            })
        }
        NodeKindSpec::Scale => {
            let buf = buffer(spec, spec.buffer.as_ref(), buffers)?;
            let factor = spec.factor.unwrap_or(1);
            let range = buf.len();
            NodePayload::Kernel(KernelLaunch::new(&spec.name, range, move |i| {
                buf.update(i, |v| v.wrapping_mul(factor));
            }))
        }
        NodeKindSpec::Add => {
            let buf = buffer(spec, spec.buffer.as_ref(), buffers)?;
            let value = spec.value.unwrap_or_default();
            let range = buf.len();
            NodePayload::Kernel(KernelLaunch::new(&spec.name, range, move |i| {
                buf.update(i, |v| v.wrapping_add(value));
            }))
        }
        NodeKindSpec::Iota => {
            let buf = buffer(spec, spec.buffer.as_ref(), buffers)?;
            let range = buf.len();
            NodePayload::Kernel(KernelLaunch::new(&spec.name, range, move |i| {
                buf.set(i, i as i64);
            }))
        }
        NodeKindSpec::Host => {
            let name = spec.name.clone();
            let message = spec.message.clone().unwrap_or_default();
            NodePayload::HostTask(HostTask::new(&spec.name, move || {
                info!(node = %name, "{message}");
                Ok(())
            }))
        }
        NodeKindSpec::Empty => NodePayload::Empty,
    };
    Ok(payload)
}
