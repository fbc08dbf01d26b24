// src/errors.rs

//! Crate-wide error types.
//!
//! [`GraphError`] covers everything reported synchronously: recording misuse,
//! finalize validation, submission checks and the manifest front-end.
//! [`ExecutionError`] is only ever delivered through a completion handle.

use thiserror::Error;

use crate::types::{ExecutionContext, GraphId, NodeId, QueueId};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("queue {queue} is already recording into graph {graph}")]
    AlreadyRecording { queue: QueueId, graph: GraphId },

    #[error("queue {queue} is not recording into graph {graph}")]
    NotRecording { queue: QueueId, graph: GraphId },

    #[error("node {node} depends on {dependency}, which cannot be resolved in this graph")]
    DanglingDependency { node: NodeId, dependency: NodeId },

    #[error("cycle detected in graph involving nodes [{}]", format_nodes(.nodes))]
    CyclicGraph { nodes: Vec<NodeId> },

    #[error("execution context mismatch: expected {expected}, got {actual}")]
    ContextMismatch {
        expected: ExecutionContext,
        actual: ExecutionContext,
    },

    #[error("node {node} has not been executed and cannot gate an immediate submission")]
    UnsubmittedDependency { node: NodeId },

    #[error("invalid command group: {0}")]
    InvalidCommandGroup(String),

    #[error("runtime unavailable: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of submitted work, observed through a completion handle.
///
/// A failed node fails every node that depends on it with the same error, so
/// the handle of a whole submission reports the root cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("host task '{name}' failed: {message}")]
    HostTask { name: String, message: String },

    #[error("command '{name}' panicked")]
    Panicked { name: String },

    #[error("{operation} out of bounds: {detail}")]
    OutOfBounds { operation: String, detail: String },

    #[error("work was dropped before it signalled completion")]
    Abandoned,

    #[error("node {node} was never submitted; only execution handles can be waited on")]
    Unsubmitted { node: NodeId },
}

fn format_nodes(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GraphError>;
