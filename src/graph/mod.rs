// src/graph/mod.rs

//! Graph construction, validation and the executable form.
//!
//! - [`builder`] holds [`Graph`], the open graph that both explicit
//!   `add_node` calls and recording queues append to.
//! - [`command_group`] is the closure-facing handler used by queue submission
//!   and `Graph::add`.
//! - [`node`] defines payloads, dependencies and stored nodes.
//! - [`finalize`] validates a graph and computes its schedule.
//! - [`executable`] is the immutable, submittable result.

pub mod builder;
pub mod command_group;
pub mod executable;
pub mod finalize;
pub mod node;

pub use builder::Graph;
pub use command_group::CommandGroup;
pub use executable::ExecutableGraph;
pub use finalize::finalize;
pub use node::{Dependency, Node, NodeOrigin, NodePayload};
