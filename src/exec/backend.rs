// src/exec/backend.rs

//! Pluggable device executor abstraction.
//!
//! The engine never runs work itself. Queues and executable-graph launches
//! hand [`DeviceCommand`]s to a [`DeviceExecutor`] together with the signals
//! the command must wait for, and get a signal back.
//!
//! - [`HostExecutor`](super::host::HostExecutor) is the in-process
//!   implementation shipped with the crate.
//! - Tests can provide their own implementation that, for example, records
//!   the order in which commands start and finish or injects failures.

use std::fmt;
use std::sync::Arc;

use crate::exec::buffer::DeviceBuffer;
use crate::exec::completion::CompletionSignal;
use crate::types::{ExecutionContext, QueueId};

/// Trait abstracting how commands reach a device.
pub trait DeviceExecutor: Send + Sync + fmt::Debug {
    /// Execution context that work submitted through `queue` runs under.
    fn context_of(&self, queue: QueueId) -> ExecutionContext;

    /// Dispatch `command` once every signal in `predecessors` has completed.
    ///
    /// Must return without waiting. If a predecessor fails, the command is
    /// skipped once every predecessor has settled, and the returned signal
    /// fails with the first predecessor error.
    fn enqueue(
        &self,
        command: DeviceCommand,
        predecessors: Vec<CompletionSignal>,
    ) -> CompletionSignal;

    /// Make this executor's native context current on the calling thread.
    fn bind_current_thread(&self) {}
}

/// Kernel body, invoked once per work-item index.
pub type KernelFn = dyn Fn(usize) + Send + Sync;

/// Host callback. Errors are reported through the completion handle.
pub type HostFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;

#[derive(Clone)]
pub struct KernelLaunch {
    pub name: String,
    pub range: usize,
    pub body: Arc<KernelFn>,
}

impl KernelLaunch {
    pub fn new<F>(name: impl Into<String>, range: usize, body: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            range,
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for KernelLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelLaunch")
            .field("name", &self.name)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Copy `len` cells from `src[src_offset..]` to `dst[dst_offset..]`.
#[derive(Debug, Clone)]
pub struct MemCopy {
    pub src: DeviceBuffer,
    pub src_offset: usize,
    pub dst: DeviceBuffer,
    pub dst_offset: usize,
    pub len: usize,
}

impl MemCopy {
    /// Copy the whole of `src` to the start of `dst`.
    pub fn whole(src: &DeviceBuffer, dst: &DeviceBuffer) -> Self {
        Self {
            src: src.clone(),
            src_offset: 0,
            dst: dst.clone(),
            dst_offset: 0,
            len: src.len(),
        }
    }
}

/// Set every cell of `dst` to `value`.
#[derive(Debug, Clone)]
pub struct MemFill {
    pub dst: DeviceBuffer,
    pub value: i64,
}

#[derive(Clone)]
pub struct HostTask {
    pub name: String,
    pub callback: Arc<HostFn>,
}

impl HostTask {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for HostTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A single command a device executor knows how to run.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    Kernel(KernelLaunch),
    MemCopy(MemCopy),
    Fill(MemFill),
    HostTask(HostTask),
    /// No work; completes once all predecessors have.
    Barrier,
}

impl DeviceCommand {
    /// Short human-readable label used in logs and traces.
    pub fn label(&self) -> &str {
        match self {
            DeviceCommand::Kernel(k) => &k.name,
            DeviceCommand::MemCopy(_) => "memcpy",
            DeviceCommand::Fill(_) => "fill",
            DeviceCommand::HostTask(h) => &h.name,
            DeviceCommand::Barrier => "barrier",
        }
    }
}
