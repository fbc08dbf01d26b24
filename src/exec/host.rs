// src/exec/host.rs

//! In-process device executor backed by the Tokio runtime.

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::context::NativeContext;
use crate::errors::{ExecutionError, GraphError, Result};
use crate::exec::backend::{DeviceCommand, DeviceExecutor, MemCopy, MemFill};
use crate::exec::completion::{CompletionSignal, signal_pair, wait_all};
use crate::types::{ExecutionContext, QueueId};

/// Simulated device that runs every command as its own Tokio task.
///
/// - Each enqueued command waits for all of its predecessors, then runs, or
///   fails with the first predecessor error. Commands with no path between
///   them run concurrently.
/// - Kernels and host tasks run on the blocking pool; a panic inside them
///   fails the command instead of the process.
/// - The executor keeps a reference to its native context alive.
#[derive(Debug)]
pub struct HostExecutor {
    runtime: Handle,
    native: NativeContext,
}

impl HostExecutor {
    /// Bind to the Tokio runtime the caller is running in.
    pub fn new(native: NativeContext) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| GraphError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(native, runtime))
    }

    pub fn with_runtime(native: NativeContext, runtime: Handle) -> Self {
        Self { runtime, native }
    }

    pub fn native_context(&self) -> &NativeContext {
        &self.native
    }
}

impl DeviceExecutor for HostExecutor {
    fn context_of(&self, _queue: QueueId) -> ExecutionContext {
        ExecutionContext::new(self.native.device(), self.native.id())
    }

    fn enqueue(
        &self,
        command: DeviceCommand,
        predecessors: Vec<CompletionSignal>,
    ) -> CompletionSignal {
        let (notifier, signal) = signal_pair();

        self.runtime.spawn(async move {
            if let Err(err) = wait_all(&predecessors).await {
                debug!(
                    command = command.label(),
                    error = %err,
                    "predecessor failed; skipping command"
                );
                notifier.complete(Err(err));
                return;
            }

            let result = run_command(command).await;
            notifier.complete(result);
        });

        signal
    }

    fn bind_current_thread(&self) {
        self.native.make_current();
    }
}

/// Run one command to completion on the current runtime.
///
/// Exposed so that wrapping executors (e.g. tracing fakes in tests) can reuse
/// the host semantics.
pub async fn run_command(command: DeviceCommand) -> std::result::Result<(), ExecutionError> {
    let label = command.label().to_string();
    debug!(command = %label, "running command");

    match command {
        DeviceCommand::Barrier => Ok(()),
        DeviceCommand::Fill(fill) => run_fill(&fill),
        DeviceCommand::MemCopy(copy) => run_copy(&copy),
        DeviceCommand::Kernel(kernel) => {
            let joined = tokio::task::spawn_blocking(move || {
                for index in 0..kernel.range {
                    (kernel.body)(index);
                }
            })
            .await;
            joined.map_err(|_| {
                warn!(command = %label, "kernel panicked");
                ExecutionError::Panicked { name: label }
            })
        }
        DeviceCommand::HostTask(task) => {
            let name = task.name.clone();
            let joined = tokio::task::spawn_blocking(move || (task.callback)()).await;
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    warn!(command = %name, error = %err, "host task failed");
                    Err(ExecutionError::HostTask {
                        name,
                        message: format!("{err:#}"),
                    })
                }
                Err(_) => {
                    warn!(command = %name, "host task panicked");
                    Err(ExecutionError::Panicked { name })
                }
            }
        }
    }
}

fn run_fill(fill: &MemFill) -> std::result::Result<(), ExecutionError> {
    for index in 0..fill.dst.len() {
        fill.dst.set(index, fill.value);
    }
    Ok(())
}

fn run_copy(copy: &MemCopy) -> std::result::Result<(), ExecutionError> {
    let src_end = copy.src_offset.checked_add(copy.len);
    let dst_end = copy.dst_offset.checked_add(copy.len);

    if src_end.is_none_or(|end| end > copy.src.len()) {
        return Err(ExecutionError::OutOfBounds {
            operation: "memcpy".to_string(),
            detail: format!(
                "source range {}..+{} exceeds length {}",
                copy.src_offset,
                copy.len,
                copy.src.len()
            ),
        });
    }
    if dst_end.is_none_or(|end| end > copy.dst.len()) {
        return Err(ExecutionError::OutOfBounds {
            operation: "memcpy".to_string(),
            detail: format!(
                "destination range {}..+{} exceeds length {}",
                copy.dst_offset,
                copy.len,
                copy.dst.len()
            ),
        });
    }

    // Snapshot first so overlapping copies within one buffer behave like memmove.
    let values: Vec<i64> = (0..copy.len)
        .map(|i| copy.src.get(copy.src_offset + i))
        .collect();
    for (i, value) in values.into_iter().enumerate() {
        copy.dst.set(copy.dst_offset + i, value);
    }
    Ok(())
}
