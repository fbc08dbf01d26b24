// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the `DeviceExecutor` trait and the commands it
//!   runs. Tests replace the shipped executor with a fake implementation.
//! - [`host`] is the in-process `HostExecutor`.
//! - [`completion`] holds completion signals and handles.
//! - [`launch`] dispatches payloads and executable-graph instances.
//! - [`buffer`] is the simulated device memory kernels act on.

pub mod backend;
pub mod buffer;
pub mod completion;
pub mod host;
pub mod launch;

pub use backend::{DeviceCommand, DeviceExecutor, HostTask, KernelLaunch, MemCopy, MemFill};
pub use buffer::DeviceBuffer;
pub use completion::{
    CompletionHandle, CompletionNotifier, CompletionSignal, SignalState, signal_pair, wait_all,
};
pub use host::HostExecutor;
pub use launch::submit;
