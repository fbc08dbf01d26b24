// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod queue;
pub mod types;

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::Manifest;
use crate::config::{ManifestGraph, build_graph};
use crate::context::{ContextManager, ContextOptions};
use crate::exec::HostExecutor;
use crate::graph::ExecutableGraph;
use crate::queue::Queue;
use crate::types::DeviceId;

pub use crate::errors::{ExecutionError, GraphError};
pub use crate::exec::{CompletionHandle, DeviceBuffer, DeviceExecutor};
pub use crate::graph::{CommandGroup, Graph, NodePayload};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading
/// - native context, host executor and queue
/// - graph building and finalize
/// - repeated submission
pub async fn run(args: CliArgs) -> Result<()> {
    let manifest = load_and_validate(&args.manifest)?;
    let repeat = args.repeat.unwrap_or(manifest.config.repeat);
    if repeat == 0 {
        bail!("--repeat must be >= 1");
    }

    let queue = host_queue(&manifest)?;
    let built = build_graph(&manifest, &queue)?;
    let exec = built.graph.finalize()?;

    if args.dry_run {
        print_dry_run(&manifest, &built, &exec);
        return Ok(());
    }

    run_repeated(&exec, &queue, repeat).await?;
    print_buffers(&built);
    Ok(())
}

/// Submit `exec` `repeat` times, waiting for each instance before the next.
pub async fn run_repeated(exec: &ExecutableGraph, queue: &Queue, repeat: usize) -> Result<()> {
    for round in 1..=repeat {
        let handle = exec.submit(queue)?;
        handle.wait().await?;
        info!(exec = %exec.id(), round, repeat, "graph instance completed");
    }
    Ok(())
}

/// Build, finalize and run `manifest` on a fresh host executor, returning
/// the built graph so callers can inspect the buffers.
pub async fn execute_manifest(manifest: &Manifest, repeat: usize) -> Result<ManifestGraph> {
    let queue = host_queue(manifest)?;
    let built = build_graph(manifest, &queue)?;
    let exec = built.graph.finalize()?;
    run_repeated(&exec, &queue, repeat).await?;
    Ok(built)
}

/// A queue on a fresh native context for the manifest's device.
fn host_queue(manifest: &Manifest) -> Result<Queue> {
    let manager = ContextManager::new();
    let native = manager.create_context(
        DeviceId(manifest.config.device),
        ContextOptions::default(),
    );
    let executor = Arc::new(HostExecutor::new(native)?);
    Ok(Queue::new(executor))
}

/// Dry-run output: buffers, nodes and the finalized schedule.
fn print_dry_run(manifest: &Manifest, built: &ManifestGraph, exec: &ExecutableGraph) {
    println!("devgraph dry-run");
    println!("  config.device = {}", manifest.config.device);
    println!("  config.repeat = {}", manifest.config.repeat);
    println!();

    println!("buffers ({}):", manifest.buffer.len());
    for b in &manifest.buffer {
        println!("  - {} (len {}, init {})", b.name, b.len, b.init);
    }
    println!();

    println!("schedule ({} nodes):", exec.len());
    for (pos, id) in exec.schedule().into_iter().enumerate() {
        let name = built.name_of(id).unwrap_or("?");
        let kind = manifest
            .node(name)
            .map(|n| format!("{:?}", n.kind).to_lowercase())
            .unwrap_or_default();
        let preds: Vec<&str> = exec
            .predecessors_of(id)
            .into_iter()
            .map(|p| built.name_of(p).unwrap_or("?"))
            .collect();
        if preds.is_empty() {
            println!("  {pos}: {name} [{kind}]");
        } else {
            println!("  {pos}: {name} [{kind}] after {preds:?}");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_buffers(built: &ManifestGraph) {
    for (name, buffer) in &built.buffers {
        println!("{name} = {:?}", buffer.to_vec());
    }
}
