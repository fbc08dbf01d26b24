pub mod builders;
pub mod fake_executor;

use std::sync::{Arc, Once};

use devgraph::context::{ContextManager, ContextOptions};
use devgraph::exec::HostExecutor;
use devgraph::queue::Queue;
use devgraph::types::DeviceId;
use tracing_subscriber::{EnvFilter, fmt};

pub use fake_executor::{TraceEvent, TraceExecutor};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A queue on a fresh `HostExecutor` for device 0. Must be called from
/// inside a Tokio runtime.
pub fn host_queue() -> Queue {
    let manager = ContextManager::new();
    let native = manager.create_context(DeviceId(0), ContextOptions::default());
    let executor = HostExecutor::new(native).expect("tests run inside a tokio runtime");
    Queue::new(Arc::new(executor))
}

/// A queue on `executor`.
pub fn trace_queue(executor: &TraceExecutor) -> Queue {
    Queue::new(executor.shared())
}
