use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devgraph::errors::ExecutionError;
use devgraph::exec::backend::{DeviceCommand, DeviceExecutor};
use devgraph::exec::completion::{CompletionSignal, signal_pair, wait_all};
use devgraph::exec::host::run_command;
use devgraph::types::{ContextId, DeviceId, ExecutionContext, QueueId};
use tokio::runtime::Handle;

/// One observed step of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Started(String),
    Finished(String),
}

#[derive(Debug)]
struct TraceInner {
    context: ExecutionContext,
    runtime: Handle,
    events: Mutex<Vec<TraceEvent>>,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, ExecutionError>>,
    enqueued: Mutex<usize>,
}

/// A fake device executor that:
/// - runs commands with the host semantics,
/// - records when each non-barrier command starts and finishes,
/// - can delay or fail commands by label,
/// - reports whatever execution context it was built with.
#[derive(Debug, Clone)]
pub struct TraceExecutor {
    inner: Arc<TraceInner>,
}

impl TraceExecutor {
    /// Must be called from inside a Tokio runtime.
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(TraceInner {
                context,
                runtime: Handle::current(),
                events: Mutex::new(Vec::new()),
                delays: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                enqueued: Mutex::new(0),
            }),
        }
    }

    pub fn with_ids(device: u32, context: u64) -> Self {
        Self::new(ExecutionContext::new(DeviceId(device), ContextId(context)))
    }

    pub fn set_delay(&self, label: &str, delay: Duration) {
        self.inner
            .delays
            .lock()
            .unwrap()
            .insert(label.to_string(), delay);
    }

    pub fn fail_on(&self, label: &str, err: ExecutionError) {
        self.inner
            .failures
            .lock()
            .unwrap()
            .insert(label.to_string(), err);
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.inner.events.lock().unwrap().clear();
    }

    /// Labels in the order they started.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::Started(l) => Some(l),
                TraceEvent::Finished(_) => None,
            })
            .collect()
    }

    /// Labels in the order they finished.
    pub fn finished(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::Finished(l) => Some(l),
                TraceEvent::Started(_) => None,
            })
            .collect()
    }

    /// Index of the first matching event, if any.
    pub fn position(&self, event: &TraceEvent) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Total number of commands handed to this executor, barriers included.
    pub fn enqueued(&self) -> usize {
        *self.inner.enqueued.lock().unwrap()
    }

    pub fn shared(&self) -> Arc<dyn DeviceExecutor> {
        Arc::new(self.clone())
    }
}

impl DeviceExecutor for TraceExecutor {
    fn context_of(&self, _queue: QueueId) -> ExecutionContext {
        self.inner.context
    }

    fn enqueue(
        &self,
        command: DeviceCommand,
        predecessors: Vec<CompletionSignal>,
    ) -> CompletionSignal {
        *self.inner.enqueued.lock().unwrap() += 1;
        let (notifier, signal) = signal_pair();
        let inner = Arc::clone(&self.inner);

        inner.runtime.clone().spawn(async move {
            if let Err(err) = wait_all(&predecessors).await {
                notifier.complete(Err(err));
                return;
            }

            let traced = !matches!(command, DeviceCommand::Barrier);
            let label = command.label().to_string();
            if traced {
                inner
                    .events
                    .lock()
                    .unwrap()
                    .push(TraceEvent::Started(label.clone()));
            }

            let delay = inner.delays.lock().unwrap().get(&label).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let injected = inner.failures.lock().unwrap().get(&label).cloned();
            let result = match injected {
                Some(err) => Err(err),
                None => run_command(command).await,
            };

            if traced {
                inner
                    .events
                    .lock()
                    .unwrap()
                    .push(TraceEvent::Finished(label));
            }
            notifier.complete(result);
        });

        signal
    }
}
