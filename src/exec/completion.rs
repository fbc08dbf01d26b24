// src/exec/completion.rs

//! Completion signals and the handles callers hold on to.
//!
//! A [`CompletionSignal`] is the observable side of one unit of in-flight
//! work. Only the matching [`CompletionNotifier`] can complete it, and it is
//! consumed by doing so, so a signal transitions at most once.
//!
//! A [`CompletionHandle`] is what every submission returns. It is either a
//! token for a graph node or a wrapper around a live signal. A node token is
//! an edge while the graph is built, and follows the node's execution in the
//! most recently launched instance once the graph has been submitted.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::errors::ExecutionError;
use crate::types::NodeId;

/// Observable state of a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState {
    Pending,
    Complete,
    Failed(ExecutionError),
}

impl SignalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalState::Pending)
    }
}

/// Create a connected notifier/signal pair.
pub fn signal_pair() -> (CompletionNotifier, CompletionSignal) {
    let (tx, rx) = watch::channel(SignalState::Pending);
    (CompletionNotifier { tx }, CompletionSignal { rx })
}

/// Owner side of a signal. Dropping it without calling
/// [`complete`](Self::complete) marks the signal as abandoned.
#[derive(Debug)]
pub struct CompletionNotifier {
    tx: watch::Sender<SignalState>,
}

impl CompletionNotifier {
    pub fn complete(self, result: Result<(), ExecutionError>) {
        let state = match result {
            Ok(()) => SignalState::Complete,
            Err(err) => SignalState::Failed(err),
        };
        // `send_replace` stores the value even when nobody is listening yet.
        self.tx.send_replace(state);
    }
}

/// Shared, cloneable view of a unit of work's completion.
#[derive(Clone)]
pub struct CompletionSignal {
    rx: watch::Receiver<SignalState>,
}

impl CompletionSignal {
    /// A signal that is already complete.
    pub fn completed() -> Self {
        let (notifier, signal) = signal_pair();
        notifier.complete(Ok(()));
        signal
    }

    /// A signal that has already failed with `err`.
    pub fn failed(err: ExecutionError) -> Self {
        let (notifier, signal) = signal_pair();
        notifier.complete(Err(err));
        signal
    }

    /// Current state without waiting.
    pub fn status(&self) -> SignalState {
        let state = self.rx.borrow().clone();
        if state != SignalState::Pending || self.rx.has_changed().is_ok() {
            return state;
        }
        // The notifier is gone, but it may have stored a result after the
        // first read.
        match &*self.rx.borrow() {
            SignalState::Pending => SignalState::Failed(ExecutionError::Abandoned),
            settled => settled.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    /// Wait until the work has finished.
    pub async fn wait(&self) -> Result<(), ExecutionError> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(SignalState::is_terminal).await {
            Ok(state) => match &*state {
                SignalState::Failed(err) => Err(err.clone()),
                _ => Ok(()),
            },
            Err(_) => Err(ExecutionError::Abandoned),
        };
        outcome
    }
}

/// Wait for every signal in `signals`, then report the first failure in list
/// order, if any.
///
/// Never returns early, so work gated on the result starts only once all of
/// its predecessors have settled.
pub async fn wait_all(signals: &[CompletionSignal]) -> Result<(), ExecutionError> {
    let mut first_err = None;
    for signal in signals {
        if let Err(err) = signal.wait().await {
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("state", &*self.rx.borrow())
            .finish()
    }
}

/// Where a graph node publishes the signal of its latest launch.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeSlot(Arc<Mutex<Option<CompletionSignal>>>);

impl NodeSlot {
    pub(crate) fn publish(&self, signal: CompletionSignal) {
        *self.0.lock() = Some(signal);
    }

    pub(crate) fn current(&self) -> Option<CompletionSignal> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone)]
enum HandleKind {
    Node { node: NodeId, slot: NodeSlot },
    Signal(CompletionSignal),
}

/// Token returned by every submission.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    kind: HandleKind,
}

impl CompletionHandle {
    pub(crate) fn for_node(node: NodeId, slot: NodeSlot) -> Self {
        Self {
            kind: HandleKind::Node { node, slot },
        }
    }

    pub(crate) fn for_signal(signal: CompletionSignal) -> Self {
        Self {
            kind: HandleKind::Signal(signal),
        }
    }

    /// The graph node this handle stands for, if it was produced while
    /// building a graph.
    pub fn node(&self) -> Option<NodeId> {
        match &self.kind {
            HandleKind::Node { node, .. } => Some(*node),
            HandleKind::Signal(_) => None,
        }
    }

    /// The execution signal behind this handle, if the work was submitted.
    pub fn signal(&self) -> Option<&CompletionSignal> {
        match &self.kind {
            HandleKind::Node { .. } => None,
            HandleKind::Signal(signal) => Some(signal),
        }
    }

    /// Signal to observe: the handle's own, or for a node token the one from
    /// the node's latest launch.
    fn execution(&self) -> Result<CompletionSignal, ExecutionError> {
        match &self.kind {
            HandleKind::Node { node, slot } => slot
                .current()
                .ok_or(ExecutionError::Unsubmitted { node: *node }),
            HandleKind::Signal(signal) => Ok(signal.clone()),
        }
    }

    /// Current state. A node token whose graph has never been launched
    /// reports `Failed(Unsubmitted)`.
    pub fn status(&self) -> SignalState {
        match self.execution() {
            Ok(signal) => signal.status(),
            Err(err) => SignalState::Failed(err),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.execution().is_ok_and(|signal| signal.is_complete())
    }

    /// Wait for the submitted work.
    ///
    /// A node token waits for the node in the latest launched instance of a
    /// graph containing it, and fails with `Unsubmitted` if there is none yet.
    pub async fn wait(&self) -> Result<(), ExecutionError> {
        self.execution()?.wait().await
    }
}

/// A token for `node` that is not tied to any graph's launches. Use
/// [`Graph::handle`](crate::graph::Graph::handle) for one that is.
impl From<NodeId> for CompletionHandle {
    fn from(node: NodeId) -> Self {
        Self::for_node(node, NodeSlot::default())
    }
}

impl From<CompletionSignal> for CompletionHandle {
    fn from(signal: CompletionSignal) -> Self {
        Self::for_signal(signal)
    }
}
