// src/context/mod.rs

//! Native context lifecycle.
//!
//! Every thread has a stack of native contexts; the top of the stack is the
//! thread's *current* context. The stacks live in an explicit map keyed by
//! [`ThreadId`] inside a [`ContextManager`] rather than in thread-local
//! storage, so tests can observe and reset them.
//!
//! Rules:
//! - Creating a context makes it current on the creating thread if that
//!   thread has no current context, or if [`ContextOptions::make_current`]
//!   is set.
//! - [`NativeContext`] is reference counted: cloning retains, dropping
//!   releases. Releasing the last reference destroys the context and removes
//!   it from the releasing thread's stack, which restores whatever was
//!   current before it on that thread.
//! - Other threads are left alone. A thread that activated a context that
//!   was later destroyed elsewhere keeps its id as a dangling "current"
//!   entry until it activates something else.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::types::{ContextId, DeviceId};

/// Options for [`ContextManager::create_context`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextOptions {
    /// Push the new context on the calling thread even if another context is
    /// already current there.
    pub make_current: bool,
}

#[derive(Debug, Default)]
struct ManagerState {
    stacks: HashMap<ThreadId, Vec<ContextId>>,
    live: HashSet<ContextId>,
}

#[derive(Debug)]
struct ManagerInner {
    next_id: AtomicU64,
    state: Mutex<ManagerState>,
}

impl ManagerInner {
    fn push_current(&self, id: ContextId) {
        let mut state = self.state.lock();
        let stack = state.stacks.entry(thread::current().id()).or_default();
        stack.push(id);
        debug!(context = %id, depth = stack.len(), "context pushed as current");
    }

    fn destroy(&self, id: ContextId) {
        let mut state = self.state.lock();
        state.live.remove(&id);
        let thread = thread::current().id();
        if let Some(stack) = state.stacks.get_mut(&thread) {
            stack.retain(|c| *c != id);
            debug!(
                context = %id,
                restored = ?stack.last(),
                "context destroyed; previous context restored on this thread"
            );
            if stack.is_empty() {
                state.stacks.remove(&thread);
            }
        } else {
            debug!(context = %id, "context destroyed");
        }
    }
}

/// Owner of every thread's context stack.
#[derive(Debug, Clone)]
pub struct ContextManager {
    inner: Arc<ManagerInner>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                next_id: AtomicU64::new(1),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Create a context for `device` with a reference count of one.
    pub fn create_context(&self, device: DeviceId, options: ContextOptions) -> NativeContext {
        let id = ContextId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let push = {
            let mut state = self.inner.state.lock();
            state.live.insert(id);
            let has_current = state
                .stacks
                .get(&thread::current().id())
                .is_some_and(|s| !s.is_empty());
            options.make_current || !has_current
        };

        if push {
            self.inner.push_current(id);
        }

        debug!(context = %id, device = %device, made_current = push, "context created");

        NativeContext {
            inner: Arc::new(ContextInner {
                id,
                device,
                manager: Arc::clone(&self.inner),
            }),
        }
    }

    /// Current context of the calling thread, possibly one that has since
    /// been destroyed on another thread.
    pub fn current(&self) -> Option<ContextId> {
        let state = self.inner.state.lock();
        state
            .stacks
            .get(&thread::current().id())
            .and_then(|s| s.last().copied())
    }

    /// Whether `id` still has outstanding references.
    pub fn is_live(&self, id: ContextId) -> bool {
        self.inner.state.lock().live.contains(&id)
    }

    /// Number of threads with a non-empty context stack.
    pub fn active_threads(&self) -> usize {
        self.inner.state.lock().stacks.len()
    }

    /// Drop every entry of the calling thread's stack.
    pub fn clear_current(&self) {
        let mut state = self.inner.state.lock();
        state.stacks.remove(&thread::current().id());
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

struct ContextInner {
    id: ContextId,
    device: DeviceId,
    manager: Arc<ManagerInner>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.manager.destroy(self.id);
    }
}

/// Reference-counted handle to a native context.
#[derive(Clone)]
pub struct NativeContext {
    inner: Arc<ContextInner>,
}

impl NativeContext {
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn device(&self) -> DeviceId {
        self.inner.device
    }

    /// Number of outstanding references, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Make this context current on the calling thread unless it already is.
    pub fn make_current(&self) {
        let manager = &self.inner.manager;
        let already = {
            let state = manager.state.lock();
            state
                .stacks
                .get(&thread::current().id())
                .and_then(|s| s.last())
                == Some(&self.inner.id)
        };
        if !already {
            manager.push_current(self.inner.id);
        }
    }

    /// Give up this reference.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for NativeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeContext")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
