// src/exec/buffer.rs

//! Minimal device-visible memory for the host executor.
//!
//! Allocation policy is not the engine's concern; this type only gives
//! kernels, copies and fills something observable to act on. Cells are
//! atomics so that kernels running on the blocking pool can write them
//! without additional locking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct DeviceBuffer {
    id: u64,
    cells: Arc<[AtomicI64]>,
}

impl DeviceBuffer {
    /// Allocate `len` cells initialised to `init`.
    pub fn new(len: usize, init: i64) -> Self {
        let cells: Vec<AtomicI64> = (0..len).map(|_| AtomicI64::new(init)).collect();
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            cells: cells.into(),
        }
    }

    pub fn from_slice(values: &[i64]) -> Self {
        let cells: Vec<AtomicI64> = values.iter().map(|v| AtomicI64::new(*v)).collect();
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            cells: cells.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read one cell. Panics if `index` is out of range, like slice indexing.
    pub fn get(&self, index: usize) -> i64 {
        self.cells[index].load(Ordering::Acquire)
    }

    /// Write one cell. Panics if `index` is out of range, like slice indexing.
    pub fn set(&self, index: usize, value: i64) {
        self.cells[index].store(value, Ordering::Release);
    }

    /// Apply `f` to one cell in place.
    pub fn update(&self, index: usize, f: impl Fn(i64) -> i64) {
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            match cell.compare_exchange_weak(
                current,
                f(current),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.cells.iter().map(|c| c.load(Ordering::Acquire)).collect()
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}
