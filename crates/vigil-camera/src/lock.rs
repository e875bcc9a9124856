//! Capture lock: at most one active capture per camera
//!
//! An in-memory compare-and-set flag. `try_acquire` is the single
//! "acquire-if-free" step, so two motion detections racing for the same camera
//! can never both win.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to one camera's capture flag
#[derive(Debug, Clone, Default)]
pub struct CaptureLock {
    held: Arc<AtomicBool>,
}

impl CaptureLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free; returns whether this call took it
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Free the lock; returns whether it was held
    pub fn release(&self) -> bool {
        self.held.swap(false, Ordering::AcqRel)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}
