//! Copy-then-swap snapshot cell.
//!
//! Readers clone the current `Arc` under a short read lock and work on that
//! immutable value; writers build the replacement completely before taking
//! the write lock to publish it. A poisoned lock still holds a complete
//! snapshot (the critical sections only assign an `Arc`), so it is recovered
//! rather than propagated.

use std::sync::{Arc, RwLock};

/// An atomically replaceable, immutable value.
#[derive(Debug)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The currently published value.
    pub fn load(&self) -> Arc<T> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publish a fully built replacement.
    pub fn store(&self, value: T) {
        let value = Arc::new(value);
        match self.current.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
