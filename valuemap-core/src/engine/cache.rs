//! Cache Cells
//!
//! A [`Cached`] holds one lazily computed value. The engine keeps one cell
//! per derived quantity (root values, each node's values, render edges and
//! style, the aggregate) and empties the affected cells whenever the active
//! scenario changes.
//!
//! # How it works
//!
//! 1. On first access the cell runs its computation and stores the result.
//! 2. Later accesses return the stored value.
//! 3. [`Cached::invalidate`] empties the cell; the next access recomputes.
//!
//! The lock is not held while computing. A node's computation may read its
//! parents' cells, and two threads racing on the same empty cell simply both
//! compute; the first stored result wins.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

/// Whether a cell currently holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// A value is stored.
    Clean,
    /// Empty; the next read recomputes.
    Dirty,
}

/// A lazily computed, invalidatable value.
pub struct Cached<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Cached<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Return the stored value, computing and storing it first if empty.
    /// A failed computation leaves the cell empty.
    pub fn get_or_try_init<F>(&self, compute: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.slot.read().as_ref() {
            return Ok(Arc::clone(value));
        }

        let computed = Arc::new(compute()?);
        let mut slot = self.slot.write();
        Ok(Arc::clone(slot.get_or_insert(computed)))
    }

    /// Empty the cell. Returns whether it held a value.
    pub fn invalidate(&self) -> bool {
        self.slot.write().take().is_some()
    }

    pub fn state(&self) -> CacheState {
        if self.slot.read().is_some() {
            CacheState::Clean
        } else {
            CacheState::Dirty
        }
    }

    pub fn is_cached(&self) -> bool {
        self.state() == CacheState::Clean
    }
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("value", &*self.slot.read())
            .finish()
    }
}
