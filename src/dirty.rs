//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The memoised serialised size of a message.
//!
//! Change propagation follows the borrow path. Every route to a mutable
//! sub-message, container or value passes through a `&mut` method on each
//! ancestor, and each such method invalidates that ancestor's cache before
//! handing out the borrow. A detached value (one moved out with `take()` or
//! cleared) has no route back to its former parent, so it can never dirty
//! it.

use std::sync::atomic::{AtomicUsize, Ordering};

const DIRTY: usize = !0;

/// A cached byte size, valid only while the owning message is clean.
///
/// Atomic, so that a clean message can be sized from several threads at
/// once.
pub(crate) struct SizeCache(AtomicUsize);

impl SizeCache {
    /// A cache with nothing cached.
    pub fn new() -> Self {
        SizeCache(AtomicUsize::new(DIRTY))
    }

    /// Returns the cached size, or `None` if the owner is dirty.
    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Relaxed) {
            DIRTY => None,
            size => Some(size),
        }
    }

    /// Records the size computed for the current contents.
    pub fn set(&self, size: usize) {
        // A message that large could not be allocated anyway.
        if DIRTY != size {
            self.0.store(size, Ordering::Relaxed);
        }
    }

    /// Marks the owner dirty.
    pub fn invalidate(&mut self) {
        *self.0.get_mut() = DIRTY;
    }

    /// Whether the owner is dirty.
    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.get().is_none()
    }
}

impl Default for SizeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SizeCache {
    fn clone(&self) -> Self {
        SizeCache(AtomicUsize::new(self.0.load(Ordering::Relaxed)))
    }
}
