//! Subscriber identities for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: memos,
//! effects, and the selectors built on top of memos.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a memo, an effect, or a change callback.
///
/// Dependency edges and callback lists are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate the next ID from a process-wide counter.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}
