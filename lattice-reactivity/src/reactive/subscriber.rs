//! Subscriber types for the reactive system.
//!
//! A Subscriber is anything a [`Dep`] can notify: in practice a
//! [`Watcher`](super::Watcher) wrapping a render, a computed value or a
//! user watch. Subjects only see this trait, never the watcher itself.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Dep;

/// Unique identifier for a subscriber.
///
/// Ids grow monotonically and are never reused, so ascending id order is
/// creation order. The scheduler relies on this to run outer computations
/// before the inner computations they created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
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

/// A computation that can depend on subjects.
pub trait Subscriber {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Record that the running evaluation read `dep`.
    ///
    /// Called by [`Dep::depend`] while this subscriber is the active target.
    fn add_dep(self: Rc<Self>, dep: &Dep);

    /// One of the subscriber's dependencies changed.
    fn update(self: Rc<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_ids_are_ordered_by_creation() {
        let first = SubscriberId::new();
        let second = SubscriberId::new();

        assert!(first < second);
        assert!(first.raw() < second.raw());
    }
}
