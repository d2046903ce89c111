//! Dependency subjects.
//!
//! A [`Dep`] stands for one piece of observable state: a single property of
//! a reactive object, or a whole container. It records which subscribers
//! read it during their last evaluation and notifies them on change.
//!
//! # Subscriber slots
//!
//! Subscribers are kept in an index-stable vector of optional weak slots.
//! Removing a subscriber only empties its slot (a tombstone), so hot paths
//! such as dependency cleanup after every evaluation never shift the
//! vector. Subjects with tombstones are queued on a thread-local list and
//! compacted together by [`cleanup_pending`], which the scheduler runs once
//! per flush. A subject whose tombstones outnumber its live slots compacts
//! itself right away, so sync and lazy watchers that never pass through a
//! flush cannot grow a list without bound.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Config;

use super::context::ReactiveContext;
use super::{Subscriber, SubscriberId};

/// Unique identifier for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One subscriber slot; `None` is a tombstone awaiting compaction.
type Slot = Option<(SubscriberId, Weak<dyn Subscriber>)>;

struct DepInner {
    id: DepId,
    subs: RefCell<Vec<Slot>>,
    tombstones: Cell<usize>,
    /// Whether this subject is already on the pending-cleanup list.
    queued: Cell<bool>,
}

/// A dependency subject.
///
/// Cloning shares the subject.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

thread_local! {
    static PENDING_CLEANUP: RefCell<Vec<Dep>> = const { RefCell::new(Vec::new()) };
}

impl Dep {
    /// Create a subject with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subs: RefCell::new(Vec::new()),
                tombstones: Cell::new(0),
                queued: Cell::new(false),
            }),
        }
    }

    /// Get the subject's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Register the active target, if any, as depending on this subject.
    pub fn depend(&self) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Append a subscriber.
    ///
    /// Callers guarantee the subscriber is not already live here; watchers
    /// do so through their dependency id sets.
    pub fn add_sub(&self, sub: &Rc<dyn Subscriber>) {
        self.inner
            .subs
            .borrow_mut()
            .push(Some((sub.id(), Rc::downgrade(sub))));
    }

    /// Tombstone a subscriber's slot.
    pub fn remove_sub(&self, id: SubscriberId) {
        let removed = {
            let mut subs = self.inner.subs.borrow_mut();
            match subs.iter_mut().find(|slot| matches!(slot, Some((sub_id, _)) if *sub_id == id)) {
                Some(slot) => {
                    *slot = None;
                    true
                }
                None => false,
            }
        };

        if removed {
            self.add_tombstones(1);
        }
    }

    /// Notify every live subscriber.
    ///
    /// Subscribers are collected before any of them runs, so a subscriber
    /// that re-subscribes or unsubscribes during its update does not disturb
    /// this pass. Slots whose subscriber was dropped are tombstoned here.
    pub fn notify(&self) {
        let (mut subs, dead) = {
            let mut slots = self.inner.subs.borrow_mut();
            let mut subs = Vec::with_capacity(slots.len());
            let mut dead = 0;

            for slot in slots.iter_mut() {
                let Some((_, weak)) = slot.as_ref() else { continue };
                match weak.upgrade() {
                    Some(sub) => subs.push(sub),
                    None => {
                        *slot = None;
                        dead += 1;
                    }
                }
            }

            (subs, dead)
        };

        if dead > 0 {
            self.add_tombstones(dead);
        }

        if !Config::current().async_flush {
            // Without the scheduler's sort, fire in creation order.
            subs.sort_by_key(|sub| sub.id());
        }

        for sub in subs {
            sub.update();
        }
    }

    /// Number of live subscriber slots.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.borrow().iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of slots, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.inner.subs.borrow().len()
    }

    /// Whether `id` holds a live slot here.
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner
            .subs
            .borrow()
            .iter()
            .any(|slot| matches!(slot, Some((sub_id, _)) if *sub_id == id))
    }

    fn add_tombstones(&self, count: usize) {
        let tombstones = self.inner.tombstones.get() + count;
        self.inner.tombstones.set(tombstones);

        if tombstones * 2 > self.slot_count() {
            // Mostly dead: compact now. The pending entry, if any, stays and
            // finds nothing left to do.
            self.compact_slots();
        } else if !self.inner.queued.replace(true) {
            PENDING_CLEANUP.with(|pending| pending.borrow_mut().push(self.clone()));
        }
    }

    fn compact_slots(&self) {
        self.inner.subs.borrow_mut().retain(Option::is_some);
        self.inner.tombstones.set(0);
    }

    fn compact(&self) {
        self.compact_slots();
        self.inner.queued.set(false);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Compact the subscriber lists of every subject with tombstones.
///
/// Returns how many subjects were compacted.
pub fn cleanup_pending() -> usize {
    let pending = PENDING_CLEANUP.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
    for dep in &pending {
        dep.compact();
    }

    if !pending.is_empty() {
        tracing::trace!(count = pending.len(), "compacted subscriber lists");
    }
    pending.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Subscriber that records every dependency and update it receives.
    struct Recorder {
        id: SubscriberId,
        deps: RefCell<Vec<DepId>>,
        updates: Cell<usize>,
        log: Option<Rc<RefCell<Vec<SubscriberId>>>>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Self::with_log(None)
        }

        fn with_log(log: Option<Rc<RefCell<Vec<SubscriberId>>>>) -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                deps: RefCell::new(Vec::new()),
                updates: Cell::new(0),
                log,
            })
        }

        fn as_dyn(self: &Rc<Self>) -> Rc<dyn Subscriber> {
            self.clone()
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(self: Rc<Self>, dep: &Dep) {
            self.deps.borrow_mut().push(dep.id());
        }

        fn update(self: Rc<Self>) {
            self.updates.set(self.updates.get() + 1);
            if let Some(log) = &self.log {
                log.borrow_mut().push(self.id);
            }
        }
    }

    #[test]
    fn depend_without_target_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_reports_to_active_target() {
        let dep = Dep::new();
        let recorder = Recorder::new();

        {
            let _ctx = ReactiveContext::enter(recorder.as_dyn());
            dep.depend();
        }

        assert_eq!(*recorder.deps.borrow(), vec![dep.id()]);
    }

    #[test]
    fn notify_reaches_live_subscribers() {
        let dep = Dep::new();
        let a = Recorder::new();
        let b = Recorder::new();
        dep.add_sub(&a.as_dyn());
        dep.add_sub(&b.as_dyn());

        dep.remove_sub(a.id);
        dep.notify();

        assert_eq!(a.updates.get(), 0);
        assert_eq!(b.updates.get(), 1);
    }

    #[test]
    fn removal_tombstones_until_cleanup() {
        let dep = Dep::new();
        let a = Recorder::new();
        let b = Recorder::new();
        dep.add_sub(&a.as_dyn());
        dep.add_sub(&b.as_dyn());

        dep.remove_sub(a.id);
        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(dep.slot_count(), 2);
        assert!(!dep.has_subscriber(a.id));

        assert_eq!(cleanup_pending(), 1);
        assert_eq!(dep.slot_count(), 1);
        assert!(dep.has_subscriber(b.id));

        // Nothing left to do.
        assert_eq!(cleanup_pending(), 0);
    }

    #[test]
    fn mostly_dead_lists_compact_without_a_flush() {
        let dep = Dep::new();
        let subs: Vec<_> = (0..3).map(|_| Recorder::new()).collect();
        for sub in &subs {
            dep.add_sub(&sub.as_dyn());
        }

        dep.remove_sub(subs[0].id);
        assert_eq!(dep.slot_count(), 3);

        dep.remove_sub(subs[1].id);
        assert_eq!(dep.slot_count(), 1);
        assert!(dep.has_subscriber(subs[2].id));

        // Still listed from the first removal; compacting again is harmless.
        cleanup_pending();
        assert_eq!(dep.slot_count(), 1);
    }

    #[test]
    fn dropped_subscribers_are_tombstoned_on_notify() {
        let dep = Dep::new();
        let kept = Recorder::new();
        dep.add_sub(&kept.as_dyn());
        dep.add_sub(&Recorder::new().as_dyn());

        dep.notify();
        assert_eq!(kept.updates.get(), 1);
        assert_eq!(dep.subscriber_count(), 1);

        cleanup_pending();
        assert_eq!(dep.slot_count(), 1);
    }

    #[test]
    fn sync_mode_notifies_in_creation_order() {
        crate::config::update(|config| config.async_flush = false);

        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Recorder::with_log(Some(log.clone()));
        let second = Recorder::with_log(Some(log.clone()));

        let dep = Dep::new();
        dep.add_sub(&second.as_dyn());
        dep.add_sub(&first.as_dyn());
        dep.notify();

        assert_eq!(*log.borrow(), vec![first.id, second.id]);
    }
}
