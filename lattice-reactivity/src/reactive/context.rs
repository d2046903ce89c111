//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a reactive property is
//! read, its subject can register the current computation as a dependent
//! without the read site passing anything along.
//!
//! # Implementation
//!
//! We use a thread-local stack of targets. Entering a context pushes a
//! target and returns a guard; dropping the guard pops it and restores the
//! previous target. This supports nested evaluations (a computed value read
//! while rendering) and keeps the stack balanced even if a computation
//! panics.
//!
//! A stack entry may also be the "no target" sentinel, pushed by
//! [`ReactiveContext::untracked`], which suspends tracking for reads that
//! must not be attributed to the enclosing computation.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Subscriber, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any subject that is read will register
    /// the subscriber as a dependent.
    pub fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(subscriber.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(subscriber)));

        Self { subscriber_id }
    }

    /// Enter a context in which reads are not tracked at all.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));

        Self { subscriber_id: None }
    }

    /// Check if there is an active target.
    ///
    /// False outside any context and inside an untracked one.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the active target, if any.
    pub fn current() -> Option<Rc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the active target's ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.as_ref().map(|s| s.id())))
    }

    /// Depth of the context stack, sentinels included.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = popped {
            let popped_id = entry.as_ref().map(|s| s.id());
            debug_assert_eq!(
                popped_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, popped_id
            );
        }
    }
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
