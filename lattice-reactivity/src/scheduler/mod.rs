//! Update Scheduler
//!
//! The scheduler coalesces watcher triggers into one ordered, deduplicated
//! flush per tick.
//!
//! # Algorithm
//!
//! 1. A triggered watcher is queued at most once per flush; its id is
//!    recorded in a pending set.
//! 2. The first trigger of a tick requests a flush through
//!    [`next_tick`], or flushes inline when `async_flush` is off.
//! 3. The flush sorts the queue by `(post, id)`. Ids grow with creation,
//!    so outer computations run before the inner ones they created, and
//!    post watchers run after everything else.
//! 4. The queue is walked with a live cursor. Watchers triggered mid-flush
//!    are inserted among the not-yet-processed entries at their sorted
//!    position, so they still run in this flush.
//! 5. Afterwards the transient state is reset, tombstoned subscriber lists
//!    are compacted, and post-flush callbacks run.
//!
//! In development mode a watcher that re-queues itself more than
//! `max_update_count` times in one flush is abandoned for the rest of that
//! flush and reported.

mod next_tick;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::handle_error;
use crate::reactive::{cleanup_pending, SubscriberId, Watcher};

pub use next_tick::{
    clear_tick_requester, flush_callbacks, has_pending_tick, is_flushing_callbacks, next_tick, set_tick_requester,
};

#[cfg(feature = "tokio")]
pub use next_tick::use_tokio_local;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    /// Ids queued and not yet run in this flush.
    has: HashSet<SubscriberId>,
    /// Re-queue counts, for the loop guard.
    circular: HashMap<SubscriberId, u32>,
    abandoned: HashSet<SubscriberId>,
    post_flush: Vec<Box<dyn FnOnce()>>,
    /// A flush has been requested or is running.
    waiting: bool,
    flushing: bool,
    /// Flush cursor.
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue `watcher` for the next flush.
///
/// No-op if it is already pending in this flush.
pub fn queue_watcher(watcher: Watcher) {
    let request = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(watcher.id()) {
            return false;
        }

        if state.flushing {
            let key = watcher.sort_key();
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].sort_key() > key {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        } else {
            state.queue.push(watcher);
        }

        !std::mem::replace(&mut state.waiting, true)
    });

    if request {
        request_flush();
    }
}

/// Run `callback` once the current (or next) flush has completed.
pub fn queue_post_flush(callback: impl FnOnce() + 'static) {
    let request = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.post_flush.push(Box::new(callback));
        !std::mem::replace(&mut state.waiting, true)
    });

    if request {
        request_flush();
    }
}

fn request_flush() {
    if Config::current().async_flush {
        next_tick(flush_scheduler_queue);
    } else {
        flush_scheduler_queue();
    }
}

/// Run every queued watcher.
///
/// Normally invoked by the tick requested on the first trigger. Calling it
/// while a flush is running does nothing.
pub fn flush_scheduler_queue() {
    let queued = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return None;
        }
        state.flushing = true;
        state.queue.sort_by_key(Watcher::sort_key);
        Some(state.queue.len())
    });
    let Some(queued) = queued else { return };

    tracing::debug!(queued, "flushing scheduler queue");
    let config = Config::current();

    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            // Abandoned entries yield `Some(None)` and are stepped over.
            state
                .queue
                .get(state.index)
                .map(|watcher| (!state.abandoned.contains(&watcher.id())).then(|| watcher.clone()))
        });
        let Some(next) = next else { break };

        if let Some(watcher) = next {
            run_queued(&watcher, &config);
        }
        STATE.with(|state| state.borrow_mut().index += 1);
    }

    let (queue, post_flush) = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.index = 0;
        state.has.clear();
        state.circular.clear();
        state.abandoned.clear();
        state.waiting = false;
        state.flushing = false;
        (std::mem::take(&mut state.queue), std::mem::take(&mut state.post_flush))
    });

    let compacted = cleanup_pending();
    tracing::debug!(ran = queue.len(), compacted, "flushed scheduler queue");
    drop(queue);

    for callback in post_flush {
        callback();
    }
}

fn run_queued(watcher: &Watcher, config: &Config) {
    let id = watcher.id();

    watcher.run_before();
    STATE.with(|state| state.borrow_mut().has.remove(&id));

    // Nothing to return to; the flush carries on with the next watcher.
    if let Err(err) = watcher.run() {
        handle_error(&err);
    }

    if !config.dev {
        return;
    }

    let runaway = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.contains(&id) {
            return false;
        }
        let count = state.circular.entry(id).or_insert(0);
        *count += 1;
        if *count <= config.max_update_count {
            return false;
        }
        state.abandoned.insert(id);
        true
    });

    if runaway {
        tracing::warn!(
            watcher = %watcher.expression(),
            max_update_count = config.max_update_count,
            "possible infinite update loop in watcher"
        );
    }
}

/// Whether a flush is running right now.
pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// Watchers queued and not yet run.
pub fn pending_count() -> usize {
    STATE.with(|state| {
        let state = state.borrow();
        let processed = if state.flushing { state.index + 1 } else { 0 };
        state.queue.len().saturating_sub(processed)
    })
}
