//! Tick deferral.
//!
//! [`next_tick`] queues a callback for the next tick. The first callback
//! queued in a tick asks the host to schedule one, through the requester
//! installed with [`set_tick_requester`]; later callbacks of the same tick
//! ride along. When the host's tick arrives it calls [`flush_callbacks`].
//!
//! Without a requester nothing is scheduled automatically and the host
//! drives ticks by calling [`flush_callbacks`] itself.

use std::cell::RefCell;
use std::rc::Rc;

type TickCallback = Box<dyn FnOnce()>;
type TickRequester = Rc<dyn Fn()>;

#[derive(Default)]
struct TickState {
    callbacks: Vec<TickCallback>,
    /// A tick has been requested and not yet flushed.
    pending: bool,
    running: bool,
    requester: Option<TickRequester>,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState::default());
}

/// Run `callback` on the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let request = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.callbacks.push(Box::new(callback));
        if tick.pending {
            return None;
        }
        tick.pending = true;
        tick.requester.clone()
    });

    // Outside the borrow; a requester may flush inline.
    if let Some(request) = request {
        request();
    }
}

/// Run every callback queued so far and return how many ran.
///
/// Callbacks queued while these run belong to the next tick.
pub fn flush_callbacks() -> usize {
    let (callbacks, was_running) = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.pending = false;
        let was_running = std::mem::replace(&mut tick.running, true);
        (std::mem::take(&mut tick.callbacks), was_running)
    });

    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }

    TICK.with(|tick| tick.borrow_mut().running = was_running);
    if count > 0 {
        tracing::trace!(count, "ran tick callbacks");
    }
    count
}

/// Install the host's deferral primitive.
///
/// `request` is called once per tick and must arrange for
/// [`flush_callbacks`] to run soon, outside the current call stack.
pub fn set_tick_requester(request: impl Fn() + 'static) {
    TICK.with(|tick| tick.borrow_mut().requester = Some(Rc::new(request)));
}

pub fn clear_tick_requester() {
    TICK.with(|tick| tick.borrow_mut().requester = None);
}

/// Whether tick callbacks are running right now.
pub fn is_flushing_callbacks() -> bool {
    TICK.with(|tick| tick.borrow().running)
}

/// Whether callbacks are waiting for a tick.
pub fn has_pending_tick() -> bool {
    TICK.with(|tick| tick.borrow().pending)
}

/// Defer ticks onto the current tokio `LocalSet`.
///
/// Triggers must then happen inside a `LocalSet` context, since the
/// requester calls [`tokio::task::spawn_local`].
#[cfg(feature = "tokio")]
pub fn use_tokio_local() {
    set_tick_requester(|| {
        tokio::task::spawn_local(async {
            flush_callbacks();
        });
    });
}
