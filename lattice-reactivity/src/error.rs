//! Error Types
//!
//! Errors raised by tracked user code (watcher getters and callbacks) and
//! by configuration loading. Graph bookkeeping itself never fails; a broken
//! invariant there is a bug and panics.
//!
//! # Error Channel
//!
//! Failures of user watchers, and failures that surface inside a scheduler
//! flush or a synchronous trigger, have no caller to return to. They are
//! routed to a host-provided handler installed with [`set_error_handler`].
//! Without a handler they are logged as `tracing` error events.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// Boxed error returned by user getters and callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// A failure inside a watcher's user code.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watcher's getter failed while evaluating.
    #[error("error in getter for watcher \"{expression}\": {source}")]
    Getter {
        /// Diagnostic label of the watcher.
        expression: String,
        #[source]
        source: BoxError,
    },

    /// The watcher's change callback failed.
    #[error("error in callback for watcher \"{expression}\": {source}")]
    Callback {
        /// Diagnostic label of the watcher.
        expression: String,
        #[source]
        source: BoxError,
    },
}

impl WatchError {
    /// The label of the watcher that failed.
    pub fn expression(&self) -> &str {
        match self {
            Self::Getter { expression, .. } | Self::Callback { expression, .. } => expression,
        }
    }
}

/// Failure to load a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid reactivity config: {0}")]
    Parse(#[from] serde_json::Error),
}

type ErrorHandler = Rc<dyn Fn(&WatchError)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
}

/// Install the host's error channel for this thread.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&WatchError) + 'static,
{
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the host's error channel, falling back to logging.
pub fn clear_error_handler() {
    ERROR_HANDLER.with(|slot| slot.borrow_mut().take());
}

/// Route an error to the host's error channel.
pub fn handle_error(err: &WatchError) {
    // Cloned out so the handler may replace itself.
    let handler = ERROR_HANDLER.with(|slot| slot.borrow().clone());

    match handler {
        Some(handler) => handler(err),
        None => tracing::error!(watcher = err.expression(), error = %err, "unhandled watcher error"),
    }
}
