//! Lattice Reactivity
//!
//! This crate provides the reactivity engine of the Lattice UI runtime: the
//! subsystem that decides, after a mutation, exactly which computations must
//! re-run, in what order, and how often. It implements:
//!
//! - Dependency subjects and automatic dependency tracking
//! - A reactive property layer over dynamically typed values
//! - Watchers for renders, computed values and user watches
//! - A batching scheduler that flushes once per tick
//!
//! # Architecture
//!
//! - `reactive`: values, subjects, the observer, and watchers
//! - `scheduler`: the flush queue and tick deferral
//! - `config`: per-thread runtime configuration
//! - `error`: error types and the host error channel
//!
//! Everything is single-threaded; each thread owns an independent runtime.
//!
//! # Example
//!
//! ```rust
//! use lattice_reactivity::reactive::{observe, Value, Watcher, WatcherOptions};
//! use lattice_reactivity::scheduler::flush_callbacks;
//! use serde_json::json;
//!
//! let state = Value::from(json!({ "count": 1 }));
//! observe(&state, false);
//!
//! let doubled = Watcher::new(
//!     &state,
//!     lattice_reactivity::reactive::WatchSource::getter(|s| {
//!         Ok(Value::from(s.get("count").as_f64().unwrap_or(0.0) * 2.0))
//!     }),
//!     None,
//!     WatcherOptions::default(),
//! )
//! .unwrap();
//!
//! state.as_object().unwrap().set("count", 5);
//! flush_callbacks();
//! assert_eq!(doubled.value(), Value::from(10));
//! ```

/// Emit a `tracing` warning when development diagnostics are enabled.
macro_rules! dev_warn {
    ($($arg:tt)+) => {
        if $crate::config::Config::current().dev {
            ::tracing::warn!($($arg)+);
        }
    };
}

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{clear_error_handler, set_error_handler, BoxError, ConfigError, WatchError};
pub use reactive::{del, observe, set, traverse, Value, Watcher, WatcherOptions};
pub use scheduler::{next_tick, queue_watcher};
