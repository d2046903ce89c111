//! Reactive Primitives
//!
//! This module implements the dependency graph: subjects, the reactive
//! property layer built on them, and the watchers that subscribe to them.
//!
//! # Concepts
//!
//! ## Subjects
//!
//! A [`Dep`] stands for one observable piece of state. While a computation
//! runs, every subject it reads registers it as a subscriber; when the state
//! changes, the subject notifies its subscribers.
//!
//! ## Reactive values
//!
//! [`observe`] turns a [`Value`] tree into reactive data. Every object key
//! gets a subject of its own, and every container gets a marker
//! ([`Observer`]) holding a subject for the container as a whole. Reads and
//! writes go through [`Object`] and [`Array`] handles, which call into the
//! subjects.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a tracked computation: a render, a computed value or a
//! user watch. Each evaluation re-collects exactly the subjects it read, so
//! the graph prunes itself when a branch stops reading something.
//!
//! # Implementation Notes
//!
//! The active computation is a thread-local stack managed by
//! [`ReactiveContext`] guards. The whole graph is single-threaded and built
//! on `Rc`; subjects hold their subscribers weakly.

mod array;
mod context;
mod dep;
mod object;
mod observer;
mod subscriber;
mod traverse;
mod value;
mod watcher;

pub use array::Array;
pub use context::{untracked, ReactiveContext};
pub use dep::{cleanup_pending, Dep, DepId};
pub use object::{Object, SetterHook};
pub use observer::{
    define_reactive_property, del, is_observing, is_reactive, observe, observe_root, release_root, set,
    toggle_observing, Observer,
};
pub use subscriber::{Subscriber, SubscriberId};
pub use traverse::traverse;
pub use value::{has_changed, Key, Opaque, Value};
pub use watcher::{Callback, Getter, WatchSource, Watcher, WatcherFlags, WatcherOptions};
