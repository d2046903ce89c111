//! Watcher Implementation
//!
//! A Watcher wraps a getter so that every evaluation produces a value,
//! refreshes exactly the set of subjects the getter read, and can be
//! triggered again when any of them changes. Renders, computed values and
//! user watches are all watchers with different flags.
//!
//! # Dependency sets
//!
//! Each watcher keeps two dependency sets. During an evaluation, reads land
//! in the *new* set; a subject is only subscribed to if it was not already
//! in the *current* set, so re-reading the same dependencies costs no
//! subscriber-list churn. After the evaluation, subjects in the current set
//! that were not read again are unsubscribed from, and the two sets swap.
//! The watcher's dependencies therefore always equal what its last
//! evaluation read.
//!
//! # Modes
//!
//! The flags combine freely:
//!
//! - `lazy`: a trigger only marks the watcher dirty; the value is
//!   recomputed when next read (computed values).
//! - `sync`: a trigger runs the watcher immediately instead of queueing it.
//! - `deep`: the result is traversed so nested mutations also trigger.
//! - `user`: getter and callback failures are reported to the error
//!   handler instead of being returned.
//! - `post`: the scheduler runs the watcher after every non-post watcher
//!   of the same flush.
//!
//! # Lifetime
//!
//! Subjects hold watchers weakly. A watcher stays subscribed for as long as
//! some handle to it is alive (or it is queued); [`Watcher::teardown`]
//! unsubscribes explicitly.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{handle_error, BoxError, WatchError};
use crate::scheduler;

use super::context::ReactiveContext;
use super::dep::DepId;
use super::traverse::traverse;
use super::value::has_changed;
use super::{Dep, Subscriber, SubscriberId, Value};

/// A watched computation over the owner value.
pub type Getter = Box<dyn Fn(&Value) -> Result<Value, BoxError>>;

/// Invoked with `(new, old)` when a watcher's value changes.
pub type Callback = Box<dyn Fn(&Value, &Value) -> Result<(), BoxError>>;

/// What a watcher evaluates.
pub enum WatchSource {
    /// Dot-delimited path resolved against the owner, e.g. `"user.name"`.
    Path(String),
    /// Function of the owner; every reactive read it makes is tracked.
    Getter(Getter),
}

impl WatchSource {
    /// Watch a dot-delimited path.
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Watch the result of `getter`.
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + 'static,
    {
        Self::Getter(Box::new(getter))
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

/// Construction options for a [`Watcher`].
#[derive(Default)]
pub struct WatcherOptions {
    /// Also track everything reachable from the value.
    pub deep: bool,
    /// Callback errors are reported with the watcher's expression.
    pub user: bool,
    /// Evaluate on demand through [`Watcher::evaluate`].
    pub lazy: bool,
    /// Run on every trigger instead of queueing.
    pub sync: bool,
    /// Run after every non-post watcher in a flush.
    pub post: bool,
    /// Run by the scheduler right before each queued run.
    pub before: Option<Box<dyn Fn()>>,
    /// Run once, by the first [`Watcher::teardown`].
    pub on_stop: Option<Box<dyn FnOnce()>>,
    /// Label used in diagnostics; defaults to the path, or `<getter>`.
    pub expression: Option<String>,
}

impl WatcherOptions {
    /// Set [`deep`](Self::deep).
    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Set [`user`](Self::user).
    #[must_use]
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Set [`lazy`](Self::lazy).
    #[must_use]
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Set [`sync`](Self::sync).
    #[must_use]
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Set [`post`](Self::post).
    #[must_use]
    pub fn post(mut self, post: bool) -> Self {
        self.post = post;
        self
    }

    /// Set the pre-run hook.
    #[must_use]
    pub fn before(mut self, before: impl Fn() + 'static) -> Self {
        self.before = Some(Box::new(before));
        self
    }

    /// Set the teardown hook.
    #[must_use]
    pub fn on_stop(mut self, on_stop: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    /// Set the diagnostic label.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// Mode flags fixed at construction.
///
/// Each flag mirrors the [`WatcherOptions`] field of the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherFlags {
    pub deep: bool,
    pub user: bool,
    pub lazy: bool,
    pub sync: bool,
    pub post: bool,
}

#[derive(Default)]
struct DepSets {
    deps: SmallVec<[Dep; 4]>,
    new_deps: SmallVec<[Dep; 4]>,
    ids: HashSet<DepId>,
    new_ids: HashSet<DepId>,
}

struct WatcherInner {
    id: SubscriberId,
    expression: String,
    owner: Value,
    getter: Getter,
    callback: Option<Callback>,
    flags: WatcherFlags,
    before: Option<Box<dyn Fn()>>,
    on_stop: Cell<Option<Box<dyn FnOnce()>>>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    deps: RefCell<DepSets>,
}

/// A tracked computation.
///
/// Cloning shares the watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher over `owner`.
    ///
    /// Unless lazy, the watcher evaluates immediately to collect its first
    /// dependencies; a failing getter on a non-user watcher is returned.
    pub fn new(
        owner: &Value,
        source: impl Into<WatchSource>,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self, WatchError> {
        let (getter, default_expression) = match source.into() {
            WatchSource::Path(path) => (parse_path(&path), path),
            WatchSource::Getter(getter) => (getter, String::from("<getter>")),
        };

        let flags = WatcherFlags {
            deep: options.deep,
            user: options.user,
            lazy: options.lazy,
            sync: options.sync,
            post: options.post,
        };

        let watcher = Self {
            inner: Rc::new(WatcherInner {
                id: SubscriberId::new(),
                expression: options.expression.unwrap_or(default_expression),
                owner: owner.clone(),
                getter,
                callback,
                flags,
                before: options.before,
                on_stop: Cell::new(options.on_stop),
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(flags.lazy),
                active: Cell::new(true),
                deps: RefCell::new(DepSets::default()),
            }),
        };

        if !flags.lazy {
            let value = watcher.get()?;
            *watcher.inner.value.borrow_mut() = value;
        }

        tracing::trace!(watcher = %watcher.inner.expression, id = watcher.inner.id.raw(), "created watcher");
        Ok(watcher)
    }

    /// Evaluate the getter, re-collecting dependencies.
    pub fn get(&self) -> Result<Value, WatchError> {
        let result = {
            let _ctx = ReactiveContext::enter(self.inner.clone());
            let result = (self.inner.getter)(&self.inner.owner);
            if self.inner.flags.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        result.or_else(|source| {
            let err = WatchError::Getter {
                expression: self.inner.expression.clone(),
                source,
            };
            if self.inner.flags.user {
                handle_error(&err);
                Ok(Value::Undefined)
            } else {
                Err(err)
            }
        })
    }

    /// Drop subscriptions the last evaluation did not renew, then swap the
    /// dependency sets.
    fn cleanup_deps(&self) {
        let stale: SmallVec<[Dep; 4]> = {
            let mut sets = self.inner.deps.borrow_mut();
            let sets = &mut *sets;

            let stale = sets
                .deps
                .iter()
                .filter(|dep| !sets.new_ids.contains(&dep.id()))
                .cloned()
                .collect();

            std::mem::swap(&mut sets.ids, &mut sets.new_ids);
            sets.new_ids.clear();
            std::mem::swap(&mut sets.deps, &mut sets.new_deps);
            sets.new_deps.clear();

            stale
        };

        for dep in stale {
            dep.remove_sub(self.inner.id);
        }
    }

    /// React to a dependency change.
    pub fn update(&self) {
        if !self.is_active() {
            return;
        }

        if self.inner.flags.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.flags.sync {
            if let Err(err) = self.run() {
                handle_error(&err);
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the value changed.
    ///
    /// Object-like values and deep watchers always count as changed, since
    /// their contents may have been mutated in place.
    pub fn run(&self) -> Result<(), WatchError> {
        if !self.is_active() {
            return Ok(());
        }

        let value = self.get()?;
        let old = self.inner.value.borrow().clone();
        if !(has_changed(&old, &value) || value.is_object_like() || self.inner.flags.deep) {
            return Ok(());
        }

        *self.inner.value.borrow_mut() = value.clone();

        let Some(callback) = &self.inner.callback else {
            return Ok(());
        };
        if let Err(source) = callback(&value, &old) {
            let err = WatchError::Callback {
                expression: self.inner.expression.clone(),
                source,
            };
            if !self.inner.flags.user {
                return Err(err);
            }
            handle_error(&err);
        }
        Ok(())
    }

    /// Recompute the value of a lazy watcher and mark it clean.
    pub fn evaluate(&self) -> Result<Value, WatchError> {
        let value = self.get()?;
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.dirty.set(false);
        Ok(value)
    }

    /// Make the active target depend on everything this watcher depends on.
    pub fn depend(&self) {
        let deps = self.inner.deps.borrow().deps.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Read the value the way a computed property does: re-evaluate if
    /// dirty, then forward dependencies to the active target.
    pub fn read(&self) -> Result<Value, WatchError> {
        if self.inner.dirty.get() {
            self.evaluate()?;
        }
        if ReactiveContext::is_active() {
            self.depend();
        }
        Ok(self.value())
    }

    /// Unsubscribe from every dependency and stop reacting.
    ///
    /// Idempotent; the stop hook runs on the first call only.
    pub fn teardown(&self) {
        if !self.inner.active.replace(false) {
            return;
        }

        let sets = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in sets.deps {
            dep.remove_sub(self.inner.id);
        }

        if let Some(on_stop) = self.inner.on_stop.take() {
            on_stop();
        }
        tracing::trace!(watcher = %self.inner.expression, "tore down watcher");
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// The last computed value.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Whether a lazy watcher needs re-evaluating.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// False once torn down.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Get the mode flags.
    pub fn flags(&self) -> WatcherFlags {
        self.inner.flags
    }

    /// Get the diagnostic label.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The value sources are evaluated against.
    pub fn owner(&self) -> &Value {
        &self.inner.owner
    }

    /// Ids of the subjects this watcher is subscribed to.
    pub fn dep_ids(&self) -> HashSet<DepId> {
        self.inner.deps.borrow().ids.clone()
    }

    pub(crate) fn run_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    /// Flush order: non-post before post, then creation order.
    pub(crate) fn sort_key(&self) -> (bool, SubscriberId) {
        (self.inner.flags.post, self.inner.id)
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(self: Rc<Self>, dep: &Dep) {
        let id = dep.id();
        let subscribe = {
            let mut sets = self.deps.borrow_mut();
            if !sets.new_ids.insert(id) {
                return;
            }
            sets.new_deps.push(dep.clone());
            !sets.ids.contains(&id)
        };

        if subscribe {
            let sub: Rc<dyn Subscriber> = self;
            dep.add_sub(&sub);
        }
    }

    fn update(self: Rc<Self>) {
        Watcher { inner: self }.update();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("flags", &self.inner.flags)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

/// Compile a dotted path into a getter.
///
/// Paths with characters outside identifiers, `$` and `.` resolve to
/// undefined.
fn parse_path(path: &str) -> Getter {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');

    if !valid {
        dev_warn!(path = %path, "Failed watching path; watcher only accepts simple dot-delimited paths, use a getter instead");
        return Box::new(|_| Ok(Value::Undefined));
    }

    let path = path.to_owned();
    Box::new(move |owner| Ok(owner.get_path(&path)))
}
