//! Reactive objects.
//!
//! An [`Object`] is an insertion-ordered map of named properties behind a
//! shared handle. Properties installed by the observer carry a subject of
//! their own: [`Object::get`] depends on it and [`Object::set`] notifies it
//! when the stored value actually changes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::observer::{depend_child, observe, ContainerMeta, Observer};
use super::value::has_changed;
use super::{Dep, Value};

/// Hook invoked with every effective write to a reactive property, before
/// the value is stored.
pub type SetterHook = Rc<dyn Fn(&Value)>;

#[derive(Clone)]
pub(crate) struct ReactiveSlot {
    pub(crate) dep: Dep,
    pub(crate) shallow: bool,
    pub(crate) setter_hook: Option<SetterHook>,
}

struct Property {
    value: Value,
    reactive: Option<ReactiveSlot>,
}

struct ObjectInner {
    props: RefCell<IndexMap<Rc<str>, Property>>,
    meta: ContainerMeta,
}

/// A shared, possibly reactive object.
///
/// Cloning shares the object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(IndexMap::new()),
                meta: ContainerMeta::default(),
            }),
        }
    }

    /// Tracked read of `key`.
    ///
    /// Reading a reactive property while a target is active subscribes the
    /// target to the property, and, unless the property is shallow, to the
    /// container stored in it. Missing keys read as [`Value::Undefined`]
    /// and record nothing.
    pub fn get(&self, key: &str) -> Value {
        let (value, slot) = {
            let props = self.inner.props.borrow();
            let Some(prop) = props.get(key) else {
                return Value::Undefined;
            };
            let slot = prop.reactive.as_ref().map(|slot| (slot.dep.clone(), slot.shallow));
            (prop.value.clone(), slot)
        };

        if let Some((dep, shallow)) = slot {
            if ReactiveContext::is_active() {
                dep.depend();
                if !shallow {
                    depend_child(&value);
                }
            }
        }

        value
    }

    /// Read `key` without recording a dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .props
            .borrow()
            .get(key)
            .map_or(Value::Undefined, |prop| prop.value.clone())
    }

    /// Write `key`.
    ///
    /// Writes to a reactive property that do not change its value are
    /// ignored. Effective writes run the setter hook, observe the new value
    /// unless the property is shallow, and notify the property's
    /// subscribers. Unknown keys become plain properties; use
    /// [`set`](super::set) to add a reactive one.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();

        if self.is_frozen() {
            dev_warn!(key = %key, "cannot assign to a property of a frozen object");
            return;
        }

        let slot = {
            let props = self.inner.props.borrow();
            match props.get(key) {
                Some(prop) => {
                    if prop.reactive.is_some() && !has_changed(&prop.value, &value) {
                        return;
                    }
                    prop.reactive.clone()
                }
                None if !self.is_extensible() => {
                    dev_warn!(key = %key, "cannot add a property to a non-extensible object");
                    return;
                }
                None => None,
            }
        };

        if let Some(hook) = slot.as_ref().and_then(|slot| slot.setter_hook.as_ref()) {
            hook(&value);
        }

        {
            let mut props = self.inner.props.borrow_mut();
            match props.get_mut(key) {
                Some(prop) => prop.value = value.clone(),
                None => {
                    props.insert(
                        key.into(),
                        Property {
                            value: value.clone(),
                            reactive: None,
                        },
                    );
                }
            }
        }

        if let Some(slot) = slot {
            if !slot.shallow {
                observe(&value, false);
            }
            slot.dep.notify();
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Tracked list of keys; depends on the object's own subject so key
    /// additions and removals through [`set`](super::set) and
    /// [`del`](super::del) re-run the reader.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.depend_shape();
        self.keys_untracked()
    }

    pub fn keys_untracked(&self) -> Vec<Rc<str>> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Tracked like [`keys`](Self::keys).
    pub fn len(&self) -> usize {
        self.depend_shape();
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries_untracked(&self) -> Vec<(Rc<str>, Value)> {
        self.inner
            .props
            .borrow()
            .iter()
            .map(|(key, prop)| (key.clone(), prop.value.clone()))
            .collect()
    }

    /// The subject of reactive property `key`.
    pub fn dep(&self, key: &str) -> Option<Dep> {
        self.inner
            .props
            .borrow()
            .get(key)
            .and_then(|prop| prop.reactive.as_ref().map(|slot| slot.dep.clone()))
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.meta.observer()
    }

    /// Forbid every further write, key addition and removal.
    pub fn freeze(&self) {
        self.inner.meta.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.meta.is_frozen()
    }

    /// Forbid key additions; existing keys stay writable.
    pub fn prevent_extensions(&self) {
        self.inner.meta.prevent_extensions();
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.meta.is_extensible()
    }

    /// Exclude this object from observation.
    pub fn mark_raw(&self) {
        self.inner.meta.mark_raw();
    }

    pub fn is_raw(&self) -> bool {
        self.inner.meta.is_raw()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity of the shared storage.
    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner).cast()
    }

    pub(crate) fn meta(&self) -> &ContainerMeta {
        &self.inner.meta
    }

    pub(crate) fn install(&self, key: Rc<str>, value: Value, slot: ReactiveSlot) {
        self.inner.props.borrow_mut().insert(
            key,
            Property {
                value,
                reactive: Some(slot),
            },
        );
    }

    /// Remove `key`, keeping the order of the remaining keys.
    pub(crate) fn remove(&self, key: &str) -> Option<Value> {
        self.inner.props.borrow_mut().shift_remove(key).map(|prop| prop.value)
    }

    fn depend_shape(&self) {
        if !ReactiveContext::is_active() {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<Rc<str>>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        {
            let mut props = object.inner.props.borrow_mut();
            for (key, value) in iter {
                props.insert(
                    key.into(),
                    Property {
                        value: value.into(),
                        reactive: None,
                    },
                );
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries_untracked()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{define_reactive_property, Watcher, WatchSource, WatcherOptions};
    use std::cell::Cell;

    fn lazy_watch(owner: &Value, f: impl Fn(&Value) -> Value + 'static) -> Watcher {
        Watcher::new(
            owner,
            WatchSource::getter(move |value| Ok(f(value))),
            None,
            WatcherOptions::default().lazy(true),
        )
        .unwrap()
    }

    #[test]
    fn plain_objects_read_and_write() {
        let object: Object = [("a", 1), ("b", 2)].into_iter().collect();
        object.set("c", 3);

        assert_eq!(object.get("a"), Value::from(1));
        assert_eq!(object.keys_untracked().len(), 3);
        assert!(object.get("missing").is_undefined());
        assert!(object.dep("a").is_none());
    }

    #[test]
    fn reactive_write_notifies_only_on_change() {
        let object = Object::new();
        let dep = define_reactive_property(&object, "x", 1, None, false).unwrap();
        let owner = Value::from(object.clone());
        let watcher = lazy_watch(&owner, |value| value.get("x"));

        watcher.evaluate().unwrap();
        assert_eq!(dep.subscriber_count(), 1);

        object.set("x", 1);
        assert!(!watcher.is_dirty());

        object.set("x", 2);
        assert!(watcher.is_dirty());
    }

    #[test]
    fn setter_hook_sees_effective_writes() {
        let object = Object::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let hook: SetterHook = Rc::new(move |_| counter.set(counter.get() + 1));
        define_reactive_property(&object, "x", 1, Some(hook), false);

        object.set("x", 1);
        object.set("x", 2);
        object.set("x", 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn frozen_objects_ignore_writes() {
        let object: Object = [("a", 1)].into_iter().collect();
        object.freeze();
        object.set("a", 2);
        object.set("b", 2);

        assert_eq!(object.get("a"), Value::from(1));
        assert!(!object.contains_key("b"));
    }

    #[test]
    fn sealed_objects_keep_existing_keys_writable() {
        let object: Object = [("a", 1)].into_iter().collect();
        object.prevent_extensions();
        object.set("a", 2);
        object.set("b", 2);

        assert_eq!(object.get("a"), Value::from(2));
        assert!(!object.contains_key("b"));
    }

    #[test]
    fn remove_preserves_order() {
        let object: Object = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(object.remove("b"), Some(Value::from(2)));
        assert_eq!(object.keys_untracked(), vec![Rc::<str>::from("a"), Rc::<str>::from("c")]);
    }
}
