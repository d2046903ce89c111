//! Reactive property layer.
//!
//! Observing a container attaches a reactive marker ([`Observer`]) holding
//! the container's own subject, then gives every object key a subject of
//! its own and, unless shallow, observes nested values recursively. From
//! then on the container's read methods depend on those subjects and its
//! write methods notify them.
//!
//! Keys added or removed after observation are invisible to existing
//! subscribers unless they go through [`set`] and [`del`], which wire the
//! new key up and notify the container's subject.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::object::{ReactiveSlot, SetterHook};
use super::value::Key;
use super::{Array, Dep, Object, Value};

/// The reactive marker attached to an observed container.
#[derive(Debug)]
pub struct Observer {
    /// Subject for the container as a whole: key additions and removals,
    /// array mutations, and readers of the container through a parent.
    dep: Dep,

    /// How many consumers own this container as their root data.
    root_count: Cell<usize>,

    /// Whether nested values were left raw.
    shallow: bool,
}

impl Observer {
    fn new(shallow: bool) -> Self {
        Self {
            dep: Dep::new(),
            root_count: Cell::new(0),
            shallow,
        }
    }

    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow
    }
}

/// Reactive bookkeeping shared by every container kind.
#[derive(Debug, Default)]
pub(crate) struct ContainerMeta {
    observer: RefCell<Option<Rc<Observer>>>,
    frozen: Cell<bool>,
    sealed: Cell<bool>,
    raw: Cell<bool>,
}

impl ContainerMeta {
    pub(crate) fn observer(&self) -> Option<Rc<Observer>> {
        self.observer.borrow().clone()
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    /// Freezing also makes the container non-extensible.
    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
        self.sealed.set(true);
    }

    pub(crate) fn is_extensible(&self) -> bool {
        !self.sealed.get()
    }

    pub(crate) fn prevent_extensions(&self) {
        self.sealed.set(true);
    }

    pub(crate) fn is_raw(&self) -> bool {
        self.raw.get()
    }

    pub(crate) fn mark_raw(&self) {
        self.raw.set(true);
    }
}

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new reactive markers on this thread.
///
/// Containers that are already observed stay reactive either way.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Whether `value` is a container carrying a reactive marker.
pub fn is_reactive(value: &Value) -> bool {
    value.observer().is_some()
}

/// Make `value` reactive and return its marker.
///
/// Idempotent: an observed container returns its existing marker. Returns
/// `None` for primitives, opaque data, containers marked raw, frozen or
/// non-extensible containers, and while observing is toggled off.
pub fn observe(value: &Value, shallow: bool) -> Option<Rc<Observer>> {
    let meta = value.meta()?;
    if let Some(observer) = meta.observer() {
        return Some(observer);
    }

    if !is_observing() || meta.is_raw() {
        return None;
    }
    if meta.is_frozen() || !meta.is_extensible() {
        dev_warn!(frozen = meta.is_frozen(), "cannot observe a frozen or non-extensible container");
        return None;
    }

    // Attached before walking so cyclic data terminates.
    let observer = Rc::new(Observer::new(shallow));
    *meta.observer.borrow_mut() = Some(observer.clone());

    match value {
        Value::Object(object) => {
            for (key, child) in object.entries_untracked() {
                define_reactive_property(object, key, child, None, shallow);
            }
        }
        Value::Array(array) if !shallow => {
            for item in array.to_vec_untracked() {
                observe(&item, false);
            }
        }
        _ => {}
    }

    Some(observer)
}

/// Observe `value` as a consumer's root data.
///
/// Increments the marker's root count; root containers refuse runtime key
/// additions and removals through [`set`] and [`del`].
pub fn observe_root(value: &Value) -> Option<Rc<Observer>> {
    let observer = observe(value, false)?;
    observer.root_count.set(observer.root_count.get() + 1);
    Some(observer)
}

/// Release one root claim taken by [`observe_root`].
pub fn release_root(value: &Value) {
    if let Some(observer) = value.observer() {
        observer.root_count.set(observer.root_count.get().saturating_sub(1));
    }
}

/// Install a reactive property on `target` and return its subject.
///
/// Unless `shallow`, the initial value is observed too. `setter_hook` sees
/// every effective write before it is stored. Returns `None` when the
/// property cannot be (re)defined: frozen targets, or a new key on a
/// non-extensible target.
pub fn define_reactive_property(
    target: &Object,
    key: impl Into<Rc<str>>,
    value: impl Into<Value>,
    setter_hook: Option<SetterHook>,
    shallow: bool,
) -> Option<Dep> {
    let key = key.into();
    let value = value.into();

    if target.is_frozen() || (!target.is_extensible() && !target.contains_key(&key)) {
        return None;
    }

    if !shallow {
        observe(&value, false);
    }

    let dep = Dep::new();
    target.install(
        key,
        value,
        ReactiveSlot {
            dep: dep.clone(),
            shallow,
            setter_hook,
        },
    );
    Some(dep)
}

/// Set `key` on `target`, adding a reactive property if it is new.
///
/// Array indices go through [`Array::splice`], growing the array if needed.
/// Returns the value that was set.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(array) => {
            let Some(index) = key.as_index() else {
                dev_warn!(key = ?key, "arrays only accept index keys");
                return value;
            };
            array.pad_to(index);
            array.splice(index, 1, [value.clone()]);
        }
        Value::Object(object) => {
            let name = key.to_name();
            if object.contains_key(&name) {
                object.set(&name, value.clone());
                return value;
            }

            let Some(observer) = object.observer() else {
                object.set(&name, value.clone());
                return value;
            };
            if observer.root_count() > 0 {
                dev_warn!(key = %name, "avoid adding reactive properties to root data at runtime; declare them up front");
                return value;
            }

            match define_reactive_property(object, name, value.clone(), None, observer.is_shallow()) {
                Some(_) => observer.dep().notify(),
                None => dev_warn!("cannot add a property to a frozen or non-extensible object"),
            }
        }
        _ => dev_warn!(value = ?target, "cannot set reactive property on undefined, null, or primitive value"),
    }

    value
}

/// Delete `key` from `target`, notifying the container's subject.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::Array(array) => match key.as_index() {
            Some(index) => {
                array.splice(index, 1, Vec::<Value>::new());
            }
            None => dev_warn!(key = ?key, "arrays only accept index keys"),
        },
        Value::Object(object) => {
            let observer = object.observer();
            if observer.as_ref().is_some_and(|observer| observer.root_count() > 0) {
                dev_warn!(key = ?key, "avoid deleting properties on root data; set them to null instead");
                return;
            }
            if object.is_frozen() {
                dev_warn!(key = ?key, "cannot delete a property of a frozen object");
                return;
            }

            if object.remove(&key.to_name()).is_none() {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        _ => dev_warn!(value = ?target, "cannot delete reactive property on undefined, null, or primitive value"),
    }
}

/// Depend on a value read through a reactive property: its own marker and,
/// for arrays, the markers of nested elements, since indices are not
/// tracked one by one.
pub(crate) fn depend_child(value: &Value) {
    let Some(observer) = value.observer() else { return };
    observer.dep().depend();
    if let Value::Array(array) = value {
        depend_array(array);
    }
}

fn depend_array(array: &Array) {
    for item in array.to_vec_untracked() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from(json!({ "a": 1 }));
        let first = observe(&value, false).unwrap();
        let second = observe(&value, false).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert!(is_reactive(&value));
    }

    #[test]
    fn observe_skips_primitives_and_opaque_values() {
        assert!(observe(&Value::from(1), false).is_none());
        assert!(observe(&Value::from("s"), false).is_none());
        assert!(observe(&Value::from(crate::reactive::Opaque::new(())), false).is_none());
    }

    #[test]
    fn observe_skips_frozen_sealed_and_raw_containers() {
        let frozen = Object::new();
        frozen.freeze();
        let sealed = Object::new();
        sealed.prevent_extensions();
        let raw = Array::new();
        raw.mark_raw();

        assert!(observe(&frozen.into(), false).is_none());
        assert!(observe(&sealed.into(), false).is_none());
        assert!(observe(&raw.into(), false).is_none());
    }

    #[test]
    fn deep_observation_reaches_nested_containers() {
        let value = Value::from(json!({ "a": { "b": [{ "c": 1 }] } }));
        observe(&value, false);

        let nested = value.get_path("a.b.0");
        assert!(is_reactive(&value.get("a")));
        assert!(is_reactive(&value.get_path("a.b")));
        assert!(is_reactive(&nested));
        assert!(nested.as_object().unwrap().dep("c").is_some());
    }

    #[test]
    fn shallow_observation_leaves_children_raw() {
        let value = Value::from(json!({ "a": { "b": 1 } }));
        let observer = observe(&value, true).unwrap();

        assert!(observer.is_shallow());
        assert!(value.as_object().unwrap().dep("a").is_some());
        assert!(!is_reactive(&value.get("a")));
    }

    #[test]
    fn toggling_off_suppresses_new_markers() {
        toggle_observing(false);
        let value = Value::from(json!({ "a": 1 }));
        assert!(observe(&value, false).is_none());

        toggle_observing(true);
        assert!(observe(&value, false).is_some());
    }

    #[test]
    fn cyclic_data_terminates() {
        let object = Object::new();
        object.set("me", object.clone());
        let value = Value::from(object.clone());

        observe(&value, false);
        assert!(is_reactive(&value.get("me")));

        // Break the cycle so the test does not leak.
        object.set("me", Value::Null);
    }

    #[test]
    fn set_adds_reactive_keys_and_notifies_container() {
        let value = Value::from(json!({ "a": 1 }));
        let observer = observe(&value, false).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(set(&value, "b", json!({ "c": 2 })), value.get("b"));
        assert!(object.dep("b").is_some());
        assert!(is_reactive(&value.get("b")));
        assert_eq!(observer.dep().id(), value.observer().unwrap().dep().id());
    }

    #[test]
    fn set_on_plain_object_is_plain_assignment() {
        let value = Value::from(Object::new());
        set(&value, "a", 1);

        assert_eq!(value.get("a"), Value::from(1));
        assert!(value.as_object().unwrap().dep("a").is_none());
    }

    #[test]
    fn set_grows_arrays() {
        let value = Value::from(json!([1]));
        observe(&value, false);

        set(&value, 3usize, "x");
        assert_eq!(value.to_json(), json!([1, null, null, "x"]));

        set(&value, 0usize, 5);
        assert_eq!(value.get("0"), Value::from(5));
    }

    #[test]
    fn set_does_not_grow_non_extensible_arrays() {
        let value = Value::from(json!([1, 2]));
        observe(&value, false);
        value.as_array().unwrap().prevent_extensions();

        set(&value, 4usize, "x");
        assert_eq!(value.to_json(), json!([1, 2]));

        set(&value, 1usize, "y");
        assert_eq!(value.to_json(), json!([1, "y"]));
    }

    #[test]
    fn root_data_rejects_runtime_keys() {
        let value = Value::from(json!({ "a": 1 }));
        let observer = observe_root(&value).unwrap();
        assert_eq!(observer.root_count(), 1);

        set(&value, "b", 2);
        del(&value, "a");
        assert!(value.get("b").is_undefined());
        assert_eq!(value.get("a"), Value::from(1));

        release_root(&value);
        assert_eq!(observer.root_count(), 0);
        del(&value, "a");
        assert!(value.get("a").is_undefined());
    }

    #[test]
    fn del_removes_array_elements() {
        let value = Value::from(json!([1, 2, 3]));
        observe(&value, false);

        del(&value, 1usize);
        assert_eq!(value.to_json(), json!([1, 3]));
    }

    #[test]
    fn define_reactive_property_refuses_frozen_targets() {
        let object = Object::new();
        object.freeze();
        assert!(define_reactive_property(&object, "a", 1, None, false).is_none());

        let sealed = Object::new();
        sealed.set("a", 1);
        sealed.prevent_extensions();
        assert!(define_reactive_property(&sealed, "a", 2, None, false).is_some());
        assert!(define_reactive_property(&sealed, "b", 2, None, false).is_none());
    }

    #[test]
    #[tracing_test::traced_test]
    fn set_on_primitive_warns() {
        crate::config::update(|config| config.dev = true);
        set(&Value::from(3), "a", 1);
        assert!(logs_contain("cannot set reactive property"));
    }
}
