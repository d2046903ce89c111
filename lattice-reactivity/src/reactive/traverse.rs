//! Deep traversal for deep watchers.

use std::cell::RefCell;
use std::collections::HashSet;

use super::Value;

thread_local! {
    /// Containers visited by the running traversal, by identity.
    static SEEN: RefCell<HashSet<*const ()>> = RefCell::new(HashSet::new());
}

/// Touch every reactive property reachable from `value` so the active
/// target depends on all of them, then return `value`.
///
/// Each container is visited once per call, observed or not, which bounds
/// the walk on shared and cyclic data. Frozen, raw and opaque values are skipped.
pub fn traverse(value: &Value) -> Value {
    visit(value);
    SEEN.with(|seen| seen.borrow_mut().clear());
    value.clone()
}

fn visit(value: &Value) {
    let Some(meta) = value.meta() else { return };
    if meta.is_frozen() || meta.is_raw() {
        return;
    }

    let ptr = match value {
        Value::Array(array) => array.as_ptr(),
        Value::Object(object) => object.as_ptr(),
        _ => return,
    };
    if !SEEN.with(|seen| seen.borrow_mut().insert(ptr)) {
        return;
    }

    if let Some(observer) = meta.observer() {
        observer.dep().depend();
    }

    match value {
        Value::Array(array) => {
            for item in array.to_vec_untracked() {
                visit(&item);
            }
        }
        Value::Object(object) => {
            for key in object.keys_untracked() {
                visit(&object.get(&key));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, Object, ReactiveContext, Subscriber, SubscriberId};
    use crate::reactive::{toggle_observing, Dep, DepId};
    use serde_json::json;
    use std::rc::Rc;

    struct Collector {
        id: SubscriberId,
        deps: RefCell<Vec<DepId>>,
    }

    impl Subscriber for Collector {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(self: Rc<Self>, dep: &Dep) {
            self.deps.borrow_mut().push(dep.id());
        }

        fn update(self: Rc<Self>) {}
    }

    fn collect(value: &Value) -> Vec<DepId> {
        let collector = Rc::new(Collector {
            id: SubscriberId::new(),
            deps: RefCell::new(Vec::new()),
        });
        {
            let _ctx = ReactiveContext::enter(collector.clone());
            traverse(value);
        }
        let deps = collector.deps.borrow().clone();
        deps
    }

    #[test]
    fn traversal_reaches_nested_properties() {
        let value = Value::from(json!({ "a": { "b": [1, { "c": 2 }] } }));
        observe(&value, false);

        let deps = collect(&value);
        let leaf = value.get_path("a.b.1").as_object().unwrap().dep("c").unwrap();
        let middle = value.get("a").as_object().unwrap().dep("b").unwrap();

        assert!(deps.contains(&leaf.id()));
        assert!(deps.contains(&middle.id()));
        assert!(deps.contains(&value.observer().unwrap().dep().id()));
    }

    #[test]
    fn traversal_skips_frozen_subtrees() {
        let value = Value::from(json!({ "a": { "b": 1 } }));
        observe(&value, false);
        let inner = value.get("a");
        let inner_dep = inner.as_object().unwrap().dep("b").unwrap();
        inner.as_object().unwrap().freeze();

        assert!(!collect(&value).contains(&inner_dep.id()));
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let object = Object::new();
        object.set("next", object.clone());
        let value = Value::from(object.clone());
        observe(&value, false);

        assert!(!collect(&value).is_empty());
        SEEN.with(|seen| assert!(seen.borrow().is_empty()));

        object.set("next", Value::Null);
    }

    #[test]
    fn traversal_terminates_on_cycles_below_a_shallow_root() {
        let inner = Object::new();
        inner.set("me", inner.clone());
        let root: Object = [("a", inner.clone())].into_iter().collect();
        let value = Value::from(root);
        observe(&value, true);
        assert!(inner.observer().is_none());

        let deps = collect(&value);
        assert!(deps.contains(&value.as_object().unwrap().dep("a").unwrap().id()));
        SEEN.with(|seen| assert!(seen.borrow().is_empty()));

        inner.set("me", Value::Null);
    }

    #[test]
    fn traversal_terminates_on_cycles_created_while_not_observing() {
        toggle_observing(false);
        let object = Object::new();
        object.set("next", object.clone());
        let value = Value::from(object.clone());
        observe(&value, false);
        toggle_observing(true);

        assert!(object.observer().is_none());
        assert!(collect(&value).is_empty());

        object.set("next", Value::Null);
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(traverse(&Value::from(3)), Value::from(3));
    }
}
