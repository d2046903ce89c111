//! Reactive arrays.
//!
//! Elements are not tracked one by one. Tracked reads depend on the array's
//! own subject, and the mutating methods notify it once per call, after
//! observing any inserted elements.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::observer::{observe, ContainerMeta, Observer};
use super::Value;

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    meta: ContainerMeta,
}

/// A shared, possibly reactive array.
///
/// Cloning shares the array.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    /// Create an empty, unobserved array.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                meta: ContainerMeta::default(),
            }),
        }
    }

    /// Tracked element read; out-of-range indices read as undefined.
    pub fn get(&self, index: usize) -> Value {
        self.depend();
        self.get_untracked(index)
    }

    /// Read an element without recording a dependency.
    pub fn get_untracked(&self, index: usize) -> Value {
        self.inner.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Tracked length.
    pub fn len(&self) -> usize {
        self.depend();
        self.len_untracked()
    }

    pub fn len_untracked(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend();
        self.to_vec_untracked()
    }

    pub fn to_vec_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append `value`; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        if self.refuses_growth(1, 0) {
            return self.len_untracked();
        }
        self.mutate(std::slice::from_ref(&value), |items| {
            items.push(value.clone());
            items.len()
        })
        .unwrap_or_else(|| self.len_untracked())
    }

    /// Append `values` in order.
    pub fn extend<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if self.refuses_growth(values.len(), 0) {
            return;
        }
        self.mutate(&values, |items| items.extend(values.iter().cloned()));
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(&[], Vec::pop).flatten()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(&[], |items| (!items.is_empty()).then(|| items.remove(0))).flatten()
    }

    /// Prepend `values`, keeping their order; returns the new length.
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if self.refuses_growth(values.len(), 0) {
            return self.len_untracked();
        }
        self.mutate(&values, |items| {
            items.splice(0..0, values.iter().cloned());
            items.len()
        })
        .unwrap_or_else(|| self.len_untracked())
    }

    /// Remove up to `delete_count` elements at `start`, insert `values` in
    /// their place, and return the removed elements.
    ///
    /// `start` past the end is clamped to the end.
    pub fn splice<V: Into<Value>>(&self, start: usize, delete_count: usize, values: impl IntoIterator<Item = V>) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let len = self.len_untracked();
        let removed = delete_count.min(len - start.min(len));
        if self.refuses_growth(values.len(), removed) {
            return Vec::new();
        }
        self.mutate(&values, |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values.iter().cloned()).collect()
        })
        .unwrap_or_default()
    }

    /// Stable sort with `compare`.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.mutate(&[], |items| items.sort_by(|a, b| compare(a, b)));
    }

    /// Reverse the elements in place.
    pub fn reverse(&self) {
        self.mutate(&[], |items| items.reverse());
    }

    /// The reactive marker, once observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.meta.observer()
    }

    /// Forbid every further mutation.
    pub fn freeze(&self) {
        self.inner.meta.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.meta.is_frozen()
    }

    /// Forbid growing the array; removals and reordering stay allowed.
    pub fn prevent_extensions(&self) {
        self.inner.meta.prevent_extensions();
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.meta.is_extensible()
    }

    /// Exclude this array from observation.
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

    /// Grow to `len` with undefined elements, without notifying.
    pub(crate) fn pad_to(&self, len: usize) {
        if !self.is_extensible() {
            return;
        }
        let mut items = self.inner.items.borrow_mut();
        if items.len() < len {
            items.resize(len, Value::Undefined);
        }
    }

    fn depend(&self) {
        if !ReactiveContext::is_active() {
            return;
        }
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }

    /// Whether a mutation adding `added` and removing `removed` elements is
    /// refused because the array is non-extensible. Frozen arrays are left
    /// to [`mutate`](Self::mutate).
    fn refuses_growth(&self, added: usize, removed: usize) -> bool {
        if added <= removed || self.is_frozen() || self.is_extensible() {
            return false;
        }
        dev_warn!(added, removed, "cannot add elements to a non-extensible array");
        true
    }

    /// Apply `op` to the elements, then observe `inserted` and notify.
    ///
    /// The elements are moved out while `op` runs, so a comparator that
    /// reads this array sees it empty rather than panicking on a borrow.
    fn mutate<R>(&self, inserted: &[Value], op: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        if self.is_frozen() {
            dev_warn!("cannot mutate a frozen array");
            return None;
        }

        let mut items = std::mem::take(&mut *self.inner.items.borrow_mut());
        let result = op(&mut items);
        *self.inner.items.borrow_mut() = items;

        if let Some(observer) = self.observer() {
            if !observer.is_shallow() {
                for value in inserted {
                    observe(value, false);
                }
            }
            observer.dep().notify();
        }

        Some(result)
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}
