//! Reactive Values
//!
//! [`Value`] is the data model the reactivity engine observes: a dynamically
//! typed tree of primitives and shared containers. Containers ([`Object`]
//! and [`Array`]) are handles; cloning a container value shares it, and two
//! container values are equal only if they are the same container.
//!
//! Reads and writes go through methods on the handles rather than through
//! intercepted field access. Every tracked read registers with the active
//! target, every effective write notifies the subscribers of what changed.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::observer::{ContainerMeta, Observer};
use super::{Array, Object};

/// A dynamically typed, possibly reactive value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value; what unresolvable reads produce.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    /// Host data the rendering layer owns. Never observed or traversed.
    Opaque(Opaque),
}

/// Identity-compared handle to host data.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    /// Wrap `value`.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrow the wrapped value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Whether both handles wrap the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// A property key: an array index or an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(Rc<str>),
}

impl Key {
    /// The key as an array index, if it is one or parses as one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(name) => name.parse().ok(),
        }
    }

    /// The key as an object key.
    pub fn to_name(&self) -> Rc<str> {
        match self {
            Self::Index(index) => index.to_string().into(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Self::Name(name)
    }
}

impl Value {
    /// Whether this is [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Objects, arrays and opaque host data: values whose contents can
    /// change without the value itself being replaced.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_) | Self::Opaque(_))
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    /// The object handle, if this is one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The array handle, if this is one.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Tracked read of one key.
    ///
    /// Objects read the named property; arrays read a numeric index or
    /// `length`. Everything else yields [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        match self {
            Self::Object(object) => object.get(key),
            Self::Array(array) if key == "length" => Value::from(array.len()),
            Self::Array(array) => match key.parse::<usize>() {
                Ok(index) => array.get(index),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Tracked read of a dot-delimited path such as `"user.tags.0"`.
    pub fn get_path(&self, path: &str) -> Value {
        path.split('.').fold(self.clone(), |value, segment| value.get(segment))
    }

    /// The container's reactive marker, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.meta().and_then(ContainerMeta::observer)
    }

    pub(crate) fn meta(&self) -> Option<&ContainerMeta> {
        match self {
            Self::Object(object) => Some(object.meta()),
            Self::Array(array) => Some(array.meta()),
            _ => None,
        }
    }

    /// Untracked JSON snapshot.
    ///
    /// `Undefined`, opaque data and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Undefined | Self::Null | Self::Opaque(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Json::from(*n as i64),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.to_string()),
            Self::Array(array) => Json::Array(array.to_vec_untracked().iter().map(Value::to_json).collect()),
            Self::Object(object) => Json::Object(
                object
                    .entries_untracked()
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Whether replacing `old` with `new` is an observable change.
///
/// Containers compare by identity. `NaN` is unchanged from `NaN`, while
/// `0.0` and `-0.0` count as different.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Number(a), Value::Number(b)) if a == b => a.to_bits() != b.to_bits(),
        (Value::Number(a), Value::Number(b)) => !(a.is_nan() && b.is_nan()),
        _ => old != new,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => fmt::Debug::fmt(b, f),
            Self::Number(n) => fmt::Debug::fmt(n, f),
            Self::String(s) => fmt::Debug::fmt(s, f),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::Array(array) => fmt::Debug::fmt(array, f),
            Self::Opaque(opaque) => fmt::Debug::fmt(opaque, f),
        }
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Self::Opaque(opaque)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items.into_iter().collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::String(s.into()),
            Json::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(entries) => Self::Object(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}
