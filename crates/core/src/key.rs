//! Index key type.
//!
//! A `Key` is the value (or ordered tuple of values) extracted from a row by
//! an index definition. Single-column keys use the `Scalar` variant; the two
//! variants share one equality and hashing contract over the underlying value
//! slice, so a scalar key and a one-element compound key are interchangeable
//! as map keys.

use crate::value::Value;
use std::hash::{Hash, Hasher};
use std::slice;

/// An index key: one value or an ordered tuple of values.
#[derive(Clone, Debug)]
pub enum Key {
    /// Single-column key.
    Scalar(Value),
    /// Multi-column key; component order follows the index definition.
    Compound(Vec<Value>),
}

impl Key {
    /// Builds a key from extracted values, collapsing a one-element tuple to
    /// a scalar.
    pub fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Key::Scalar(values.pop().unwrap_or(Value::Null))
        } else {
            Key::Compound(values)
        }
    }

    /// Returns the key components in index-definition order.
    pub fn values(&self) -> &[Value] {
        match self {
            Key::Scalar(v) => slice::from_ref(v),
            Key::Compound(vs) => vs.as_slice(),
        }
    }

    /// Returns the number of components.
    #[inline]
    pub fn arity(&self) -> usize {
        self.values().len()
    }

    /// Returns true if any component is Null. A key with a Null component
    /// does not participate in foreign key references.
    pub fn has_null(&self) -> bool {
        self.values().iter().any(Value::is_null)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.values() == other.values()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the value slice only; Scalar(v) and Compound([v]) must collide.
        for v in self.values() {
            v.hash(state);
        }
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Key::Scalar(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Scalar(Value::from(v))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Scalar(Value::Int64(v))
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Scalar(Value::Int32(v))
    }
}
