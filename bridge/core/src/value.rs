//! Bridge Values
//!
//! The owned value tree carried by a session payload on the controller side.
//!
//! It mirrors what a display context can observe: null, booleans, numbers,
//! strings, arrays and string-keyed objects. It adds one thing the wire cannot
//! carry, the opaque [`Symbol`] token. Symbols are valid payload data but have
//! no JSON form, so [`Value::to_json`] refuses them.
//!
//! Values are plain owned trees, so a cyclic value cannot be built.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Number, Value as JsonValue};
use thiserror::Error;

/// Opaque symbolic token
///
/// Symbols compare by identity: two symbols created with the same
/// description are still different tokens. Clones share the identity.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Arc<str>>,
}

impl Symbol {
    /// Create a new symbol with a description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Self::next_id(),
            description: Some(Arc::from(description.into())),
        }
    }

    /// Create a new symbol without a description
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: Self::next_id(),
            description: None,
        }
    }

    /// The description given at creation, if any
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn next_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "Symbol({desc})"),
            None => write!(f, "Symbol()"),
        }
    }
}

/// Errors converting a [`Value`] to its wire form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value (or something nested in it) has no JSON representation
    #[error("value at `{path}` is not representable on the wire: {reason}")]
    NotRepresentable {
        /// Location inside the value, `$` is the root
        path: String,
        /// What could not be represented
        reason: String,
    },
}

/// A controller-side data value
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Absent or null
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer or finite float
    Number(Number),
    /// UTF-8 string
    String(String),
    /// Opaque token, valid as data but not representable on the wire
    Symbol(Symbol),
    /// Ordered list
    Array(Vec<Value>),
    /// String-keyed mapping
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build an object value from key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Host truthiness rule
    ///
    /// `Null`, `false`, numeric zero and the empty string are falsy.
    /// Everything else is truthy, including empty arrays and objects.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Self::String(s) => !s.is_empty(),
            Self::Symbol(_) | Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// Whether this is `Null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string content, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of a number, if it fits
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Borrow the entries, if this is an object
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Convert to the wire representation
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NotRepresentable`] if a symbol appears anywhere
    /// in the tree.
    pub fn to_json(&self) -> Result<JsonValue, ValueError> {
        self.to_json_at("$")
    }

    fn to_json_at(&self, path: &str) -> Result<JsonValue, ValueError> {
        Ok(match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => JsonValue::Number(n.clone()),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Symbol(sym) => {
                return Err(ValueError::NotRepresentable {
                    path: path.to_string(),
                    reason: format!("{sym:?} has no wire form"),
                })
            }
            Self::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json_at(&format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json_at(&format!("{path}.{k}"))?)))
                    .collect::<Result<_, ValueError>>()?,
            ),
        })
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

/// Non-finite floats become `Null`, matching how the wire encodes them.
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Number::from_f64(f).map_or(Self::Null, Self::Number)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
