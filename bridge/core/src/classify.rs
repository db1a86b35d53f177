//! Value Classifier
//!
//! Pure predicates deciding which payload shapes the bridge accepts, plus
//! the validation and partition steps the registry runs at registration.
//!
//! Accepted data shapes:
//!
//! - a primitive (null, boolean, number, string, symbol)
//! - a primitive-structured object: a mapping whose values are primitives,
//!   arrays of primitives or, recursively, primitive-structured objects
//! - an array of primitives
//!
//! Nesting deeper than [`MAX_NESTING_DEPTH`] is rejected.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::payload::{Operation, PayloadValue, SessionPayload};
use crate::value::Value;

/// Deepest object nesting accepted in a data entry
pub const MAX_NESTING_DEPTH: usize = 64;

/// Shape of a payload entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Null, boolean, number, string or symbol
    Primitive,
    /// Object of primitives, primitive arrays and nested primitive objects
    StructuredObject,
    /// Array of primitives
    PrimitiveArray,
    /// Operation
    Callable,
    /// Anything else; rejected at registration
    Unsupported,
}

/// Payload rejected at registration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// An entry has a shape the bridge does not carry
    #[error("entry `{key}` is not a primitive, primitive object or primitive array: {reason}")]
    UnsupportedValue {
        /// Offending payload key
        key: String,
        /// Where inside the entry the problem is
        reason: String,
    },
    /// An entry nests deeper than [`MAX_NESTING_DEPTH`]
    #[error("entry `{key}` nests deeper than {MAX_NESTING_DEPTH} levels")]
    TooDeep {
        /// Offending payload key
        key: String,
    },
}

enum Violation {
    TooDeep,
    Unsupported(String),
}

/// Whether `value` is a primitive
#[must_use]
pub fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Symbol(_)
    )
}

/// Whether `value` is a primitive-structured object
///
/// `Null` counts as an (empty) object. Overly deep input is rejected.
#[must_use]
pub fn is_primitive_structured_object(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Object(_)) && object_violation(value, "", 0).is_none()
}

/// Whether `value` is an array holding only primitives
#[must_use]
pub fn is_primitive_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().all(is_primitive))
}

/// Classify one payload entry
#[must_use]
pub fn classify(entry: &PayloadValue) -> ValueKind {
    match entry {
        PayloadValue::Callable(_) => ValueKind::Callable,
        PayloadValue::Data(value) if is_primitive(value) => ValueKind::Primitive,
        PayloadValue::Data(value) if is_primitive_array(value) => ValueKind::PrimitiveArray,
        PayloadValue::Data(value) if is_primitive_structured_object(value) => {
            ValueKind::StructuredObject
        }
        PayloadValue::Data(_) => ValueKind::Unsupported,
    }
}

/// Check every data entry of a payload
///
/// # Errors
///
/// Returns the first entry (in key order) whose shape is not accepted.
pub fn validate_payload(payload: &SessionPayload) -> Result<(), PayloadError> {
    for (key, entry) in payload {
        let PayloadValue::Data(value) = entry else {
            continue;
        };
        match data_violation(value) {
            None => {}
            Some(Violation::TooDeep) => return Err(PayloadError::TooDeep { key: key.clone() }),
            Some(Violation::Unsupported(reason)) => {
                return Err(PayloadError::UnsupportedValue {
                    key: key.clone(),
                    reason,
                })
            }
        }
    }
    Ok(())
}

/// Data and callable halves of a payload
#[derive(Debug, Default)]
pub struct Partition {
    /// Entries published as data
    pub data: BTreeMap<String, Value>,
    /// Entries published by name only
    pub callables: BTreeMap<String, Operation>,
}

/// Split a payload into disjoint data and callable maps
///
/// Every key lands in exactly one of the two maps.
#[must_use]
pub fn partition(payload: SessionPayload) -> Partition {
    let mut parts = Partition::default();
    for (key, entry) in payload {
        match entry {
            PayloadValue::Data(value) => {
                parts.data.insert(key, value);
            }
            PayloadValue::Callable(op) => {
                parts.callables.insert(key, op);
            }
        }
    }
    parts
}

fn data_violation(value: &Value) -> Option<Violation> {
    match value {
        Value::Array(items) => items
            .iter()
            .position(|item| !is_primitive(item))
            .map(|i| Violation::Unsupported(format!("array element [{i}] is not a primitive"))),
        _ => object_violation(value, "", 0),
    }
}

fn object_violation(value: &Value, path: &str, depth: usize) -> Option<Violation> {
    if depth >= MAX_NESTING_DEPTH {
        return Some(Violation::TooDeep);
    }
    match value {
        Value::Object(map) => map.iter().find_map(|(key, child)| {
            if is_primitive(child) {
                return None;
            }
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            object_violation(child, &child_path, depth + 1)
        }),
        Value::Array(items) => items.iter().position(|item| !is_primitive(item)).map(|i| {
            Violation::Unsupported(format!("`{path}[{i}]` is not a primitive"))
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Symbol;
    use std::collections::BTreeSet;

    fn nested(depth: usize) -> Value {
        (0..depth).fold(Value::from(1), |inner, _| Value::object([("next", inner)]))
    }

    #[test]
    fn test_primitives() {
        assert!(is_primitive(&Value::Null));
        assert!(is_primitive(&Value::from(true)));
        assert!(is_primitive(&Value::from(3.5)));
        assert!(is_primitive(&Value::from("s")));
        assert!(is_primitive(&Value::from(Symbol::new("tag"))));
        assert!(!is_primitive(&Value::from(vec![1])));
        assert!(!is_primitive(&Value::object([("a", 1)])));
    }

    #[test]
    fn test_structured_objects() {
        assert!(is_primitive_structured_object(&Value::Null));
        assert!(is_primitive_structured_object(&Value::object([
            ("a", Value::from(1)),
            ("b", Value::object([("c", Value::from("d"))])),
        ])));
        assert!(is_primitive_structured_object(&Value::object([(
            "list",
            Value::from(vec![1, 2])
        )])));
        assert!(!is_primitive_structured_object(&Value::object([(
            "rows",
            Value::from(vec![Value::object([("k", 1)])])
        )])));
        assert!(!is_primitive_structured_object(&Value::from(5)));
    }

    #[test]
    fn test_depth_limit_fails_closed() {
        assert!(is_primitive_structured_object(&nested(MAX_NESTING_DEPTH)));
        assert!(!is_primitive_structured_object(&nested(
            MAX_NESTING_DEPTH + 1
        )));
        assert!(!is_primitive_structured_object(&nested(
            MAX_NESTING_DEPTH + 2
        )));

        let payload = SessionPayload::new().with_data("deep", nested(MAX_NESTING_DEPTH + 1));
        assert_eq!(
            validate_payload(&payload),
            Err(PayloadError::TooDeep {
                key: "deep".to_string()
            })
        );
    }

    #[test]
    fn test_classify_entries() {
        let op = Operation::sync(|_, _| Ok(Value::Null));
        assert_eq!(classify(&PayloadValue::Callable(op)), ValueKind::Callable);
        assert_eq!(
            classify(&PayloadValue::Data(Value::from(1))),
            ValueKind::Primitive
        );
        assert_eq!(
            classify(&PayloadValue::Data(Value::from(vec!["a", "b"]))),
            ValueKind::PrimitiveArray
        );
        assert_eq!(
            classify(&PayloadValue::Data(Value::object([("k", 1)]))),
            ValueKind::StructuredObject
        );
        assert_eq!(
            classify(&PayloadValue::Data(Value::from(vec![Value::object([(
                "k", 1
            )])]))),
            ValueKind::Unsupported
        );
    }

    #[test]
    fn test_validate_reports_offending_entry() {
        let accepted = SessionPayload::new()
            .with_data("ok", 1)
            .with_data(
                "settings",
                Value::object([("tags", Value::from(vec!["x", "y"]))]),
            );
        assert_eq!(validate_payload(&accepted), Ok(()));

        let payload = SessionPayload::new().with_data(
            "settings",
            Value::object([(
                "panes",
                Value::from(vec![Value::from("a"), Value::object([("w", 1)])]),
            )]),
        );

        match validate_payload(&payload) {
            Err(PayloadError::UnsupportedValue { key, reason }) => {
                assert_eq!(key, "settings");
                assert!(reason.contains("panes[1]"));
            }
            other => panic!("expected unsupported value, got {other:?}"),
        }

        let arrays = SessionPayload::new().with_data(
            "rows",
            Value::from(vec![Value::from(1), Value::from(vec![2])]),
        );
        assert!(matches!(
            validate_payload(&arrays),
            Err(PayloadError::UnsupportedValue { key, .. }) if key == "rows"
        ));
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let payload = SessionPayload::new()
            .with_data("count", 5)
            .with_data("title", "main")
            .with_data("flags", Value::from(vec![true, false]))
            .with_data("config", Value::object([("depth", 2)]))
            .with_operation("greet", Operation::sync(|_, _| Ok(Value::Null)))
            .with_operation("close", Operation::sync(|_, _| Ok(Value::Null)));

        let original: BTreeSet<String> = payload.keys().map(str::to_string).collect();
        let parts = partition(payload);

        let data_keys: BTreeSet<String> = parts.data.keys().cloned().collect();
        let callable_keys: BTreeSet<String> = parts.callables.keys().cloned().collect();

        assert!(data_keys.is_disjoint(&callable_keys));
        let rejoined: BTreeSet<String> = data_keys.union(&callable_keys).cloned().collect();
        assert_eq!(rejoined, original);
        assert_eq!(callable_keys.len(), 2);
    }
}
