//! Id-aware replacement for the `uniqueItems` keyword.
//!
//! Arrays whose elements all carry an `id` are unique when their ids are,
//! whatever else differs between the elements. As soon as one element has
//! no usable id the whole array falls back to plain deep-equality.

use jsonschema::paths::Location;
use jsonschema::{Keyword, ValidationError};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub(crate) struct UniqueIds {
    enabled: bool,
}

/// Factory registered under `uniqueItems`.
pub(crate) fn unique_ids_factory<'a>(
    _parent: &'a Map<String, Value>,
    value: &'a Value,
    _path: Location,
) -> Result<Box<dyn Keyword>, ValidationError<'a>> {
    Ok(Box::new(UniqueIds {
        enabled: value.as_bool().unwrap_or(false),
    }))
}

impl Keyword for UniqueIds {
    fn validate<'i>(&self, instance: &'i Value) -> Result<(), ValidationError<'i>> {
        if !self.enabled {
            return Ok(());
        }
        match violation(instance) {
            Some(message) => Err(ValidationError::custom(message)),
            None => Ok(()),
        }
    }

    fn is_valid(&self, instance: &Value) -> bool {
        !self.enabled || violation(instance).is_none()
    }
}

/// Error message for a non-unique array, if `instance` is one.
pub(crate) fn violation(instance: &Value) -> Option<String> {
    let Value::Array(items) = instance else {
        return None;
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut reported: HashSet<String> = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();

    for item in items {
        let Some(id) = item_id(item) else {
            return has_duplicates(items).then(|| format!("{instance} has non-unique elements"));
        };
        // Keyed on the JSON text so "1" and 1 stay distinct.
        let key = id.to_string();
        if !seen.insert(key.clone()) && reported.insert(key) {
            duplicates.push(display_id(id));
        }
    }

    if duplicates.is_empty() {
        None
    } else {
        Some(format!("Non-unique Id Values {}", duplicates.join(", ")))
    }
}

/// A non-empty string or non-zero number under `id`.
fn item_id(item: &Value) -> Option<&Value> {
    let id = item.as_object()?.get("id")?;
    match id {
        Value::String(s) if !s.is_empty() => Some(id),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(id),
        _ => None,
    }
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn has_duplicates(items: &[Value]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, a)| items[i + 1..].iter().any(|b| json_equal(a, b)))
}

/// Structural equality where `1` and `1.0` are the same number.
pub(crate) fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_ids_reported_once_each() {
        let instance = json!([
            { "id": "x", "title": "a" },
            { "id": "y" },
            { "id": "x", "title": "b" },
            { "id": "z" },
            { "id": "x" },
            { "id": "z" }
        ]);
        assert_eq!(violation(&instance).unwrap(), "Non-unique Id Values x, z");
    }

    #[test]
    fn test_distinct_ids_pass_even_if_other_fields_repeat() {
        let instance = json!([{ "id": "1", "v": 1 }, { "id": "2", "v": 1 }]);
        assert_eq!(violation(&instance), None);
    }

    #[test]
    fn test_element_without_id_falls_back_to_equality() {
        let instance = json!([{ "id": "x" }, { "id": "y" }, { "name": "n" }]);
        assert_eq!(violation(&instance), None);

        let instance = json!([{ "id": "x" }, { "id": "x" }, { "name": "n" }]);
        assert!(violation(&instance).unwrap().ends_with("has non-unique elements"));

        let instance = json!([{ "id": "x" }, { "name": "n" }, { "name": "n" }]);
        let message = violation(&instance).unwrap();
        assert!(message.ends_with("has non-unique elements"));
    }

    #[test]
    fn test_non_object_element_falls_back() {
        assert_eq!(violation(&json!([{ "id": "x" }, "not-a-mapping"])), None);

        let instance = json!([{ "id": "x" }, "not-a-mapping", "not-a-mapping"]);
        assert!(violation(&instance).unwrap().ends_with("has non-unique elements"));

        let instance = json!([{ "id": "x" }, "not-a-mapping", { "id": "x" }]);
        let message = violation(&instance).unwrap();
        assert!(message.starts_with(r#"[{"id":"x"}"#));
        assert!(message.ends_with("has non-unique elements"));
    }

    #[test]
    fn test_empty_id_falls_back() {
        let instance = json!([{ "id": "" }, { "id": "" }]);
        assert!(violation(&instance).unwrap().ends_with("has non-unique elements"));
    }

    #[test]
    fn test_scalar_arrays_use_equality() {
        assert_eq!(violation(&json!([1, 2, 3])), None);
        assert!(violation(&json!([1, 2, 1.0])).is_some());
        assert!(violation(&json!(["a", "a"])).is_some());
    }

    #[test]
    fn test_non_arrays_are_ignored() {
        assert_eq!(violation(&json!({ "id": "x" })), None);
        assert_eq!(violation(&json!("x")), None);
    }

    #[test]
    fn test_json_equal_ignores_key_order() {
        assert!(json_equal(&json!({ "a": 1, "b": [1, 2] }), &json!({ "b": [1.0, 2], "a": 1 })));
        assert!(!json_equal(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
    }
}
