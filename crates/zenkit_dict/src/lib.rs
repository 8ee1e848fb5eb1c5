//! Helpers for nested JSON-style dictionaries used by pipeline configuration.

use serde_json::{Map, Value};
use thiserror::Error;

/// Dictionary with string keys and JSON values.
pub type TypeDict = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DictUtilsError {
    /// An object in the update would be merged into a non-object value.
    #[error(
        "Type of dictionary values for key {key} does not match in original and update dict (original={original}, update={update})."
    )]
    TypeMismatch {
        /// Offending key.
        key: String,
        /// JSON type name of the original value.
        original: &'static str,
        /// JSON type name of the update value.
        update: &'static str,
    },
}

/// Recursively apply `update` onto `original` and return the result.
///
/// Objects are merged key by key; any other update value replaces the
/// original one. Empty or null-like original values (`null`, `false`, `0`,
/// `""`, `[]`, `{}`) are treated as an empty object when the update is an
/// object.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use zenkit_dict::recursive_update;
///
/// let original = json!({"a": {"x": 1, "y": 2}, "b": 1});
/// let update = json!({"a": {"y": 3}, "c": 4});
/// let merged = recursive_update(
///     original.as_object().unwrap().clone(),
///     update.as_object().unwrap().clone(),
/// )
/// .unwrap();
/// assert_eq!(
///     serde_json::Value::Object(merged),
///     json!({"a": {"x": 1, "y": 3}, "b": 1, "c": 4})
/// );
/// ```
pub fn recursive_update(
    mut original: TypeDict,
    update: TypeDict,
) -> Result<TypeDict, DictUtilsError> {
    for (key, value) in update {
        let Value::Object(dict_update) = value else {
            original.insert(key, value);
            continue;
        };

        let dict_original = match original.remove(&key) {
            Some(Value::Object(v)) => v,
            Some(v) if is_falsy(&v) => TypeDict::new(),
            None => TypeDict::new(),
            Some(v) => {
                return Err(DictUtilsError::TypeMismatch {
                    key,
                    original: type_name(&v),
                    update: "object",
                });
            }
        };
        let dict_merged = recursive_update(dict_original, dict_update)?;
        original.insert(key, Value::Object(dict_merged));
    }
    Ok(original)
}

/// Drop all entries whose value is `null`.
///
/// With `if_recursive`, nested objects are cleaned as well (values inside
/// arrays are left untouched).
pub fn remove_none_values(dict: TypeDict, if_recursive: bool) -> TypeDict {
    dict.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| match value {
            Value::Object(dict_child) if if_recursive => {
                (key, Value::Object(remove_none_values(dict_child, true)))
            }
            other => (key, other),
        })
        .collect()
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(v) => v.is_empty(),
        Value::Object(v) => v.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{DictUtilsError, TypeDict, recursive_update, remove_none_values};

    fn dict(value: Value) -> TypeDict {
        match value {
            Value::Object(v) => v,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn recursive_update_merges_nested_objects() {
        let original = dict(json!({
            "settings": {"docker": {"image": "base", "env": {"A": "1"}}, "resources": 2},
            "name": "step",
        }));
        let update = dict(json!({
            "settings": {"docker": {"env": {"B": "2"}}},
            "name": "renamed",
            "enable_cache": false,
        }));

        let merged = recursive_update(original, update).unwrap();
        assert_eq!(
            Value::Object(merged),
            json!({
                "settings": {
                    "docker": {"image": "base", "env": {"A": "1", "B": "2"}},
                    "resources": 2
                },
                "name": "renamed",
                "enable_cache": false,
            })
        );
    }

    #[test]
    fn scalar_update_replaces_object() {
        let merged =
            recursive_update(dict(json!({"a": {"x": 1}})), dict(json!({"a": 5}))).unwrap();
        assert_eq!(Value::Object(merged), json!({"a": 5}));
    }

    #[test]
    fn object_over_scalar_is_rejected() {
        let err =
            recursive_update(dict(json!({"a": 5})), dict(json!({"a": {"x": 1}}))).unwrap_err();
        assert_eq!(
            err,
            DictUtilsError::TypeMismatch {
                key: "a".to_string(),
                original: "number",
                update: "object",
            }
        );
        assert!(err.to_string().contains("for key a does not match"));
    }

    #[test]
    fn falsy_original_counts_as_empty_object() {
        for falsy in [json!(null), json!(0), json!(""), json!([]), json!(false)] {
            let merged = recursive_update(
                dict(json!({"a": falsy})),
                dict(json!({"a": {"x": 1}})),
            )
            .unwrap();
            assert_eq!(Value::Object(merged), json!({"a": {"x": 1}}));
        }
    }

    #[test]
    fn remove_none_values_flat_and_recursive() {
        let value = dict(json!({
            "a": null,
            "b": 1,
            "c": {"d": null, "e": {"f": null, "g": 2}},
            "h": [null, 1],
        }));

        let flat = remove_none_values(value.clone(), false);
        assert_eq!(
            Value::Object(flat),
            json!({"b": 1, "c": {"d": null, "e": {"f": null, "g": 2}}, "h": [null, 1]})
        );

        let deep = remove_none_values(value, true);
        assert_eq!(
            Value::Object(deep),
            json!({"b": 1, "c": {"e": {"g": 2}}, "h": [null, 1]})
        );
    }
}
