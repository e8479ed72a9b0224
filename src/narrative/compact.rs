//! Deep compaction of JSON payloads

use serde_json::{Map, Value};

/// Remove null and blank-string object members recursively.
///
/// Arrays are compacted element-wise; their elements are kept even when
/// null so positional meaning is preserved.
pub fn compact_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let compacted: Map<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !is_blank(v))
                .map(|(k, v)| (k, compact_value(v)))
                .collect();
            Value::Object(compacted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(compact_value).collect()),
        other => other,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_drops_null_and_blank_leaves() {
        let out = compact_value(json!({
            "a": null,
            "b": "  ",
            "c": "keep",
            "d": { "e": null, "f": 0, "g": false },
            "h": [ { "i": null, "j": "x" }, "y" ],
            "k": []
        }));
        assert_eq!(
            out,
            json!({
                "c": "keep",
                "d": { "f": 0, "g": false },
                "h": [ { "j": "x" }, "y" ],
                "k": []
            })
        );
    }

    #[test]
    fn test_compact_scalars_untouched() {
        assert_eq!(compact_value(json!("x")), json!("x"));
        assert_eq!(compact_value(json!(null)), json!(null));
    }
}
