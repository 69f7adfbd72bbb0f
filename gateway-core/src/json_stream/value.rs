//! Partial JSON value tree (§4.7): built incrementally as tokens complete.

/// A JSON value, as materialized by the streaming parser. Distinct from
/// `serde_json::Value` because the parser needs an ordered object
/// representation (insertion order matters for the exposed `object` view)
/// and because it is built up field-by-field while incomplete.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    pub fn as_object(&self) -> Option<&[(String, JsonValue)]> {
        match self {
            JsonValue::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.as_object()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to `serde_json::Value` for downstream consumers (the
    /// protocol translator hands completed arguments objects to callers as
    /// standard JSON).
    pub fn to_serde(&self) -> serde_json::Value {
        match self {
            JsonValue::Null => serde_json::Value::Null,
            JsonValue::Bool(b) => serde_json::Value::Bool(*b),
            JsonValue::Number(n) => serde_json::json!(n),
            JsonValue::String(s) => serde_json::Value::String(s.clone()),
            JsonValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(JsonValue::to_serde).collect())
            }
            JsonValue::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_serde()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: to_serde round-trips a nested structure into the equivalent
    /// serde_json tree.
    #[test]
    fn to_serde_converts_nested_structure() {
        let v = JsonValue::Object(vec![
            ("name".to_string(), JsonValue::String("a".to_string())),
            (
                "items".to_string(),
                JsonValue::Array(vec![JsonValue::Number(1.0), JsonValue::Bool(true)]),
            ),
        ]);
        let serde_v = v.to_serde();
        assert_eq!(serde_v["name"], "a");
        assert_eq!(serde_v["items"][0], 1.0);
        assert_eq!(serde_v["items"][1], true);
    }
}
