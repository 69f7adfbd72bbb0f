//! JSON Schema rewriter (§4.8.1): normalizes an Anthropic tool's
//! `input_schema` into the dialect local OpenAI-compatible servers accept.

use serde_json::Value;

/// Rewrites `schema` in place, recursively, per §4.8.1's rule set.
pub fn rewrite_schema(schema: &mut Value) {
    let Value::Object(obj) = schema else {
        return;
    };

    for key in ["oneOf", "anyOf"] {
        if let Some(Value::Array(branches)) = obj.remove(key) {
            if let Some(first) = branches.into_iter().next() {
                *schema = first;
                rewrite_schema(schema);
                return;
            }
        }
    }

    if let Some(Value::Array(branches)) = obj.remove("allOf") {
        let mut merged_properties = serde_json::Map::new();
        let mut merged_required: Vec<Value> = Vec::new();
        for branch in branches {
            if let Value::Object(b) = branch {
                if let Some(Value::Object(props)) = b.get("properties") {
                    merged_properties.extend(props.clone());
                }
                if let Some(Value::Array(req)) = b.get("required") {
                    for r in req {
                        if !merged_required.contains(r) {
                            merged_required.push(r.clone());
                        }
                    }
                }
            }
        }
        if !merged_properties.is_empty() {
            obj.insert("properties".to_string(), Value::Object(merged_properties));
        }
        if !merged_required.is_empty() {
            obj.insert("required".to_string(), Value::Array(merged_required));
        }
    }

    if let Some(Value::Array(types)) = obj.get("type").cloned() {
        let chosen = types
            .iter()
            .find(|t| t.as_str() != Some("null"))
            .or_else(|| types.first())
            .cloned();
        if let Some(t) = chosen {
            obj.insert("type".to_string(), t);
        }
    }

    if obj.get("format").and_then(Value::as_str) == Some("uri") {
        obj.remove("format");
    }

    if obj.get("type").and_then(Value::as_str) == Some("object") && !obj.contains_key("additionalProperties") {
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        for (_, v) in props.iter_mut() {
            rewrite_schema(v);
        }
    }
    if let Some(items) = obj.get_mut("items") {
        rewrite_schema(items);
    }
}
