//! Schema shorthand expansion.
//!
//! Authors may write `"string"` instead of `{type: string}`, `"#/$defs/x"` or
//! `"https://…"` instead of `{$ref: …}`, and mark a property with
//! `"!required": true` instead of listing it in the parent's `required`.
//! Object-typed schemas are closed (`additionalProperties: false`) unless the
//! author says otherwise.

use serde_json::{json, Map, Value};

const REQUIRED_MARKER: &str = "!required";

/// Expand a schema (or schema shorthand) into its explicit form.
pub fn normalize_schema(schema: &Value) -> Value {
    match schema {
        Value::Null => json!({}),
        Value::String(s) => shorthand(s),
        Value::Object(map) => normalize_object(map),
        other => other.clone(),
    }
}

fn shorthand(s: &str) -> Value {
    if s.starts_with("http") || s.starts_with('#') {
        json!({ "$ref": s })
    } else {
        json!({ "type": s })
    }
}

fn normalize_object(map: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    let mut required: Vec<String> = map
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    for (key, value) in map {
        match key.as_str() {
            "properties" => {
                let Some(props) = value.as_object() else {
                    out.insert(key.clone(), value.clone());
                    continue;
                };
                let mut normalized = Map::new();
                for (name, prop) in props {
                    let (prop, is_required) = take_required_marker(prop);
                    if is_required && !required.contains(name) {
                        required.push(name.clone());
                    }
                    normalized.insert(name.clone(), normalize_schema(&prop));
                }
                out.insert(key.clone(), Value::Object(normalized));
            }
            "patternProperties" | "$defs" | "definitions" => {
                out.insert(key.clone(), normalize_schema_map(value));
            }
            "items" => {
                let items = match value {
                    Value::Array(list) => Value::Array(list.iter().map(normalize_schema).collect()),
                    other => normalize_schema(other),
                };
                out.insert(key.clone(), items);
            }
            "additionalProperties" => {
                let additional = match value {
                    Value::Bool(_) => value.clone(),
                    other => normalize_schema(other),
                };
                out.insert(key.clone(), additional);
            }
            "allOf" | "oneOf" | "anyOf" => {
                let list = match value {
                    Value::Array(list) => Value::Array(list.iter().map(normalize_schema).collect()),
                    other => other.clone(),
                };
                out.insert(key.clone(), list);
            }
            "required" | REQUIRED_MARKER => {}
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if !required.is_empty() {
        out.insert(
            "required".to_owned(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }
    if is_object_type(&out) && !out.contains_key("additionalProperties") {
        out.insert("additionalProperties".to_owned(), Value::Bool(false));
    }

    Value::Object(out)
}

fn normalize_schema_map(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_schema(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Strip a `!required` marker, reporting whether it was set.
fn take_required_marker(prop: &Value) -> (Value, bool) {
    match prop {
        Value::Object(map) if map.contains_key(REQUIRED_MARKER) => {
            let flag = !matches!(map.get(REQUIRED_MARKER), Some(Value::Bool(false)));
            let mut cleaned = map.clone();
            cleaned.remove(REQUIRED_MARKER);
            (Value::Object(cleaned), flag)
        }
        other => (other.clone(), false),
    }
}

/// Whether a schema's `type` is, or includes, `object`.
pub fn is_object_type(schema: &Map<String, Value>) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "object",
        Some(Value::Array(types)) => types.iter().any(|t| t == "object"),
        _ => false,
    }
}

/// Normalize an actor schema: always an object with the standard
/// `title`, `id` and `role` properties.
pub fn normalize_actor_schema(schema: &Value) -> Value {
    let mut base = match schema {
        Value::Null => json!({}),
        other => other.clone(),
    };
    if let Value::Object(map) = &mut base {
        if !map.contains_key("type") && !map.contains_key("$ref") {
            map.insert("type".to_owned(), json!("object"));
        }
    }

    let mut normalized = normalize_schema(&base);
    if let Value::Object(map) = &mut normalized {
        if is_object_type(map) {
            let properties = map
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(props) = properties {
                props
                    .entry("title")
                    .or_insert_with(|| json!({ "type": "string" }));
                props
                    .entry("id")
                    .or_insert_with(|| json!({ "type": "string" }));
                props.entry("role").or_insert_with(|| {
                    json!({ "type": ["string", "array"], "items": { "type": "string" } })
                });
            }
        }
    }
    normalized
}

/// Default value of a schema, if it declares one.
pub fn schema_default(schema: &Value) -> Option<&Value> {
    schema.get("default")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_shorthand() {
        assert_eq!(normalize_schema(&json!("number")), json!({ "type": "number" }));
        assert_eq!(
            normalize_schema(&json!("https://example.com/person.json")),
            json!({ "$ref": "https://example.com/person.json" })
        );
        assert_eq!(
            normalize_schema(&json!("#/$defs/money")),
            json!({ "$ref": "#/$defs/money" })
        );
    }

    #[test]
    fn object_schemas_are_closed_and_recursive() {
        let schema = normalize_schema(&json!({
            "type": "object",
            "properties": {
                "name": "string",
                "address": { "type": "object", "properties": { "city": "string" } },
                "tags": { "type": "array", "items": "string" }
            }
        }));
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "name": { "type": "string" },
                    "address": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": { "city": { "type": "string" } }
                    },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            })
        );
    }

    #[test]
    fn explicit_additional_properties_is_kept() {
        let schema = normalize_schema(&json!({ "type": "object", "additionalProperties": "string" }));
        assert_eq!(schema["additionalProperties"], json!({ "type": "string" }));
    }

    #[test]
    fn required_marker_moves_to_parent() {
        let schema = normalize_schema(&json!({
            "type": "object",
            "required": ["b"],
            "properties": {
                "a": { "type": "string", "!required": true },
                "b": "string"
            }
        }));
        assert_eq!(schema["required"], json!(["b", "a"]));
        assert_eq!(schema["properties"]["a"], json!({ "type": "string" }));
    }

    #[test]
    fn combinators_and_defs_recurse() {
        let schema = normalize_schema(&json!({
            "oneOf": ["string", "number"],
            "$defs": { "money": { "type": "object" } }
        }));
        assert_eq!(schema["oneOf"], json!([{ "type": "string" }, { "type": "number" }]));
        assert_eq!(schema["$defs"]["money"]["additionalProperties"], json!(false));
    }

    #[test]
    fn actor_schema_gets_standard_properties() {
        let schema = normalize_actor_schema(&Value::Null);
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["id"], json!({ "type": "string" }));
        assert!(schema["properties"]["role"].is_object());
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_schema(&json!({
            "type": "object",
            "properties": { "a": { "type": "string", "!required": true } }
        }));
        assert_eq!(normalize_schema(&once), once);
        let actor = normalize_actor_schema(&json!({ "title": "Client" }));
        assert_eq!(normalize_actor_schema(&actor), actor);
    }
}
