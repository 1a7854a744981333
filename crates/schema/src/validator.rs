//! The `SchemaValidator` trait — the boundary to the JSON-Schema engine.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::Validator;
use parking_lot::RwLock;
use serde_json::Value;

/// Validates an instance against a JSON schema.
///
/// Implementations return a list of human-readable errors; an empty list
/// means the instance is valid. The schema passed in has all `$ref`s already
/// inlined by the [`crate::ValidationContext`].
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Value, instance: &Value) -> Vec<String>;
}

/// Default validator backed by the `jsonschema` crate.
///
/// Each distinct schema is compiled once and kept for later calls.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<Validator>>>,
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("cached", &self.cached())
            .finish()
    }
}

impl JsonSchemaValidator {
    /// Number of compiled schemas held.
    pub fn cached(&self) -> usize {
        self.compiled.read().len()
    }

    fn compile(&self, schema: &Value) -> Result<Arc<Validator>, String> {
        let key = schema.to_string();
        if let Some(validator) = self.compiled.read().get(&key) {
            return Ok(Arc::clone(validator));
        }
        let validator = Arc::new(jsonschema::validator_for(schema).map_err(|e| e.to_string())?);
        self.compiled.write().insert(key, Arc::clone(&validator));
        Ok(validator)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, instance: &Value) -> Vec<String> {
        let validator = match self.compile(schema) {
            Ok(validator) => validator,
            Err(e) => return vec![format!("invalid schema: {e}")],
        };
        validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_instances_have_no_errors() {
        let schema = json!({ "type": "object", "properties": { "n": { "type": "number" } } });
        let validator = JsonSchemaValidator::default();
        assert!(validator.validate(&schema, &json!({ "n": 1 })).is_empty());
        assert!(validator.validate(&json!({}), &json!("anything")).is_empty());
    }

    #[test]
    fn errors_carry_the_instance_path() {
        let schema = json!({
            "type": "object",
            "properties": { "n": { "type": "number" } },
            "additionalProperties": false
        });
        let errors = JsonSchemaValidator::default().validate(&schema, &json!({ "n": "x", "extra": 1 }));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.starts_with("/n: ")));
    }

    #[test]
    fn invalid_schema_is_reported() {
        let validator = JsonSchemaValidator::default();
        let errors = validator.validate(&json!({ "type": 12 }), &json!(1));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("invalid schema"));
        assert_eq!(validator.cached(), 0);
    }

    #[test]
    fn schemas_are_compiled_once() {
        let validator = JsonSchemaValidator::default();
        let schema = json!({ "type": "number" });
        assert!(validator.validate(&schema, &json!(1)).is_empty());
        assert_eq!(validator.validate(&schema, &json!("x")).len(), 1);
        assert_eq!(validator.cached(), 1);

        validator.validate(&json!({ "type": "string" }), &json!("x"));
        assert_eq!(validator.cached(), 2);
    }
}
