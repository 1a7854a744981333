//! `ValidationContext` — the per-scenario validation scope.
//!
//! A context owns the validator, the scenario document used to resolve local
//! `#/…` references, and the remote schema documents fetched for it. It is
//! built once per scenario version and then passed by reference to every
//! synchronous validation call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::{JsonSchemaValidator, SchemaFetcher, SchemaValidator};

/// Reference chains longer than this are treated as unresolvable.
const MAX_REF_DEPTH: usize = 32;

pub struct ValidationContext {
    validator: Arc<dyn SchemaValidator>,
    root: Value,
    resources: BTreeMap<String, Value>,
}

impl std::fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationContext")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ValidationContext {
    /// A context over `root` with no remote resources.
    pub fn new(validator: Arc<dyn SchemaValidator>, root: Value) -> Self {
        Self {
            validator,
            root,
            resources: BTreeMap::new(),
        }
    }

    /// A context over `root` using [`JsonSchemaValidator`].
    pub fn with_default_validator(root: Value) -> Self {
        Self::new(Arc::new(JsonSchemaValidator::default()), root)
    }

    /// Register a schema document under an absolute URI.
    pub fn add_resource(&mut self, uri: impl Into<String>, schema: Value) {
        self.resources.insert(uri.into(), schema);
    }

    /// Build a context, fetching every absolute `$ref` reachable from `root`
    /// (transitively through fetched documents).
    ///
    /// A document that cannot be fetched is registered as `{}` so validation
    /// proceeds with reduced strictness.
    pub async fn compile(
        root: Value,
        fetcher: &dyn SchemaFetcher,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        let mut ctx = Self::new(validator, root);
        let mut pending = remote_refs(&ctx.root);

        while let Some(uri) = pending.pop() {
            if ctx.resources.contains_key(&uri) {
                continue;
            }
            let schema = match fetcher.fetch(&uri).await {
                Ok(schema) => schema,
                Err(e) => {
                    warn!("schema '{}' unavailable, using an empty schema: {}", uri, e);
                    json!({})
                }
            };
            pending.extend(remote_refs(&schema));
            ctx.resources.insert(uri, schema);
        }

        info!("validation context compiled with {} remote schema(s)", ctx.resources.len());
        ctx
    }

    /// Validate `instance` against `schema` after inlining its references.
    pub fn validate(&self, schema: &Value, instance: &Value) -> Vec<String> {
        self.validator.validate(&self.resolve(schema), instance)
    }

    /// `schema` with every `$ref` replaced by its target.
    ///
    /// Unresolvable references become `{}` and are logged.
    pub fn resolve(&self, schema: &Value) -> Value {
        self.inline(schema, &self.root, 0)
    }

    fn inline(&self, schema: &Value, base: &Value, depth: usize) -> Value {
        match schema {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let target = self.lookup(reference, base, depth);
                    if map.len() == 1 {
                        return target;
                    }
                    let mut siblings = map.clone();
                    siblings.remove("$ref");
                    let siblings = self.inline(&Value::Object(siblings), base, depth);
                    return json!({ "allOf": [target, siblings] });
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), self.inline(v, base, depth)))
                        .collect::<Map<_, _>>(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.inline(item, base, depth))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn lookup(&self, reference: &str, base: &Value, depth: usize) -> Value {
        if depth >= MAX_REF_DEPTH {
            warn!("schema reference '{}' nested too deeply, using an empty schema", reference);
            return json!({});
        }

        let (uri, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let document = if uri.is_empty() {
            Some(base)
        } else {
            self.resources.get(uri)
        };
        let target = document.and_then(|doc| {
            if fragment.is_empty() {
                Some(doc)
            } else {
                doc.pointer(fragment)
            }
        });

        match (document, target) {
            (Some(doc), Some(target)) => self.inline(target, doc, depth + 1),
            _ => {
                warn!("unresolved schema reference '{}', using an empty schema", reference);
                json!({})
            }
        }
    }
}

/// Absolute document URIs referenced by `$ref`s anywhere in `value`.
fn remote_refs(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_remote_refs(value, &mut out);
    out
}

fn collect_remote_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let uri = reference.split('#').next().unwrap_or_default();
                if !uri.is_empty() && !out.iter().any(|u| u == uri) {
                    out.push(uri.to_owned());
                }
            }
            map.values().for_each(|v| collect_remote_refs(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_remote_refs(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFetcher;

    fn scenario() -> Value {
        json!({
            "$defs": {
                "money": { "type": "object", "properties": { "amount": { "type": "number" } }, "required": ["amount"] },
                "price": { "$ref": "#/$defs/money" }
            },
            "actors": {
                "client": { "$ref": "https://example.com/person.json" }
            }
        })
    }

    #[test]
    fn local_refs_are_inlined_transitively() {
        let ctx = ValidationContext::with_default_validator(scenario());
        let resolved = ctx.resolve(&json!({ "$ref": "#/$defs/price" }));
        assert_eq!(resolved["properties"]["amount"], json!({ "type": "number" }));

        assert!(ctx.validate(&json!({ "$ref": "#/$defs/price" }), &json!({ "amount": 3 })).is_empty());
        assert!(!ctx.validate(&json!({ "$ref": "#/$defs/price" }), &json!({})).is_empty());
    }

    #[test]
    fn refs_with_siblings_become_all_of() {
        let ctx = ValidationContext::with_default_validator(scenario());
        let resolved = ctx.resolve(&json!({ "$ref": "#/$defs/money", "title": "Cost" }));
        assert_eq!(resolved["allOf"][1], json!({ "title": "Cost" }));
    }

    #[test]
    fn unresolved_and_cyclic_refs_degrade_to_empty() {
        let ctx = ValidationContext::with_default_validator(json!({
            "$defs": { "loop": { "$ref": "#/$defs/loop" } }
        }));
        assert_eq!(ctx.resolve(&json!({ "$ref": "#/nope" })), json!({}));
        assert_eq!(ctx.resolve(&json!({ "$ref": "#/$defs/loop" })), json!({}));
        assert_eq!(ctx.resolve(&json!({ "$ref": "https://unknown/x.json" })), json!({}));
    }

    #[tokio::test]
    async fn compile_fetches_remote_documents() {
        let fetcher = MockFetcher::new().with(
            "https://example.com/person.json",
            json!({
                "type": "object",
                "properties": { "address": { "$ref": "https://example.com/address.json#/$defs/street" } }
            }),
        );
        let ctx = ValidationContext::compile(scenario(), &fetcher, Arc::new(JsonSchemaValidator::default())).await;

        let mut requested = fetcher.requested();
        requested.sort();
        assert_eq!(
            requested,
            vec!["https://example.com/address.json", "https://example.com/person.json"]
        );

        let person = ctx.resolve(&json!({ "$ref": "https://example.com/person.json" }));
        assert_eq!(person["type"], json!("object"));
        // address.json could not be fetched, so its target is empty
        assert_eq!(person["properties"]["address"], json!({}));
    }
}
