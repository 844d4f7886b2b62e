//! `OpenAPI` schema → JSON Schema rendering for MCP tool definitions.

use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
use serde_json::{Map, Value, json};
use std::borrow::Borrow;

/// How deep local `$ref`s are inlined before falling back to an opaque object.
const MAX_INLINE_DEPTH: usize = 8;

/// Renders `OpenAPI` schemas as JSON Schema, inlining local `#/...` refs from the root document.
///
/// MCP clients receive each tool schema standalone, so a `#/components/...` pointer would dangle.
/// Local refs are inlined up to a fixed depth (cycles end in `{"type": "object"}`); refs into
/// other documents are kept verbatim.
pub struct SchemaRenderer<'a> {
    root: &'a Value,
}

impl<'a> SchemaRenderer<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn render(&self, schema: &Schema) -> Value {
        self.render_at(schema, 0)
    }

    /// Render a schema that may itself be a reference.
    #[must_use]
    pub fn render_ref<T: Borrow<Schema>>(&self, schema: &ReferenceOr<T>) -> Value {
        self.render_ref_at(schema, 0)
    }

    fn render_ref_at<T: Borrow<Schema>>(&self, schema: &ReferenceOr<T>, depth: usize) -> Value {
        match schema {
            ReferenceOr::Item(s) => self.render_at(s.borrow(), depth),
            ReferenceOr::Reference { reference } => self.inline(reference, depth),
        }
    }

    fn inline(&self, reference: &str, depth: usize) -> Value {
        let Some(pointer) = reference.strip_prefix('#') else {
            return json!({ "$ref": reference });
        };
        if depth >= MAX_INLINE_DEPTH {
            return json!({ "type": "object" });
        }

        let target = self
            .root
            .pointer(pointer)
            .cloned()
            .and_then(|v| serde_json::from_value::<ReferenceOr<Schema>>(v).ok());
        match target {
            Some(next) => self.render_ref_at(&next, depth + 1),
            None => {
                tracing::debug!(reference, "unresolvable local schema ref; keeping it opaque");
                json!({ "type": "object" })
            }
        }
    }

    fn render_at(&self, schema: &Schema, depth: usize) -> Value {
        let mut out = Map::new();
        let data = &schema.schema_data;

        if let Some(desc) = &data.description {
            out.insert("description".to_string(), json!(desc));
        }
        if let Some(default) = &data.default {
            out.insert("default".to_string(), default.clone());
        }

        match &schema.schema_kind {
            SchemaKind::Type(t) => self.render_type(t, &mut out, depth),
            SchemaKind::OneOf { one_of } => {
                out.insert("oneOf".to_string(), self.render_all(one_of, depth));
            }
            SchemaKind::AnyOf { any_of } => {
                out.insert("anyOf".to_string(), self.render_all(any_of, depth));
            }
            SchemaKind::AllOf { all_of } => {
                out.insert("allOf".to_string(), self.render_all(all_of, depth));
            }
            SchemaKind::Not { .. } | SchemaKind::Any(_) => {}
        }

        // OpenAPI 3.0 `nullable` has no JSON Schema keyword; widen the type instead.
        if data.nullable
            && let Some(Value::String(t)) = out.get("type").cloned()
        {
            out.insert("type".to_string(), json!([t, "null"]));
        }

        Value::Object(out)
    }

    fn render_all(&self, schemas: &[ReferenceOr<Schema>], depth: usize) -> Value {
        Value::Array(
            schemas
                .iter()
                .map(|s| self.render_ref_at(s, depth))
                .collect(),
        )
    }

    fn render_type(&self, t: &Type, out: &mut Map<String, Value>, depth: usize) {
        match t {
            Type::String(s) => {
                out.insert("type".to_string(), json!("string"));
                if let Some(format) = serde_json::to_value(&s.format)
                    .ok()
                    .filter(|v| v.as_str().is_some_and(|f| !f.is_empty()))
                {
                    out.insert("format".to_string(), format);
                }
                let values: Vec<&String> = s.enumeration.iter().flatten().collect();
                if !values.is_empty() {
                    out.insert("enum".to_string(), json!(values));
                }
            }
            Type::Number(n) => {
                out.insert("type".to_string(), json!("number"));
                if let Some(min) = n.minimum {
                    out.insert("minimum".to_string(), json!(min));
                }
                if let Some(max) = n.maximum {
                    out.insert("maximum".to_string(), json!(max));
                }
            }
            Type::Integer(i) => {
                out.insert("type".to_string(), json!("integer"));
                if let Some(min) = i.minimum {
                    out.insert("minimum".to_string(), json!(min));
                }
                if let Some(max) = i.maximum {
                    out.insert("maximum".to_string(), json!(max));
                }
                let values: Vec<&i64> = i.enumeration.iter().flatten().collect();
                if !values.is_empty() {
                    out.insert("enum".to_string(), json!(values));
                }
            }
            Type::Boolean(_) => {
                out.insert("type".to_string(), json!("boolean"));
            }
            Type::Array(a) => {
                out.insert("type".to_string(), json!("array"));
                if let Some(items) = &a.items {
                    out.insert("items".to_string(), self.render_ref_at(items, depth));
                }
            }
            Type::Object(o) => {
                out.insert("type".to_string(), json!("object"));
                if !o.properties.is_empty() {
                    let props: Map<String, Value> = o
                        .properties
                        .iter()
                        .map(|(name, prop)| (name.clone(), self.render_ref_at(prop, depth)))
                        .collect();
                    out.insert("properties".to_string(), Value::Object(props));
                }
                if !o.required.is_empty() {
                    out.insert("required".to_string(), json!(o.required));
                }
            }
        }
    }
}

/// Build the MCP input schema (always an object) from flattened tool parameters.
#[must_use]
pub fn build_input_schema<'p>(
    parameters: impl IntoIterator<Item = (&'p str, &'p Value, bool)>,
) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<&str> = Vec::new();

    for (name, schema, is_required) in parameters {
        properties.insert(name.to_string(), schema.clone());
        if is_required {
            required.push(name);
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Wrap a response body schema so the MCP output schema root is an object: `{ body: ... }`.
#[must_use]
pub fn wrap_body_output_schema(body_schema: Value) -> Map<String, Value> {
    let wrapped = json!({
        "type": "object",
        "required": ["body"],
        "properties": { "body": body_schema }
    });
    match wrapped {
        Value::Object(obj) => obj,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(v: Value) -> Schema {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn renders_scalars_with_details() {
        let root = json!({});
        let r = SchemaRenderer::new(&root);

        let s = r.render(&schema(json!({
            "type": "string", "format": "uri", "enum": ["a", "b"], "description": "target"
        })));
        assert_eq!(
            s,
            json!({"type": "string", "format": "uri", "enum": ["a", "b"], "description": "target"})
        );

        let s = r.render(&schema(json!({"type": "integer", "minimum": 1, "nullable": true})));
        assert_eq!(s, json!({"type": ["integer", "null"], "minimum": 1}));
    }

    #[test]
    fn inlines_local_refs() {
        let root = json!({
            "components": { "schemas": {
                "Hook": {
                    "type": "object",
                    "required": ["url"],
                    "properties": {
                        "url": { "type": "string" },
                        "headers": { "type": "array", "items": { "$ref": "#/components/schemas/Header" } }
                    }
                },
                "Header": { "type": "object", "properties": { "name": { "type": "string" } } }
            } }
        });
        let r = SchemaRenderer::new(&root);
        let s = r.render_ref(&ReferenceOr::<Schema>::Reference {
            reference: "#/components/schemas/Hook".to_string(),
        });
        assert_eq!(s["type"], "object");
        assert_eq!(s["required"], json!(["url"]));
        assert_eq!(
            s["properties"]["headers"]["items"]["properties"]["name"]["type"],
            "string"
        );
    }

    #[test]
    fn self_referencing_schema_terminates() {
        let root = json!({
            "components": { "schemas": {
                "Node": {
                    "type": "object",
                    "properties": { "next": { "$ref": "#/components/schemas/Node" } }
                }
            } }
        });
        let r = SchemaRenderer::new(&root);
        let s = r.render_ref(&ReferenceOr::<Schema>::Reference {
            reference: "#/components/schemas/Node".to_string(),
        });
        assert_eq!(s["type"], "object");
    }

    #[test]
    fn external_refs_are_kept() {
        let root = json!({});
        let r = SchemaRenderer::new(&root);
        let s = r.render_ref(&ReferenceOr::<Schema>::Reference {
            reference: "common.json#/Hook".to_string(),
        });
        assert_eq!(s, json!({"$ref": "common.json#/Hook"}));
    }

    #[test]
    fn input_schema_lists_required_params() {
        let id = json!({"type": "string"});
        let q = json!({"type": "string"});
        let s = build_input_schema([("id", &id, true), ("q", &q, false)]);
        assert_eq!(s["type"], "object");
        assert_eq!(s["required"], json!(["id"]));
        assert!(s["properties"].get("q").is_some());

        let s = build_input_schema([("q", &q, false)]);
        assert!(s.get("required").is_none());
    }
}
