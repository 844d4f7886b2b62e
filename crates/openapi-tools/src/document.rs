//! Turning a fetched JSON document into a typed `OpenAPI` description.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::OpenAPI;
use serde_json::{Map, Value, json};

/// Placeholder `info.version` used when the document omits `info`.
const PLACEHOLDER_VERSION: &str = "0.0.0";

/// Parse a JSON value as an `OpenAPI` 3.x document.
///
/// See [`normalize_document`] for what is accepted.
///
/// # Errors
///
/// Returns an error if the value is not an object, is a Swagger 2.0 document, carries no
/// `openapi` version at all, or does not deserialize as `OpenAPI` 3.x.
pub fn parse_document(document: Value, title: &str) -> Result<OpenAPI> {
    let document = normalize_document(document, title)?;
    serde_json::from_value(document)
        .map_err(|source| OpenApiToolsError::InvalidDocument { source })
}

/// Check the version of a raw document and bring it into the shape [`parse_document`] reads.
///
/// Minimal documents are accepted: a missing `info` object is filled in with `title` as its
/// title, and a missing `paths` object is treated as empty. OpenAPI 3.1 schema keywords are
/// rewritten to their 3.0 form. Normalizing twice changes nothing.
///
/// # Errors
///
/// Returns an error if the value is not an object, is a Swagger 2.0 document or carries no
/// 3.x `openapi` version.
pub fn normalize_document(document: Value, title: &str) -> Result<Value> {
    let Value::Object(mut obj) = document else {
        return Err(OpenApiToolsError::OpenApi(format!(
            "expected a JSON object, got {}",
            json_type_name(&document)
        )));
    };

    if let Some(version) = obj.get("swagger") {
        return Err(OpenApiToolsError::OpenApi(format!(
            "Swagger {} documents are not supported (OpenAPI 3.x required)",
            version.as_str().unwrap_or("2.0")
        )));
    }

    match obj.get("openapi").and_then(Value::as_str) {
        Some(v) if v.starts_with("3.1") => {
            tracing::debug!(version = v, "rewriting OpenAPI 3.1 schemas to the 3.0 model");
            for value in obj.values_mut() {
                downgrade_schemas(value);
            }
        }
        Some(v) if v.starts_with('3') => {}
        Some(v) => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "unsupported OpenAPI version '{v}' (OpenAPI 3.x required)"
            )));
        }
        None => {
            return Err(OpenApiToolsError::OpenApi(
                "document has no 'openapi' version field".to_string(),
            ));
        }
    }

    normalize(&mut obj, title);
    Ok(Value::Object(obj))
}

fn normalize(obj: &mut Map<String, Value>, title: &str) {
    if !obj.get("info").is_some_and(Value::is_object) {
        tracing::debug!("OpenAPI document has no info object; using placeholder");
        obj.insert(
            "info".to_string(),
            json!({ "title": title, "version": PLACEHOLDER_VERSION }),
        );
    } else if let Some(Value::Object(info)) = obj.get_mut("info") {
        info.entry("title").or_insert_with(|| json!(title));
        info.entry("version")
            .or_insert_with(|| json!(PLACEHOLDER_VERSION));
    }

    if !obj.get("paths").is_some_and(Value::is_object) {
        obj.insert("paths".to_string(), json!({}));
    }
}

/// Rewrite the JSON Schema 2020-12 keywords of OpenAPI 3.1 into their 3.0 equivalents:
///
/// - `type: [T, "null"]` becomes `type: T, nullable: true`; several non-null types become an
///   `anyOf` of single-type schemas
/// - `type: "null"` becomes `nullable: true`
/// - numeric `exclusiveMinimum`/`exclusiveMaximum` become `minimum`/`maximum` plus the boolean flag
/// - `const` becomes a one-value `enum`
///
/// Example payloads and default values are left untouched.
pub(crate) fn downgrade_schemas(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(downgrade_schemas),
        Value::Object(obj) => {
            downgrade_schema_keywords(obj);
            for (key, child) in obj.iter_mut() {
                match (key.as_str(), child) {
                    ("example" | "examples" | "default" | "enum", _) => {}
                    // Property names are not keywords.
                    ("properties", Value::Object(props)) => {
                        props.values_mut().for_each(downgrade_schemas);
                    }
                    (_, child) => downgrade_schemas(child),
                }
            }
        }
        _ => {}
    }
}

fn downgrade_schema_keywords(obj: &mut Map<String, Value>) {
    match obj.get("type") {
        Some(Value::Array(types)) => {
            let mut nullable = false;
            let mut concrete = Vec::new();
            for t in types.iter().filter_map(Value::as_str) {
                if t == "null" {
                    nullable = true;
                } else {
                    concrete.push(t.to_string());
                }
            }
            obj.remove("type");
            match concrete.as_slice() {
                [] => {}
                [single] => {
                    obj.insert("type".to_string(), json!(single));
                }
                many => {
                    let variants: Vec<Value> = many.iter().map(|t| json!({ "type": t })).collect();
                    obj.insert("anyOf".to_string(), Value::Array(variants));
                }
            }
            if nullable {
                obj.insert("nullable".to_string(), Value::Bool(true));
            }
        }
        Some(Value::String(t)) if t == "null" => {
            obj.remove("type");
            obj.insert("nullable".to_string(), Value::Bool(true));
        }
        _ => {}
    }

    for (exclusive, bound) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
        if let Some(limit) = obj.get(exclusive).filter(|v| v.is_number()).cloned() {
            obj.insert(bound.to_string(), limit);
            obj.insert(exclusive.to_string(), Value::Bool(true));
        }
    }

    if let Some(constant) = obj.remove("const") {
        obj.entry("enum").or_insert_with(|| json!([constant]));
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
