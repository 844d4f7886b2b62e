//! Turning `OpenAPI` operations into MCP tool definitions.

use crate::config::DiscoverFilter;
use crate::error::{OpenApiToolsError, Result};
use crate::query::QuerySerialization;
use crate::resolver::{DocId, OpenApiResolver};
use crate::schema::{SchemaRenderer, build_input_schema, wrap_body_output_schema};
use mime::Mime;
use openapiv3::{
    MediaType, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody,
    Response, Schema, SchemaKind, StatusCode, Type,
};
use regex::Regex;
use reqwest::Method;
use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

const MAX_TOOL_NAME_LEN: usize = 64;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"));

/// A tool generated from one `OpenAPI` operation.
#[derive(Debug, Clone)]
pub(crate) struct GeneratedTool {
    pub name: String,
    pub description: String,
    pub method: Method,
    /// Path template, e.g. `/hooks/{id}`.
    pub path: String,
    pub parameters: Vec<ToolParameter>,
    pub input_schema: Arc<JsonObject>,
    pub output_schema: Option<Arc<JsonObject>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ToolParameter {
    /// Argument name as exposed to MCP clients.
    pub tool_name: String,
    /// Name on the wire (path placeholder, query key, header, body field).
    pub original_name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
    pub query: Option<QuerySerialization>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamLocation {
    Path,
    Query,
    Header,
    /// One field of a flattened JSON object body.
    BodyField,
    /// The whole JSON body, exposed as a single `body` argument.
    Body,
}

struct OperationRef<'a> {
    doc: &'a DocId,
    path: &'a str,
    method: Method,
    operation: &'a Operation,
    path_item_params: &'a [ReferenceOr<Parameter>],
}

/// Walk every path item and generate one tool per allowed operation.
///
/// Operations that cannot be converted are logged and skipped.
pub(crate) async fn discover_tools(
    spec: &OpenAPI,
    resolver: &OpenApiResolver,
    filter: &DiscoverFilter,
) -> Vec<GeneratedTool> {
    let mut tools = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for (path, item) in &spec.paths.paths {
        let (doc, item) = match resolver.resolve_path_item(resolver.root_doc(), item).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "skipping path");
                continue;
            }
        };

        let operations = [
            (Method::GET, &item.get),
            (Method::POST, &item.post),
            (Method::PUT, &item.put),
            (Method::DELETE, &item.delete),
            (Method::PATCH, &item.patch),
        ];

        for (method, operation) in operations {
            let Some(operation) = operation else {
                continue;
            };
            if !filter.allows(method.as_str(), path) {
                tracing::debug!(method = %method, path = %path, "operation filtered out");
                continue;
            }

            let op = OperationRef {
                doc: &doc,
                path,
                method: method.clone(),
                operation,
                path_item_params: &item.parameters,
            };
            match generate_tool(resolver, op, &mut names).await {
                Ok(tool) => {
                    tracing::debug!(tool = %tool.name, method = %method, path = %path, "generated tool");
                    tools.push(tool);
                }
                Err(e) => {
                    tracing::warn!(method = %method, path = %path, error = %e, "skipping operation");
                }
            }
        }
    }

    tools
}

async fn generate_tool(
    resolver: &OpenApiResolver,
    op: OperationRef<'_>,
    names: &mut HashSet<String>,
) -> Result<GeneratedTool> {
    let operation = op.operation;
    let parameters = collect_parameters(resolver, &op).await?;

    let input_schema = build_input_schema(
        parameters
            .iter()
            .map(|p| (p.tool_name.as_str(), &p.schema, p.required)),
    );
    let input_schema = match input_schema {
        Value::Object(obj) => obj,
        _ => JsonObject::new(),
    };

    let output_schema = derive_body_schema(resolver, op.doc, operation)
        .await?
        .map(|body| Arc::new(wrap_body_output_schema(body)));

    // Reserve the name last so skipped operations don't consume a suffix.
    let base = operation
        .operation_id
        .clone()
        .unwrap_or_else(|| canonical_name(op.method.as_str(), op.path));
    let name = reserve_unique_name(names, &base);

    let description = operation
        .summary
        .clone()
        .or_else(|| operation.description.clone())
        .unwrap_or_else(|| format!("Calls {} {}", op.method, op.path));

    Ok(GeneratedTool {
        name,
        description,
        method: op.method,
        path: op.path.to_string(),
        parameters,
        input_schema: Arc::new(input_schema),
        output_schema,
    })
}

async fn collect_parameters(
    resolver: &OpenApiResolver,
    op: &OperationRef<'_>,
) -> Result<Vec<ToolParameter>> {
    let merged = merge_parameters(
        resolver,
        op.doc,
        op.path_item_params,
        &op.operation.parameters,
    )
    .await?;

    let mut parameters = Vec::with_capacity(merged.len());
    let mut seen: HashSet<String> = HashSet::new();

    for (doc, param) in &merged {
        let param = extract_parameter(resolver, doc, param).await?;
        if !seen.insert(param.tool_name.clone()) {
            return Err(OpenApiToolsError::ParamCollision(format!(
                "Parameter '{}' appears in more than one location in {} {}",
                param.tool_name, op.method, op.path
            )));
        }
        parameters.push(param);
    }

    if let Some(body_ref) = &op.operation.request_body {
        let (body_doc, body) = resolver.resolve_request_body(op.doc, body_ref).await?;
        for field in extract_body_params(resolver, &body_doc, &body).await? {
            if !seen.insert(field.tool_name.clone()) {
                return Err(OpenApiToolsError::ParamCollision(format!(
                    "Body field '{}' collides with a parameter in {} {}",
                    field.tool_name, op.method, op.path
                )));
            }
            parameters.push(field);
        }
    }

    Ok(parameters)
}

/// Path-item parameters first, replaced in place by operation parameters with the same name
/// and location.
async fn merge_parameters(
    resolver: &OpenApiResolver,
    doc: &DocId,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<(DocId, Parameter)>> {
    fn key(p: &Parameter) -> (&'static str, String) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.clone()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.clone()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.clone()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.clone()),
        }
    }

    let mut merged: Vec<(DocId, Parameter)> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let (param_doc, param) = resolver.resolve_parameter(doc, p).await?;
        match index.get(&key(&param)).copied() {
            Some(i) => merged[i] = (param_doc, param),
            None => {
                index.insert(key(&param), merged.len());
                merged.push((param_doc, param));
            }
        }
    }

    Ok(merged)
}

async fn extract_parameter(
    resolver: &OpenApiResolver,
    doc: &DocId,
    param: &Parameter,
) -> Result<ToolParameter> {
    let (data, location, query) = match param {
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path, None),
        Parameter::Query {
            parameter_data,
            style,
            allow_reserved,
            allow_empty_value,
            ..
        } => (
            parameter_data,
            ParamLocation::Query,
            Some(QuerySerialization::new(
                style.clone(),
                parameter_data.explode,
                *allow_reserved,
                allow_empty_value.unwrap_or(false),
            )),
        ),
        Parameter::Header { parameter_data, .. } => (parameter_data, ParamLocation::Header, None),
        Parameter::Cookie { parameter_data, .. } => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "cookie parameter '{}' is not supported",
                parameter_data.name
            )));
        }
    };

    let mut schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema) => render_schema_ref(resolver, doc, schema).await,
        ParameterSchemaOrContent::Content(content) => {
            match find_json_media(content).and_then(|mt| mt.schema.as_ref()) {
                Some(s) => render_schema_ref(resolver, doc, s).await,
                None => json!({ "type": "string" }),
            }
        }
    };

    if let Some(obj) = schema.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &data.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Ok(ToolParameter {
        tool_name: data.name.clone(),
        original_name: data.name.clone(),
        location,
        // Path parameters are always required.
        required: location == ParamLocation::Path || data.required,
        schema,
        query,
    })
}

async fn extract_body_params(
    resolver: &OpenApiResolver,
    doc: &DocId,
    body: &RequestBody,
) -> Result<Vec<ToolParameter>> {
    let Some(schema_ref) = find_json_media(&body.content).and_then(|mt| mt.schema.as_ref()) else {
        if !body.content.is_empty() {
            tracing::debug!(
                media_types = ?body.content.keys().collect::<Vec<_>>(),
                "request body has no JSON media type; not exposed as arguments"
            );
        }
        return Ok(Vec::new());
    };

    let (schema_doc, schema) = resolver.resolve_schema(doc, schema_ref).await?;
    let root = resolver.cached(&schema_doc).unwrap_or_default();
    let renderer = SchemaRenderer::new(&root);

    if let SchemaKind::Type(Type::Object(obj)) = &schema.schema_kind
        && !obj.properties.is_empty()
    {
        // An optional body can't express "these fields are required if any are sent".
        return Ok(obj
            .properties
            .iter()
            .map(|(name, prop)| ToolParameter {
                tool_name: name.clone(),
                original_name: name.clone(),
                location: ParamLocation::BodyField,
                required: body.required && obj.required.contains(name),
                schema: renderer.render_ref(prop),
                query: None,
            })
            .collect());
    }

    let mut schema_value = renderer.render(&schema);
    if let Some(obj) = schema_value.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &body.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Ok(vec![ToolParameter {
        tool_name: "body".to_string(),
        original_name: "body".to_string(),
        location: ParamLocation::Body,
        required: body.required,
        schema: schema_value,
        query: None,
    }])
}

/// Body schema of the lowest explicit 2xx response (or the `2XX` range) with JSON content.
async fn derive_body_schema(
    resolver: &OpenApiResolver,
    doc: &DocId,
    operation: &Operation,
) -> Result<Option<Value>> {
    let explicit = operation
        .responses
        .responses
        .iter()
        .filter_map(|(code, resp)| match code {
            StatusCode::Code(n) if (200..300).contains(n) => Some((*n, resp)),
            _ => None,
        })
        .min_by_key(|(n, _)| *n)
        .map(|(_, resp)| resp);
    let range = operation
        .responses
        .responses
        .get(&StatusCode::Range(2));

    let Some(resp_ref) = explicit.or(range) else {
        return Ok(None);
    };

    let (resp_doc, resp): (DocId, Response) = resolver.resolve_response(doc, resp_ref).await?;
    let Some(schema_ref) = find_json_media(&resp.content).and_then(|mt| mt.schema.as_ref()) else {
        return Ok(None);
    };

    Ok(Some(render_schema_ref(resolver, &resp_doc, schema_ref).await))
}

/// Resolve a possibly-referenced schema and render it against the document it lives in.
///
/// Unresolvable refs are kept as `{"$ref": ...}` so the operation still becomes a tool.
async fn render_schema_ref(
    resolver: &OpenApiResolver,
    doc: &DocId,
    schema: &ReferenceOr<Schema>,
) -> Value {
    match resolver.resolve_schema(doc, schema).await {
        Ok((schema_doc, resolved)) => {
            let root = resolver.cached(&schema_doc).unwrap_or_default();
            SchemaRenderer::new(&root).render(&resolved)
        }
        Err(e) => {
            tracing::debug!(error = %e, "keeping unresolved schema ref");
            match schema {
                ReferenceOr::Reference { reference } => json!({ "$ref": reference }),
                ReferenceOr::Item(_) => json!({}),
            }
        }
    }
}

/// Prefer `application/json`, then any other JSON media type (`+json` suffixes included).
fn find_json_media<'a>(
    content: impl IntoIterator<Item = (&'a String, &'a MediaType)>,
) -> Option<&'a MediaType> {
    let mut fallback = None;
    for (media_type, mt) in content {
        let Ok(parsed) = media_type.parse::<Mime>() else {
            continue;
        };
        if parsed.essence_str() == "application/json" {
            return Some(mt);
        }
        if fallback.is_none()
            && (parsed.subtype() == mime::JSON || parsed.suffix() == Some(mime::JSON))
        {
            fallback = Some(mt);
        }
    }
    fallback
}

/// `{method}_{path}` with path params unwrapped and non-alphanumerics collapsed to `_`.
fn canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let mut name = NON_ALNUM
        .replace_all(&raw, "_")
        .trim_matches('_')
        .to_string();
    if name.len() > MAX_TOOL_NAME_LEN {
        name.truncate(MAX_TOOL_NAME_LEN);
        name.truncate(name.trim_end_matches('_').len());
    }
    name
}

fn reserve_unique_name(names: &mut HashSet<String>, base: &str) -> String {
    if names.insert(base.to_string()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| names.insert(candidate.clone()))
        .unwrap_or_else(|| base.to_string())
}
