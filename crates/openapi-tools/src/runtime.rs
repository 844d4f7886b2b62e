//! `OpenAPI` tool source runtime.
//!
//! Holds the tools generated from an `OpenAPI` document and turns `tools/call` requests into
//! outbound HTTP requests against the API the document describes.

use crate::client::{ApiClient, QueryPair, encode_path_segment};
use crate::config::ToolSourceConfig;
use crate::discovery::{GeneratedTool, ParamLocation, discover_tools};
use crate::error::{OpenApiToolsError, Result};
use crate::query::{self, QuerySerialization, value_to_string};
use crate::redact::{redact_url, sanitize_reqwest_error};
use crate::resolver::{DocId, OpenApiResolver};
use crate::semantics::annotations_for_method;
use base64::Engine as _;
use mime::Mime;
use openapiv3::OpenAPI;
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// The MCP tools generated from one `OpenAPI` document, bound to an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct OpenApiToolSource {
    client: ApiClient,
    /// Headers sent with every call.
    headers: Arc<Vec<(String, String)>>,
    tools: Arc<Vec<GeneratedTool>>,
}

struct RequestParts {
    path: String,
    query: Vec<QueryPair>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

enum ToolResponse {
    /// A body that parsed as JSON.
    Json(Value),
    /// Text, or a base64 envelope for non-UTF-8 bytes.
    Other(Value),
    Image { bytes: Vec<u8>, mime_type: String },
}

impl OpenApiToolSource {
    /// Discover tools in `spec`.
    ///
    /// `document` is the raw JSON `spec` was parsed from and `location` is where it was
    /// loaded from; relative `$ref`s resolve against it. Operations that cannot be turned into
    /// tools are skipped with a warning.
    pub async fn build(
        spec: &OpenAPI,
        document: Value,
        location: DocId,
        client: ApiClient,
        config: &ToolSourceConfig,
    ) -> Self {
        let resolver = OpenApiResolver::new(location, document, client.http().clone());
        let tools = discover_tools(spec, &resolver, &config.discover).await;
        tracing::info!(
            tools = tools.len(),
            base_url = %client.base_url(),
            "generated tools from OpenAPI document"
        );

        let mut headers: Vec<(String, String)> = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();

        Self {
            client,
            headers: Arc::new(headers),
            tools: Arc::new(tools),
        }
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// List the MCP `Tool`s exposed by this source.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| {
                let mut tool = Tool::new(
                    t.name.clone(),
                    t.description.clone(),
                    Arc::clone(&t.input_schema),
                );
                tool.output_schema.clone_from(&t.output_schema);
                tool.annotations = Some(annotations_for_method(&t.method));
                tool
            })
            .collect()
    }

    /// Execute a tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the tool name is unknown or the arguments are not an object
    /// - required parameters are missing
    /// - the outbound HTTP request fails (transport or non-2xx response)
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Tool not found: {name}")))?;

        match self.execute(tool, &arguments).await? {
            ToolResponse::Image { bytes, mime_type } => {
                let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(CallToolResult {
                    content: vec![Content::image(b64, mime_type)],
                    structured_content: None,
                    is_error: Some(false),
                    meta: None,
                })
            }
            ToolResponse::Json(body) if tool.output_schema.is_some() => {
                let structured = json!({ "body": body });
                Ok(CallToolResult {
                    content: vec![Content::text(structured.to_string())],
                    structured_content: Some(structured),
                    is_error: Some(false),
                    meta: None,
                })
            }
            // Only JSON bodies can satisfy a declared output schema.
            ToolResponse::Json(body) | ToolResponse::Other(body) => {
                let text = match body {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
        }
    }

    async fn execute(&self, tool: &GeneratedTool, arguments: &Value) -> Result<ToolResponse> {
        let parts = build_request_parts(tool, arguments)?;
        let url = self.client.url_for(&parts.path, &parts.query)?;
        tracing::debug!(
            tool = %tool.name,
            method = %tool.method,
            url = %redact_url(&url),
            "calling API"
        );

        let mut request = self.client.request(tool.method.clone(), url);
        // Argument headers replace configured ones with the same name.
        for (key, value) in self.headers.iter().filter(|(key, _)| {
            !parts
                .headers
                .iter()
                .any(|(arg, _)| arg.eq_ignore_ascii_case(key))
        }) {
            request = request.header(key, value);
        }
        for (key, value) in &parts.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &parts.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_body_limited(response, self.client.max_response_bytes()).await?;

        if !status.is_success() {
            let (body, _) = parse_body(&bytes, content_type.as_deref());
            let reason = status.canonical_reason().unwrap_or("Unknown");
            tracing::debug!(tool = %tool.name, status = status.as_u16(), "API returned an error");
            return Err(OpenApiToolsError::Http(format!(
                "API returned {} {reason}: {body}",
                status.as_u16()
            )));
        }

        if is_image(content_type.as_deref()) {
            let mime_type = content_type.unwrap_or_else(|| "image/*".to_string());
            return Ok(ToolResponse::Image {
                bytes,
                mime_type,
            });
        }

        Ok(match parse_body(&bytes, content_type.as_deref()) {
            (body, true) => ToolResponse::Json(body),
            (body, false) => ToolResponse::Other(body),
        })
    }
}

fn build_request_parts(tool: &GeneratedTool, arguments: &Value) -> Result<RequestParts> {
    let args = match arguments {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => {
            return Err(OpenApiToolsError::Runtime(
                "Tool arguments must be a JSON object".to_string(),
            ));
        }
    };

    let default_query = QuerySerialization::default();
    let mut parts = RequestParts {
        path: tool.path.clone(),
        query: Vec::new(),
        headers: Vec::new(),
        body: None,
    };
    let mut fields = Map::new();

    for param in &tool.parameters {
        let value = args
            .and_then(|a| a.get(&param.tool_name))
            .filter(|v| !v.is_null());
        let Some(value) = value else {
            if param.required {
                return Err(OpenApiToolsError::Runtime(format!(
                    "Missing required parameter: {}",
                    param.tool_name
                )));
            }
            continue;
        };

        match param.location {
            ParamLocation::Path => {
                let raw = value_to_string(value);
                if raw.is_empty() {
                    return Err(OpenApiToolsError::Runtime(format!(
                        "Missing required parameter: {}",
                        param.tool_name
                    )));
                }
                let segment = encode_path_segment(&raw).ok_or_else(|| {
                    OpenApiToolsError::Runtime(format!(
                        "Invalid value for path parameter {}: '{raw}'",
                        param.tool_name
                    ))
                })?;
                let placeholder = format!("{{{}}}", param.original_name);
                parts.path = parts.path.replace(&placeholder, &segment);
            }
            ParamLocation::Query => {
                let ser = param.query.as_ref().unwrap_or(&default_query);
                parts.query.extend(query::serialize(
                    &param.original_name,
                    value,
                    param.required,
                    ser,
                ));
            }
            ParamLocation::Header => {
                parts
                    .headers
                    .push((param.original_name.clone(), value_to_string(value)));
            }
            ParamLocation::BodyField => {
                fields.insert(param.original_name.clone(), value.clone());
            }
            ParamLocation::Body => parts.body = Some(value.clone()),
        }
    }

    if parts.body.is_none() && !fields.is_empty() {
        parts.body = Some(Value::Object(fields));
    }

    Ok(parts)
}

fn is_image(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.parse::<Mime>().ok())
        .is_some_and(|m| m.type_() == mime::IMAGE)
}

/// Read the whole body, failing once it grows past `max_bytes`.
async fn read_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>> {
    if let (Some(max), Some(len)) = (max_bytes, response.content_length())
        && len > max as u64
    {
        return Err(OpenApiToolsError::Http(format!(
            "Response too large: {len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?
    {
        if let Some(max) = max_bytes
            && out.len().saturating_add(chunk.len()) > max
        {
            return Err(OpenApiToolsError::Http(format!(
                "Response too large: exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// JSON when it parses, text when it is UTF-8, a base64 envelope otherwise.
///
/// The flag is `true` only for bodies that parsed as JSON.
fn parse_body(bytes: &[u8], content_type: Option<&str>) -> (Value, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => match serde_json::from_str(text) {
            Ok(value) => (value, true),
            Err(_) => (Value::String(text.to_string()), false),
        },
        Err(_) => (
            json!({
                "encoding": "base64",
                "mimeType": content_type,
                "data": base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            false,
        ),
    }
}
