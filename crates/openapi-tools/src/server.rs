//! MCP server generated from an `OpenAPI` document.

use crate::client::ApiClient;
use crate::config::ToolSourceConfig;
use crate::document::{normalize_document, parse_document};
use crate::error::Result;
use crate::resolver::DocId;
use crate::runtime::OpenApiToolSource;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::Value;

/// Extra knobs for [`OpenApiServer::from_openapi`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Where the document was fetched from. Relative `$ref`s resolve against it; when unset,
    /// they resolve against the client's base URL.
    pub document_url: Option<String>,
    pub tools: ToolSourceConfig,
}

/// An MCP server exposing one tool per `OpenAPI` operation.
///
/// Cheap to clone; the streamable HTTP transport creates one handler per session.
#[derive(Debug, Clone)]
pub struct OpenApiServer {
    name: String,
    instructions: Option<String>,
    source: OpenApiToolSource,
}

impl OpenApiServer {
    /// Build a server from an `OpenAPI` document and a client bound to the API it describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a usable `OpenAPI` 3.x description or
    /// `options.document_url` is not a valid location. Individual operations that cannot be
    /// converted are skipped rather than failing the build.
    pub async fn from_openapi(
        document: Value,
        client: ApiClient,
        name: impl Into<String>,
        options: ServerOptions,
    ) -> Result<Self> {
        let name = name.into();
        let document = normalize_document(document, &name)?;
        let spec = parse_document(document.clone(), &name)?;
        let location = match &options.document_url {
            Some(url) => DocId::parse(url)?,
            None => DocId::parse(client.base_url())?,
        };

        let source =
            OpenApiToolSource::build(&spec, document, location, client, &options.tools).await;

        Ok(Self {
            name,
            instructions: spec.info.description.clone(),
            source,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client every tool call goes through.
    #[must_use]
    pub fn client(&self) -> &ApiClient {
        self.source.client()
    }

    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.source.list_tools()
    }
}

impl ServerHandler for OpenApiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: self.instructions.clone(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.source.list_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.map_or(Value::Null, Value::Object);

        match self.source.call_tool(&request.name, arguments).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_caller_error() => Err(ErrorData::invalid_params(e.to_string(), None)),
            // Upstream failures go back as tool errors so the model can read them.
            Err(e) => {
                tracing::warn!(tool = %request.name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpenApiToolsError;
    use serde_json::json;

    fn client() -> ApiClient {
        ApiClient::new("http://localhost:5000").unwrap()
    }

    #[tokio::test]
    async fn minimal_document_builds_an_empty_server() {
        let server = OpenApiServer::from_openapi(
            json!({"openapi": "3.0.0", "paths": {}}),
            client(),
            "Hook Relay API (v2)",
            ServerOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(server.name(), "Hook Relay API (v2)");
        assert_eq!(server.client().base_url(), "http://localhost:5000");
        assert!(server.tools().is_empty());

        let info = server.get_info();
        assert_eq!(info.server_info.name, "Hook Relay API (v2)");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.is_none());
    }

    #[tokio::test]
    async fn info_description_becomes_instructions() {
        let server = OpenApiServer::from_openapi(
            json!({
                "openapi": "3.0.0",
                "info": { "title": "Hook Relay", "version": "2", "description": "Replay webhooks." },
                "paths": { "/hooks": { "get": { "operationId": "listHooks", "responses": {} } } }
            }),
            client(),
            "relay",
            ServerOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(server.get_info().instructions.as_deref(), Some("Replay webhooks."));
        assert_eq!(server.tools().len(), 1);
    }

    #[tokio::test]
    async fn serves_openapi_31_documents() {
        let server = OpenApiServer::from_openapi(
            json!({
                "openapi": "3.1.0",
                "info": { "title": "Hook Relay", "version": "2" },
                "paths": {
                    "/hooks/{id}": {
                        "get": {
                            "operationId": "getHook",
                            "parameters": [
                                { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                            ],
                            "responses": {
                                "200": {
                                    "description": "ok",
                                    "content": {
                                        "application/json": { "schema": { "$ref": "#/components/schemas/Hook" } }
                                    }
                                }
                            }
                        }
                    }
                },
                "components": {
                    "schemas": {
                        "Hook": {
                            "type": "object",
                            "properties": { "secret": { "type": ["string", "null"] } }
                        }
                    }
                }
            }),
            client(),
            "relay",
            ServerOptions::default(),
        )
        .await
        .unwrap();

        let tools = server.tools();
        assert_eq!(tools.len(), 1);
        let output = serde_json::to_value(tools[0].output_schema.as_deref().unwrap()).unwrap();
        assert_eq!(
            output["properties"]["body"]["properties"]["secret"]["type"],
            json!(["string", "null"])
        );
    }

    #[tokio::test]
    async fn rejects_documents_that_are_not_openapi() {
        let err = OpenApiServer::from_openapi(
            json!({"swagger": "2.0"}),
            client(),
            "relay",
            ServerOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::OpenApi(_)));
    }
}
