//! Startup: fetch the API description, bind a client, build the tool server.

use crate::config::Settings;
use crate::error::{FetchError, ServerError};
use crate::serve::ToolServer;
use hookrelay_openapi_tools::redact::sanitize_reqwest_error;
use hookrelay_openapi_tools::{ApiClient, OpenApiServer, ServerOptions};
use serde_json::Value;

/// Fetch the `OpenAPI` document and build the tool server around it.
///
/// Nothing is retried; the first failure is returned.
///
/// # Errors
///
/// - [`ServerError::Fetch`] if the document cannot be retrieved or is not JSON.
/// - [`ServerError::Startup`] if the client or the tool server cannot be built from it.
pub async fn create_server(settings: &Settings) -> Result<ToolServer, ServerError> {
    let spec_url = settings.spec_url();
    tracing::info!("Fetching OpenAPI spec from {spec_url}...");

    let document = match fetch_spec(&reqwest::Client::new(), &spec_url).await {
        Ok(document) => document,
        Err(e) => {
            tracing::error!("Error fetching OpenAPI spec: {e}");
            return Err(e.into());
        }
    };

    let client = ApiClient::new(&settings.api_base_url)?
        .with_timeout(settings.call_timeout())
        .with_max_response_bytes(settings.max_response_bytes);
    let options = ServerOptions {
        document_url: Some(spec_url),
        tools: settings.tool_config(),
    };
    let server =
        OpenApiServer::from_openapi(document, client, settings.name.clone(), options).await?;

    Ok(ToolServer::new(server, settings.transport, settings.bind))
}

/// `GET` the document and parse the body as JSON. The shape is not checked here.
///
/// # Errors
///
/// Returns a [`FetchError`] for transport failures, non-2xx statuses and non-JSON bodies.
pub async fn fetch_spec(http: &reqwest::Client, url: &str) -> Result<Value, FetchError> {
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        message: sanitize_reqwest_error(&e),
    };

    let response = http.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&body).map_err(|source| FetchError::Parse {
        url: url.to_string(),
        source,
    })
}
