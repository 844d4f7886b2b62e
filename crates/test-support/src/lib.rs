use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use serde_json::{Value, json};
use std::net::{SocketAddr, TcpListener};
use std::process::Child;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status (2xx/3xx).
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// What the mock API answers on `GET /swagger/json`.
#[derive(Debug, Clone)]
pub enum SpecResponse {
    Json(Value),
    Raw { status: u16, body: String },
}

/// In-process stand-in for the Hook Relay API.
///
/// Routes:
/// - `GET /swagger/json`: the configured [`SpecResponse`]
/// - `ANY /echo/{*path}`: echoes method, path, raw query, `x-*` headers and the body as JSON
/// - `ANY /status/{code}`: answers with that status and a small JSON error body
/// - `GET /image.png`: four bytes of `image/png`
/// - `GET /binary`: non-UTF-8 `application/octet-stream`
pub struct MockApi {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockApi {
    /// Serve `document` as the `OpenAPI` description.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(document: Value) -> anyhow::Result<Self> {
        Self::start_with(SpecResponse::Json(document)).await
    }

    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with(spec: SpecResponse) -> anyhow::Result<Self> {
        let spec_route = get(move || {
            let spec = spec.clone();
            async move {
                match spec {
                    SpecResponse::Json(doc) => axum::Json(doc).into_response(),
                    SpecResponse::Raw { status, body } => (
                        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        body,
                    )
                        .into_response(),
                }
            }
        });

        let app = Router::new()
            .route("/swagger/json", spec_route)
            .route("/echo/{*path}", any(echo))
            .route("/status/{code}", any(status))
            .route("/image.png", get(image))
            .route("/binary", get(binary));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock api")?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> axum::Json<Value> {
    let custom: serde_json::Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), json!(v)))
        })
        .collect();
    let body = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)));

    axum::Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "headers": custom,
        "body": body,
    }))
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(json!({ "error": format!("status {code}") })))
}

/// Bytes served by `GET /image.png`.
pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

/// Bytes served by `GET /binary` (not valid UTF-8).
pub const BINARY_BYTES: &[u8] = &[0xFF, 0xFE, 0x00, 0x80];

async fn image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES)
}

async fn binary() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/octet-stream")], BINARY_BYTES)
}

/// A small Hook Relay–shaped document whose operations hit the mock's `/echo` routes.
#[must_use]
pub fn hook_relay_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Hook Relay API",
            "version": "2.0.0",
            "description": "Receive, store and replay webhooks."
        },
        "paths": {
            "/echo/hooks": {
                "get": {
                    "operationId": "listHooks",
                    "summary": "List hooks",
                    "parameters": [
                        { "name": "status", "in": "query", "schema": { "type": "array", "items": { "type": "string" } } },
                        { "name": "X-Request-Id", "in": "header", "schema": { "type": "string" } }
                    ],
                    "responses": {
                        "200": { "description": "ok", "content": { "application/json": { "schema": { "type": "object" } } } }
                    }
                },
                "post": {
                    "operationId": "createHook",
                    "summary": "Create a hook",
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/NewHook" } } }
                    },
                    "responses": { "201": { "description": "created" } }
                }
            },
            "/echo/hooks/{id}": {
                "parameters": [
                    { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                ],
                "delete": {
                    "operationId": "deleteHook",
                    "responses": { "204": { "description": "deleted" } }
                }
            },
            "/status/{code}": {
                "get": {
                    "operationId": "failWith",
                    "parameters": [
                        { "name": "code", "in": "path", "required": true, "schema": { "type": "integer" } }
                    ],
                    "responses": { "default": { "description": "whatever the code says" } }
                }
            },
            "/image.png": {
                "get": { "operationId": "getImage", "responses": { "200": { "description": "png" } } }
            },
            "/binary": {
                "get": { "operationId": "getBinary", "responses": { "200": { "description": "bytes" } } }
            }
        },
        "components": {
            "schemas": {
                "NewHook": {
                    "type": "object",
                    "required": ["url"],
                    "properties": {
                        "url": { "type": "string", "format": "uri" },
                        "events": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}
