//! Serving the generated tool server over stdio or streamable HTTP.

use crate::config::Transport;
use crate::error::ServerError;
use axum::Router;
use axum::routing::get;
use hookrelay_openapi_tools::OpenApiServer;
use rmcp::ServiceExt as _;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// The generated server plus how it is exposed.
#[derive(Debug)]
pub struct ToolServer {
    handler: OpenApiServer,
    transport: Transport,
    bind: SocketAddr,
}

impl ToolServer {
    #[must_use]
    pub fn new(handler: OpenApiServer, transport: Transport, bind: SocketAddr) -> Self {
        Self {
            handler,
            transport,
            bind,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &OpenApiServer {
        &self.handler
    }

    /// Serve until the client goes away (stdio) or the process is interrupted (HTTP).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Startup`] if the transport cannot be set up or fails while serving.
    pub async fn run(self) -> Result<(), ServerError> {
        match self.transport {
            Transport::Stdio => {
                let (stdin, stdout) = rmcp::transport::stdio();
                self.serve_io(stdin, stdout).await
            }
            Transport::Http => self.serve_http().await,
        }
    }

    /// Serve one MCP session over a byte stream pair (newline-delimited JSON-RPC).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Startup`] if the MCP handshake fails or the session task panics.
    pub async fn serve_io<R, W>(self, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        tracing::info!(
            name = %self.handler.name(),
            tools = self.handler.tools().len(),
            "serving MCP over stdio"
        );
        let service = self
            .handler
            .serve((reader, writer))
            .await
            .map_err(|e| ServerError::startup(format!("MCP initialization failed: {e}")))?;

        let reason = service.waiting().await.map_err(ServerError::startup)?;
        tracing::info!(?reason, "MCP session ended");
        Ok(())
    }

    async fn serve_http(self) -> Result<(), ServerError> {
        let shutdown = CancellationToken::new();
        let handler = self.handler.clone();
        let mcp = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                cancellation_token: shutdown.child_token(),
                ..Default::default()
            },
        );

        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .nest_service("/mcp", mcp);

        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .map_err(|e| ServerError::startup(format!("failed to bind {}: {e}", self.bind)))?;
        tracing::info!(
            name = %self.handler.name(),
            tools = self.handler.tools().len(),
            addr = %self.bind,
            "serving MCP over streamable HTTP at /mcp"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
                tracing::info!("shutting down");
                shutdown.cancel();
            })
            .await
            .map_err(ServerError::startup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookrelay_openapi_tools::{ApiClient, ServerOptions};
    use hookrelay_test_support::{MockApi, hook_relay_document};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::io::{
        AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, DuplexStream, Lines, ReadHalf,
        WriteHalf,
    };
    use tokio::task::JoinHandle;

    async fn tool_server(base_url: &str) -> ToolServer {
        let client = ApiClient::new(base_url).unwrap();
        let handler = OpenApiServer::from_openapi(
            hook_relay_document(),
            client,
            "test",
            ServerOptions::default(),
        )
        .await
        .unwrap();
        ToolServer::new(handler, Transport::Stdio, SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    struct Client {
        writer: WriteHalf<DuplexStream>,
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    }

    impl Client {
        async fn send(&mut self, msg: Value) {
            let mut line = msg.to_string();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.flush().await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("response in time")
                .unwrap()
                .expect("stream open");
            serde_json::from_str(&line).unwrap()
        }

        async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
            self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .await;
            let msg = self.recv().await;
            assert_eq!(msg["id"], id);
            msg
        }

        async fn initialize(&mut self) -> Value {
            let init = self
                .request(
                    0,
                    "initialize",
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {},
                        "clientInfo": { "name": "hookrelay-tests", "version": "0" }
                    }),
                )
                .await;
            self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .await;
            init
        }
    }

    fn connect(server: ToolServer) -> (Client, JoinHandle<Result<(), ServerError>>) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);
        let handle = tokio::spawn(server.serve_io(server_read, server_write));
        let client = Client {
            writer: client_write,
            lines: BufReader::new(client_read).lines(),
        };
        (client, handle)
    }

    #[tokio::test]
    async fn initialize_advertises_name_and_tools() {
        let (mut client, _handle) = connect(tool_server("http://127.0.0.1:9").await);

        let init = client.initialize().await;
        assert_eq!(init["result"]["serverInfo"]["name"], "test");
        assert!(init["result"]["capabilities"]["tools"].is_object());
        assert_eq!(
            init["result"]["instructions"],
            "Receive, store and replay webhooks."
        );

        let list = client.request(1, "tools/list", json!({})).await;
        let mut names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["createHook", "deleteHook", "failWith", "getBinary", "getImage", "listHooks"]
        );
    }

    #[tokio::test]
    async fn tools_call_reaches_the_api() {
        let api = MockApi::start(hook_relay_document()).await.unwrap();
        let (mut client, _handle) = connect(tool_server(&api.base_url()).await);
        client.initialize().await;

        let call = client
            .request(
                1,
                "tools/call",
                json!({ "name": "deleteHook", "arguments": { "id": "h-1" } }),
            )
            .await;
        assert_ne!(call["result"]["isError"], true, "{call}");
        let text = call["result"]["content"][0]["text"].as_str().unwrap();
        let echoed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(echoed["method"], "DELETE");
        assert_eq!(echoed["path"], "/echo/hooks/h-1");

        let failed = client
            .request(
                2,
                "tools/call",
                json!({ "name": "failWith", "arguments": { "code": 500 } }),
            )
            .await;
        assert_eq!(failed["result"]["isError"], true, "{failed}");
        let text = failed["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("500"), "{text}");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_invalid_params_error() {
        let (mut client, _handle) = connect(tool_server("http://127.0.0.1:9").await);
        client.initialize().await;

        let resp = client
            .request(1, "tools/call", json!({ "name": "nope", "arguments": {} }))
            .await;
        assert_eq!(resp["error"]["code"], -32602, "{resp}");
    }

    #[tokio::test]
    async fn session_runs_until_the_client_disconnects() {
        let (mut client, handle) = connect(tool_server("http://127.0.0.1:9").await);
        client.initialize().await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_finished());

        drop(client);
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("session ends after disconnect")
            .unwrap();
        assert!(result.is_ok(), "{result:?}");
    }
}
