use clap::{Parser, ValueEnum};
use hookrelay_openapi_tools::client::DEFAULT_MAX_RESPONSE_BYTES;
use hookrelay_openapi_tools::{DiscoverFilter, ToolSourceConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_SPEC_PATH: &str = "/swagger/json";
pub const DEFAULT_SERVER_NAME: &str = "Hook Relay API (v2)";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Hook Relay MCP server: exposes the Hook Relay API's endpoints as MCP tools.
#[derive(Debug, Clone, Parser)]
#[command(name = "hookrelay-mcp-server", version, about, long_about = None)]
pub struct Settings {
    /// Base URL of the Hook Relay API. The `OpenAPI` document is fetched from here and every
    /// tool call is sent here.
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Path of the `OpenAPI` document, relative to the API base URL.
    #[arg(long, env = "OPENAPI_SPEC_PATH", default_value = DEFAULT_SPEC_PATH)]
    pub spec_path: String,

    /// Display name advertised to MCP clients.
    #[arg(long, env = "MCP_SERVER_NAME", default_value = DEFAULT_SERVER_NAME)]
    pub name: String,

    #[arg(long, env = "MCP_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Listen address for the HTTP transport.
    #[arg(long, env = "MCP_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Timeout for each outbound API call, in seconds (0 disables it).
    #[arg(long, env = "API_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub call_timeout_secs: u64,

    /// Largest API response body accepted by a tool call, in bytes (0 disables the cap).
    #[arg(long, env = "API_MAX_RESPONSE_BYTES", default_value_t = DEFAULT_MAX_RESPONSE_BYTES)]
    pub max_response_bytes: usize,

    /// Only expose operations matching one of these `"METHOD /path"` globs.
    #[arg(long, env = "MCP_INCLUDE", value_delimiter = ',')]
    pub include: Vec<String>,

    /// Never expose operations matching one of these `"METHOD /path"` globs.
    #[arg(long, env = "MCP_EXCLUDE", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Extra header sent with every API call, as `NAME=VALUE`. Repeatable; the value may
    /// contain commas.
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Extra headers as one comma-separated `NAME=VALUE` list. `--header` wins on a name clash.
    #[arg(long = "headers", env = "API_HEADERS", value_delimiter = ',', value_parser = parse_header)]
    pub header_list: Vec<(String, String)>,

    /// Log filter (`info`, `debug`, `hookrelay_openapi_tools=trace`, ...). `RUST_LOG` wins if set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// MCP over stdin/stdout.
    Stdio,
    /// MCP streamable HTTP at `/mcp`.
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            spec_path: DEFAULT_SPEC_PATH.to_string(),
            name: DEFAULT_SERVER_NAME.to_string(),
            transport: Transport::Stdio,
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            include: Vec::new(),
            exclude: Vec::new(),
            headers: Vec::new(),
            header_list: Vec::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Settings {
    /// Default settings pointed at a different API.
    #[must_use]
    pub fn for_api(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Where the `OpenAPI` document is fetched from.
    #[must_use]
    pub fn spec_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim().trim_end_matches('/'),
            self.spec_path.trim().trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn tool_config(&self) -> ToolSourceConfig {
        ToolSourceConfig {
            discover: DiscoverFilter {
                include: self.include.clone(),
                exclude: self.exclude.clone(),
            },
            headers: self
                .header_list
                .iter()
                .chain(&self.headers)
                .cloned()
                .collect::<HashMap<_, _>>(),
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
