//! Hook Relay MCP server.
//!
//! Fetches the Hook Relay API's `OpenAPI` document, binds an HTTP client to the API and serves
//! one MCP tool per operation over stdio or streamable HTTP.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod serve;

pub use bootstrap::{create_server, fetch_spec};
pub use config::{LogFormat, Settings, Transport};
pub use error::{FetchError, ServerError};
pub use serve::ToolServer;
