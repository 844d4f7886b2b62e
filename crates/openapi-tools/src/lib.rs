//! OpenAPI->MCP tool server generation.
//!
//! Given an `OpenAPI` 3.x document and an [`ApiClient`] bound to the API it describes,
//! [`OpenApiServer::from_openapi`] produces an rmcp `ServerHandler` that exposes one MCP tool
//! per operation and forwards `tools/call` to the API.

pub mod client;
pub mod config;
mod discovery;
pub mod document;
pub mod error;
pub mod query;
pub mod redact;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod semantics;
pub mod server;

pub use client::ApiClient;
pub use config::{DiscoverFilter, ToolSourceConfig};
pub use error::{OpenApiToolsError, Result};
pub use server::{OpenApiServer, ServerOptions};
