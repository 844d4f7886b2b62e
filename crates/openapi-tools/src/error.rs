//! Error types for `hookrelay-openapi-tools`.

use thiserror::Error;

/// Main error type for the `OpenAPI` tool server.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (bad base URL, bad filter patterns).
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OpenAPI` errors (unsupported document version, unresolved `$ref`s).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// The document is JSON but does not deserialize as an `OpenAPI` 3.x description.
    #[error("OpenAPI error: document is not a valid OpenAPI description: {source}")]
    InvalidDocument {
        #[source]
        source: serde_json::Error,
    },

    /// Runtime errors (unknown tool, missing arguments).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The API answered with a non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Transport-level failures talking to the API (connect, timeout, body read).
    #[error("Request error: {0}")]
    Request(String),

    /// Parameter collision errors.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),
}

impl OpenApiToolsError {
    /// Whether the error was caused by the caller's arguments rather than the upstream API.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, OpenApiToolsError::Runtime(_))
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
