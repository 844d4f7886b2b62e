use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why the `OpenAPI` document could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, broken body stream...
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{url} did not return valid JSON: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level failure, split by the stage that failed.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to fetch OpenAPI spec: {0}")]
    Fetch(#[from] FetchError),

    /// Building the tool server or running it failed.
    #[error("{source}")]
    Startup {
        #[source]
        source: BoxError,
    },
}

impl ServerError {
    pub fn startup(source: impl Into<BoxError>) -> Self {
        ServerError::Startup {
            source: source.into(),
        }
    }
}

impl From<hookrelay_openapi_tools::OpenApiToolsError> for ServerError {
    fn from(e: hookrelay_openapi_tools::OpenApiToolsError) -> Self {
        ServerError::startup(e)
    }
}
