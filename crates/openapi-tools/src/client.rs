//! HTTP client handle bound to the API's base address.

use crate::error::{OpenApiToolsError, Result};
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use url::Url;

/// Default per-call timeout for outbound API requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on a single API response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// A reusable client for calls back into the real API.
///
/// The bootstrapper builds one of these after the `OpenAPI` document has been fetched and hands
/// it to [`crate::server::OpenApiServer::from_openapi`], which owns it from then on.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    /// Normalized base URL (absolute, no trailing slash).
    base_url: String,
    timeout: Option<Duration>,
    max_response_bytes: Option<usize>,
}

/// One `key=value` pair of an outbound query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPair {
    pub key: String,
    pub value: String,
    pub allow_reserved: bool,
}

impl ApiClient {
    /// Create a client for `base_url` with the default call timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute `http(s)` URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute `http(s)` URL.
    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|e| {
            OpenApiToolsError::Config(format!("Invalid API base URL '{base_url}': {e}"))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(OpenApiToolsError::Config(format!(
                "Invalid API base URL '{base_url}': scheme must be http or https",
            )));
        }
        if parsed.host_str().is_none() {
            return Err(OpenApiToolsError::Config(format!(
                "Invalid API base URL '{base_url}': missing host",
            )));
        }

        Ok(Self {
            http,
            base_url: trimmed.to_string(),
            timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_response_bytes: Some(DEFAULT_MAX_RESPONSE_BYTES),
        })
    }

    /// Set the per-call timeout. `Duration::ZERO` disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Cap the size of a response body. `0` removes the cap.
    #[must_use]
    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = (max > 0).then_some(max);
        self
    }

    /// The base address every tool call is made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn max_response_bytes(&self) -> Option<usize> {
        self.max_response_bytes
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Build the absolute URL for `path` (already templated) plus query pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL does not parse.
    pub fn url_for(&self, path: &str, query: &[QueryPair]) -> Result<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| OpenApiToolsError::Runtime(format!("Invalid URL: {e}")))?;

        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|p| {
                    format!(
                        "{}={}",
                        encode_query_component(&p.key, false),
                        encode_query_component(&p.value, p.allow_reserved)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&encoded));
        }

        Ok(url)
    }

    /// Start a request with the client's timeout applied.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match self.timeout {
            Some(t) => request.timeout(t),
            None => request,
        }
    }
}

/// Percent-encode a value substituted into a single path segment.
///
/// Returns `None` for values that cannot stand as a segment of their own: the empty string
/// and the dot segments `.` and `..`, which URL parsing would collapse into a parent path.
pub(crate) fn encode_path_segment(s: &str) -> Option<String> {
    if matches!(s, "" | "." | "..") {
        return None;
    }
    Some(encode_query_component(s, false))
}

fn encode_query_component(s: &str, allow_reserved: bool) -> String {
    // '&', '=' and '#' stay encoded even with allowReserved; they would break the pair list.
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        let keep = is_unreserved(b) || (allow_reserved && is_reserved_but_safe_in_pairs(b));
        if keep {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

fn is_reserved_but_safe_in_pairs(b: u8) -> bool {
    matches!(
        b,
        b':' | b'/'
            | b'?'
            | b'['
            | b']'
            | b'@'
            | b'!'
            | b'$'
            | b'\''
            | b'('
            | b')'
            | b'*'
            | b'+'
            | b','
            | b';'
    )
}
