//! The HTTP seam every remote fetch goes through.
//!
//! Loaders never talk to `reqwest` directly; they issue [`HttpRequest`]s
//! against an [`HttpTransport`]. Production code uses [`ReqwestTransport`],
//! tests substitute a recording mock.

use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::core::VectorError;

/// Boxed future returned by [`HttpTransport::get`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;

/// A single GET request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL
    pub url: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Username and password for HTTP basic authentication
    pub basic_auth: Option<(String, String)>,
    /// Token for bearer authentication, takes precedence over basic auth
    pub bearer: Option<String>,
}

impl HttpRequest {
    /// A plain GET of `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Authenticate with username and password.
    #[must_use]
    pub fn basic_auth(mut self, credentials: Option<(String, String)>) -> Self {
        self.basic_auth = credentials;
        self
    }

    /// Authenticate with a bearer token.
    #[must_use]
    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// The parts of a response the loaders look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status is 2xx.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Performs HTTP GET requests.
///
/// A network-level failure (DNS, connect, timeout) is an error; every
/// received status, including 4xx and 5xx, is a response.
pub trait HttpTransport: Send + Sync {
    /// Send a GET request.
    fn get(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("release-vector/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            tracing::debug!("GET {}", request.url);

            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(token) = &request.bearer {
                builder = builder.bearer_auth(token);
            } else if let Some((username, password)) = &request.basic_auth {
                builder = builder.basic_auth(username, Some(password));
            }

            let response = builder.send().await.map_err(|e| VectorError::NetworkError {
                operation: format!("GET {}", request.url),
                reason: e.to_string(),
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(|e| VectorError::NetworkError {
                operation: format!("read body of {}", request.url),
                reason: e.to_string(),
            })?;

            Ok(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(401, "").with_header("WWW-Authenticate", "Bearer realm=x");
        assert_eq!(response.header("www-authenticate"), Some("Bearer realm=x"));
        assert_eq!(response.header("Www-Authenticate"), Some("Bearer realm=x"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn test_is_success() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://r.example/v2/")
            .header("Accept", "application/json")
            .basic_auth(Some(("u".to_string(), "p".to_string())));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.basic_auth, Some(("u".to_string(), "p".to_string())));
        assert!(request.bearer.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let err = transport.get(HttpRequest::get("http://127.0.0.1:1/nothing")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VectorError>(),
            Some(VectorError::NetworkError { .. })
        ));
    }
}
