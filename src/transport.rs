//! Minimal HTTP client abstraction for talking to the remote conversion API.
//!
//! The remote workflow only ever needs "send this request, give me status,
//! headers and body". Hiding `reqwest` behind the [`Transport`] trait lets the
//! workflow be driven by an in-memory script in tests.

use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Longest body excerpt kept in a [`TransportError::Status`].
const ERROR_BODY_LIMIT: usize = 500;

/// HTTP methods used by the remote workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        })
    }
}

/// An outgoing request. Every request carries its own timeout.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            timeout,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A received response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Turn a non-2xx response into [`TransportError::Status`].
    pub fn error_for_status(self, url: &str) -> Result<Self, TransportError> {
        if self.is_success() {
            return Ok(self);
        }
        let mut body = String::from_utf8_lossy(&self.body).into_owned();
        if body.len() > ERROR_BODY_LIMIT {
            let cut = (0..=ERROR_BODY_LIMIT)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
            body.push('\u{2026}');
        }
        Err(TransportError::Status {
            url: url.to_string(),
            status: self.status,
            body,
        })
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Sends one HTTP request and returns the raw response.
///
/// Implementations return `Ok` for every response the server produced,
/// whatever its status; callers decide via [`HttpResponse::error_for_status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("convert-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: format!("client construction failed: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        debug!(%method, %url, bytes = body.len(), "sending request");

        let mut builder = self.client.request(method, &url).timeout(timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.clone(),
                    timeout,
                }
            } else {
                TransportError::Request {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();
        debug!(status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::new(201).with_header("Location", "/status/1");
        assert_eq!(resp.header("location"), Some("/status/1"));
        assert_eq!(resp.header("LOCATION"), Some("/status/1"));
        assert_eq!(resp.header("x-request-id"), None);

        let req = HttpRequest::new(Method::Get, "http://x", Duration::from_secs(1))
            .header("X-API-Key", "id");
        assert_eq!(req.header_value("x-api-key"), Some("id"));
    }

    #[test]
    fn success_passes_through() {
        let resp = HttpResponse::new(204).error_for_status("http://x").unwrap();
        assert_eq!(resp.status, 204);
    }

    #[test]
    fn non_success_becomes_status_error() {
        let err = HttpResponse::new(401)
            .with_body("bad token")
            .error_for_status("http://x/token")
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                url: "http://x/token".into(),
                status: 401,
                body: "bad token".into(),
            }
        );
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let err = HttpResponse::new(500)
            .with_body("é".repeat(600))
            .error_for_status("http://x")
            .unwrap_err();
        let TransportError::Status { body, .. } = err else {
            panic!("expected status error");
        };
        assert!(body.len() <= ERROR_BODY_LIMIT + '\u{2026}'.len_utf8());
        assert!(body.ends_with('\u{2026}'));
    }
}
