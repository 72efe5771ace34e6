//! Process-wide configuration for the conversion gateway.
//!
//! Everything the gateway needs to know about its environment (bind address,
//! remote credentials, the LibreOffice binary, timeouts) lives in one
//! immutable [`GatewayConfig`], built once at startup through
//! [`GatewayConfigBuilder`] and shared behind an `Arc`. Nothing in the request
//! path reads the environment or mutates configuration.

use crate::error::GatewayError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Adobe PDF Services regional endpoint.
pub const DEFAULT_BASE_URL: &str = "https://pdf-services-ew1.adobe.io";

/// Default Adobe IMS token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://pdf-services.adobe.io/token";

/// Credentials and endpoints for the remote conversion API.
///
/// Presence of this struct in [`GatewayConfig::remote`] is what makes the
/// remote engine eligible at all.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Base URL for `/assets`, `/operation/exportpdf` and relative status URLs.
    pub base_url: String,
    /// OAuth client-credentials token endpoint.
    pub token_url: String,
}

impl RemoteCredentials {
    /// Credentials against the default production endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Build credentials only when both halves are present and non-empty.
    pub fn from_parts(client_id: Option<String>, client_secret: Option<String>) -> Option<Self> {
        match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(Self::new(id.trim(), secret.trim()))
            }
            _ => None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// `base_url` without a trailing slash, ready for path concatenation.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Timeouts and cadence of the remote workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTimeouts {
    /// Per-call timeout for token, asset, export and status calls. Default: 30 s.
    pub request: Duration,

    /// Per-call timeout for the upload and download transfers. Default: 60 s.
    pub transfer: Duration,

    /// Sleep between status polls. Default: 1 s.
    pub poll_interval: Duration,

    /// Overall polling budget measured from the first poll. Default: 180 s.
    pub poll_deadline: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            transfer: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            poll_deadline: Duration::from_secs(180),
        }
    }
}

/// Configuration for the conversion gateway.
///
/// Built via [`GatewayConfig::builder()`] or using [`GatewayConfig::default()`].
///
/// # Example
/// ```rust
/// use convert_gateway::{GatewayConfig, RemoteCredentials};
///
/// let config = GatewayConfig::builder()
///     .host("127.0.0.1")
///     .port(9000)
///     .remote(Some(RemoteCredentials::new("id", "secret")))
///     .build()
///     .unwrap();
/// assert_eq!(config.bind_addr(), "127.0.0.1:9000");
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// Port to bind. Default: 8787.
    pub port: u16,

    /// Remote API credentials. `None` forces every request onto LibreOffice.
    pub remote: Option<RemoteCredentials>,

    /// Resolved `soffice` path. `None` makes local conversions fail with
    /// [`GatewayError::BackendUnavailable`].
    pub office_binary: Option<PathBuf>,

    /// Budget for reading the whole request body. Default: 30 s.
    pub body_read_timeout: Duration,

    /// Budget for one soffice run before it is killed. Default: 300 s.
    pub local_timeout: Duration,

    /// Remote workflow timings.
    pub remote_timeouts: RemoteTimeouts,

    /// Parent directory for per-request scratch directories.
    /// If None, the system temp directory is used.
    pub scratch_root: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            remote: None,
            office_binary: None,
            body_read_timeout: Duration::from_secs(30),
            local_timeout: Duration::from_secs(300),
            remote_timeouts: RemoteTimeouts::default(),
            scratch_root: None,
        }
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` suitable for a TCP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn remote(mut self, credentials: Option<RemoteCredentials>) -> Self {
        self.config.remote = credentials;
        self
    }

    pub fn office_binary(mut self, path: Option<PathBuf>) -> Self {
        self.config.office_binary = path;
        self
    }

    pub fn body_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_read_timeout = timeout;
        self
    }

    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.config.local_timeout = timeout;
        self
    }

    pub fn remote_timeouts(mut self, timeouts: RemoteTimeouts) -> Self {
        self.config.remote_timeouts = timeouts;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, GatewayError> {
        let c = &self.config;
        if c.host.trim().is_empty() {
            return Err(GatewayError::InvalidConfig("bind host must not be empty".into()));
        }
        if c.body_read_timeout.is_zero() || c.local_timeout.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "body and local timeouts must be > 0".into(),
            ));
        }
        let t = &c.remote_timeouts;
        if t.request.is_zero() || t.transfer.is_zero() || t.poll_deadline.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "remote timeouts must be > 0".into(),
            ));
        }
        if t.poll_interval > t.poll_deadline {
            return Err(GatewayError::InvalidConfig(format!(
                "poll interval {:?} exceeds poll deadline {:?}",
                t.poll_interval, t.poll_deadline
            )));
        }
        if let Some(ref remote) = c.remote {
            validate_http_url("base URL", &remote.base_url)?;
            validate_http_url("token URL", &remote.token_url)?;
        }
        Ok(self.config)
    }
}

fn validate_http_url(what: &str, raw: &str) -> Result<(), GatewayError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| GatewayError::InvalidConfig(format!("{what} '{raw}' is not a URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GatewayError::InvalidConfig(format!(
            "{what} '{raw}' must use http or https, not {other}"
        ))),
    }
}
