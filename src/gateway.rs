//! Gateway coordinator: one conversion request from parsed headers to
//! converted bytes.
//!
//! ## Lifecycle
//!
//! ```text
//! Received ──▶ EngineSelected ──▶ BodyIngested ──▶ Converting ──▶ Responded
//!     │              │                  │               │
//!     └──────────────┴──────────────────┴───────────────┴──▶ Failed
//! ```
//!
//! Every request gets its own scratch directory. It is a [`TempDir`], so it is
//! removed when [`Gateway::convert`] returns, whichever phase failed. The
//! converted artifact is read back into memory before that happens.

use crate::config::GatewayConfig;
use crate::engine::{select_engine, Engine, RequestedEngine};
use crate::error::GatewayError;
use crate::pipeline::ingest::ingest_body;
use crate::pipeline::local::LocalDriver;
use crate::pipeline::remote::{ExportJob, RemoteDriver, PDF_MEDIA_TYPE};
use crate::transport::{ReqwestTransport, Transport};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use tracing::{debug, field, info, info_span, warn, Instrument};

/// Client-supplied original filename.
pub const FILENAME_HEADER: &str = "x-filename";
/// Overrides the extension inferred from the filename.
pub const FILE_EXT_HEADER: &str = "x-file-ext";
/// Engine preference: `adobe`/`remote`, `libreoffice`/`local`, else auto.
pub const ENGINE_HEADER: &str = "x-conversion-engine";

const DEFAULT_FILENAME: &str = "document";
const FALLBACK_EXTENSION: &str = "bin";

// ── Request model ────────────────────────────────────────────────────────────

/// Everything the gateway needs from a request except its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub source_extension: String,
    pub target_format: String,
    /// Original filename with path separators replaced.
    pub filename: String,
    pub declared_length: u64,
    pub requested_engine: RequestedEngine,
}

impl RequestHead {
    /// Validate the `target` query value and the request headers.
    ///
    /// Checks run in order: target, then `Content-Length`. A missing
    /// `Content-Length` counts as zero.
    pub fn parse(target: Option<&str>, headers: &HeaderMap) -> Result<Self, GatewayError> {
        let target_format = parse_target(target)?;

        let declared_length = match header_str(headers, CONTENT_LENGTH.as_str()) {
            None => 0,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| GatewayError::InvalidContentLength { value: raw.clone() })?,
        };
        if declared_length == 0 {
            return Err(GatewayError::EmptyBody);
        }

        let filename = sanitize_filename(
            header_str(headers, FILENAME_HEADER)
                .as_deref()
                .unwrap_or(DEFAULT_FILENAME),
        );
        let source_extension = header_str(headers, FILE_EXT_HEADER)
            .map(|ext| sanitize_extension(&ext))
            .filter(|ext| !ext.is_empty())
            .or_else(|| {
                Path::new(&filename)
                    .extension()
                    .map(|ext| sanitize_extension(&ext.to_string_lossy()))
                    .filter(|ext| !ext.is_empty())
            })
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
        let requested_engine =
            RequestedEngine::from_header(header_str(headers, ENGINE_HEADER).as_deref());

        Ok(Self {
            source_extension,
            target_format,
            filename,
            declared_length,
            requested_engine,
        })
    }

    /// Name of the converted file: the filename's stem plus the target.
    pub fn output_filename(&self) -> String {
        output_filename(&self.filename, &self.target_format)
    }
}

/// A parsed request head plus its unread body.
#[derive(Debug)]
pub struct ConversionRequest<B> {
    pub head: RequestHead,
    pub body: B,
}

/// The converted document, fully in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    pub bytes: Vec<u8>,
    pub output_filename: String,
    pub engine: Engine,
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    EngineSelected,
    BodyIngested,
    Converting,
    Responded,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestPhase::Received => "received",
            RequestPhase::EngineSelected => "engine_selected",
            RequestPhase::BodyIngested => "body_ingested",
            RequestPhase::Converting => "converting",
            RequestPhase::Responded => "responded",
            RequestPhase::Failed => "failed",
        })
    }
}

/// Backends available to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub local_engine: bool,
    pub remote_engine: bool,
}

// ── Header helpers ───────────────────────────────────────────────────────────

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn parse_target(target: Option<&str>) -> Result<String, GatewayError> {
    let target = target.map(|t| t.trim().to_ascii_lowercase()).unwrap_or_default();
    if target.is_empty() {
        return Err(GatewayError::MissingTarget);
    }
    if target
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(GatewayError::InvalidTarget { target });
    }
    Ok(target)
}

/// Lower-case and keep only ASCII alphanumerics.
pub fn sanitize_extension(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Replace path separators so the name can never address a directory.
pub fn sanitize_filename(raw: &str) -> String {
    raw.replace(['/', '\\'], "_")
}

/// `report.pdf` + `docx` → `report.docx`; no usable stem → `document.docx`.
pub fn output_filename(filename: &str, target: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    format!("{stem}.{target}")
}

// ── Coordinator ──────────────────────────────────────────────────────────────

/// Shared, immutable request coordinator.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    transport: Arc<dyn Transport>,
    next_request_id: AtomicU64,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Gateway talking to the remote API over `reqwest`.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let transport = ReqwestTransport::new()
            .map_err(|e| GatewayError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Gateway using a caller-supplied transport.
    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            local_engine: self.config.office_binary.is_some(),
            remote_engine: self.config.remote.is_some(),
        }
    }

    /// Run one request to completion.
    ///
    /// The body is only read once the engine has been chosen and is known to
    /// be usable.
    pub async fn convert<B>(
        &self,
        request: ConversionRequest<B>,
    ) -> Result<ConvertedArtifact, GatewayError>
    where
        B: AsyncRead + Unpin + Send,
    {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!(
            "request",
            request_id,
            target = %request.head.target_format,
            engine = field::Empty
        );

        async move {
            let start = Instant::now();
            let mut phase = RequestPhase::Received;
            let result = self.run(request, &mut phase).await;
            match &result {
                Ok(artifact) => info!(
                    phase = %RequestPhase::Responded,
                    bytes = artifact.bytes.len(),
                    filename = %artifact.output_filename,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "conversion succeeded"
                ),
                Err(e) => warn!(
                    phase = %RequestPhase::Failed,
                    failed_in = %phase,
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "conversion failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run<B>(
        &self,
        request: ConversionRequest<B>,
        phase: &mut RequestPhase,
    ) -> Result<ConvertedArtifact, GatewayError>
    where
        B: AsyncRead + Unpin + Send,
    {
        let ConversionRequest { head, mut body } = request;
        info!(
            source = %head.source_extension,
            filename = %head.filename,
            declared = head.declared_length,
            requested = ?head.requested_engine,
            "request received"
        );

        // ── Select engine ────────────────────────────────────────────────
        let decision = select_engine(
            &head.source_extension,
            &head.target_format,
            head.requested_engine,
            self.config.remote.as_ref(),
        )?;
        tracing::Span::current().record("engine", field::display(decision.engine));
        info!(engine = %decision.engine, reason = %decision.reason, "engine selected");

        let office_binary = match decision.engine {
            Engine::Local => Some(self.config.office_binary.as_deref().ok_or_else(|| {
                GatewayError::BackendUnavailable {
                    detail: "not found via SOFFICE_PATH, PATH or standard install locations"
                        .to_string(),
                }
            })?),
            Engine::Remote => None,
        };
        *phase = RequestPhase::EngineSelected;

        // ── Ingest body ──────────────────────────────────────────────────
        let scratch = self.scratch_dir()?;
        debug!(dir = %scratch.path().display(), "scratch directory created");
        let input_path = scratch
            .path()
            .join(format!("input.{}", head.source_extension));
        let ingested = ingest_body(
            &mut body,
            head.declared_length,
            &input_path,
            self.config.body_read_timeout,
        )
        .await?;
        *phase = RequestPhase::BodyIngested;
        debug!(bytes = ingested.bytes, "body ingested");

        // ── Convert ──────────────────────────────────────────────────────
        *phase = RequestPhase::Converting;
        let bytes = match office_binary {
            Some(binary) => {
                let produced = LocalDriver::new(binary, self.config.local_timeout)
                    .convert(
                        &ingested.path,
                        &head.source_extension,
                        &head.target_format,
                        scratch.path(),
                    )
                    .await?;
                tokio::fs::read(&produced)
                    .await
                    .map_err(|e| GatewayError::io("reading converted file", e))?
            }
            None => {
                let credentials = self.config.remote.as_ref().ok_or_else(|| {
                    GatewayError::Internal("remote engine chosen without credentials".into())
                })?;
                let input = tokio::fs::read(&ingested.path)
                    .await
                    .map_err(|e| GatewayError::io("reading input file", e))?;
                RemoteDriver::new(
                    self.transport.as_ref(),
                    credentials,
                    self.config.remote_timeouts,
                )
                .convert(ExportJob {
                    input: &input,
                    media_type: PDF_MEDIA_TYPE,
                    target: &head.target_format,
                })
                .await?
            }
        };

        *phase = RequestPhase::Responded;
        Ok(ConvertedArtifact {
            bytes,
            output_filename: head.output_filename(),
            engine: decision.engine,
        })
    }

    fn scratch_dir(&self) -> Result<TempDir, GatewayError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("convert-");
        match self.config.scratch_root {
            Some(ref root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| GatewayError::io("creating scratch directory", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteCredentials;
    use crate::error::{RemoteError, TransportError};
    use crate::transport::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::path::PathBuf;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    /// Refuses every request.
    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Request {
                url: request.url,
                reason: "connection refused".into(),
            })
        }
    }

    fn gateway(config: GatewayConfig) -> Gateway {
        Gateway::with_transport(config, Arc::new(Unreachable))
    }

    fn head(source: &str, target: &str, len: u64) -> RequestHead {
        RequestHead {
            source_extension: source.into(),
            target_format: target.into(),
            filename: format!("report.{source}"),
            declared_length: len,
            requested_engine: RequestedEngine::Auto,
        }
    }

    fn scratch_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root).unwrap().next().is_none()
    }

    #[test]
    fn parse_full_head() {
        let h = RequestHead::parse(
            Some(" DOCX "),
            &headers(&[
                ("content-length", "42"),
                ("x-filename", "dir/Quarterly Report.PDF"),
                ("x-conversion-engine", "adobe"),
            ]),
        )
        .unwrap();
        assert_eq!(h.target_format, "docx");
        assert_eq!(h.declared_length, 42);
        assert_eq!(h.filename, "dir_Quarterly Report.PDF");
        assert_eq!(h.source_extension, "pdf");
        assert_eq!(h.requested_engine, RequestedEngine::Remote);
        assert_eq!(h.output_filename(), "dir_Quarterly Report.docx");
    }

    #[test]
    fn extension_header_wins_and_is_sanitized() {
        let h = RequestHead::parse(
            Some("pdf"),
            &headers(&[
                ("content-length", "1"),
                ("x-filename", "notes.txt"),
                ("x-file-ext", "../D.O.C.X"),
            ]),
        )
        .unwrap();
        assert_eq!(h.source_extension, "docx");
    }

    #[test]
    fn extension_defaults() {
        let h = RequestHead::parse(Some("pdf"), &headers(&[("content-length", "1")])).unwrap();
        assert_eq!(h.filename, "document");
        assert_eq!(h.source_extension, "bin");
        assert_eq!(h.output_filename(), "document.pdf");

        let h = RequestHead::parse(
            Some("pdf"),
            &headers(&[("content-length", "1"), ("x-file-ext", "  ")]),
        )
        .unwrap();
        assert_eq!(h.source_extension, "bin");
    }

    #[test]
    fn target_is_checked_first() {
        let err = RequestHead::parse(None, &headers(&[("content-length", "0")])).unwrap_err();
        assert!(matches!(err, GatewayError::MissingTarget));
        let err = RequestHead::parse(Some("  "), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::MissingTarget));
    }

    #[test]
    fn unsafe_targets_are_rejected() {
        for bad in ["../docx", "a\\b", "do\ncx"] {
            let err = RequestHead::parse(Some(bad), &headers(&[("content-length", "1")]))
                .unwrap_err();
            assert!(matches!(err, GatewayError::InvalidTarget { .. }), "{bad:?}");
        }
    }

    #[test]
    fn content_length_rules() {
        let err = RequestHead::parse(Some("pdf"), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::EmptyBody));

        let err =
            RequestHead::parse(Some("pdf"), &headers(&[("content-length", "0")])).unwrap_err();
        assert!(matches!(err, GatewayError::EmptyBody));

        let err = RequestHead::parse(Some("pdf"), &headers(&[("content-length", "ten")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidContentLength { .. }));
    }

    #[test]
    fn output_filename_cases() {
        assert_eq!(output_filename("report.pdf", "docx"), "report.docx");
        assert_eq!(output_filename("archive.tar.gz", "zip"), "archive.tar.zip");
        assert_eq!(output_filename("noext", "pdf"), "noext.pdf");
        assert_eq!(output_filename("", "pdf"), "document.pdf");
        assert_eq!(output_filename("..", "pdf"), "document.pdf");
    }

    #[test]
    fn health_reflects_configuration() {
        let g = gateway(GatewayConfig::default());
        let report = g.health();
        assert!(!report.local_engine);
        assert!(!report.remote_engine);

        let g = gateway(
            GatewayConfig::builder()
                .office_binary(Some(PathBuf::from("/usr/bin/soffice")))
                .remote(Some(RemoteCredentials::new("id", "secret")))
                .build()
                .unwrap(),
        );
        let report = g.health();
        assert!(report.local_engine && report.remote_engine);
    }

    #[tokio::test]
    async fn missing_binary_fails_before_reading_body() {
        let scratch = TempDir::new().unwrap();
        let g = gateway(GatewayConfig::builder().scratch_root(scratch.path()).build().unwrap());
        let body: &[u8] = b"%PDF";

        let err = g
            .convert(ConversionRequest {
                head: head("pdf", "docx", 4),
                body,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable { .. }));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn truncated_body_leaves_no_scratch_files() {
        let scratch = TempDir::new().unwrap();
        let g = gateway(
            GatewayConfig::builder()
                .scratch_root(scratch.path())
                .office_binary(Some(PathBuf::from("/nonexistent/soffice")))
                .build()
                .unwrap(),
        );
        let body: &[u8] = b"abc";

        let err = g
            .convert(ConversionRequest {
                head: head("docx", "pdf", 10),
                body,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::IncompleteBody {
                read: 3,
                declared: 10
            }
        ));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn remote_failure_is_reported_and_cleaned_up() {
        let scratch = TempDir::new().unwrap();
        let g = gateway(
            GatewayConfig::builder()
                .scratch_root(scratch.path())
                .remote(Some(RemoteCredentials::new("id", "secret")))
                .build()
                .unwrap(),
        );
        let body: &[u8] = b"%PDF-1.7";

        let err = g
            .convert(ConversionRequest {
                head: head("pdf", "xlsx", 8),
                body,
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::Remote(RemoteError::AuthenticationFailed { .. })),
            "got: {err}"
        );
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn forced_remote_without_credentials_is_rejected() {
        let g = gateway(GatewayConfig::default());
        let mut h = head("pdf", "docx", 4);
        h.requested_engine = RequestedEngine::Remote;
        let body: &[u8] = b"%PDF";

        let err = g
            .convert(ConversionRequest { head: h, body })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedEngineRequest { .. }));
    }
}
