//! Error types for the conversion gateway.
//!
//! Three layers, innermost first:
//!
//! * [`TransportError`]: a single HTTP exchange with the remote API failed
//!   (non-success status, timeout, connection error).
//! * [`RemoteError`]: one step of the remote export workflow failed. Each
//!   step has its own variant so "could not reach the service" is never
//!   conflated with "the service rejected the job".
//! * [`GatewayError`]: the request as a whole failed. Every variant maps to
//!   exactly one HTTP status through [`GatewayError::status_code`], which is
//!   the only place the HTTP surface learns how to report a failure.

use axum::http::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal per-request failures. Returned by the coordinator and turned into a
/// plain-text error response by the server.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Routing errors ────────────────────────────────────────────────────
    /// The `target` query parameter is absent or blank.
    #[error("Missing target")]
    MissingTarget,

    /// The target format cannot safely name an output file.
    #[error("Invalid target format '{target}'")]
    InvalidTarget { target: String },

    // ── Ingestion errors ──────────────────────────────────────────────────
    /// `Content-Length` is not a non-negative integer.
    #[error("Invalid Content-Length: '{value}'")]
    InvalidContentLength { value: String },

    /// `Content-Length` is missing or zero.
    #[error("Empty body")]
    EmptyBody,

    /// The client sent fewer bytes than it declared before EOF or timeout.
    #[error("Incomplete request body: {read}/{declared} bytes")]
    IncompleteBody { read: u64, declared: u64 },

    // ── Engine selection errors ───────────────────────────────────────────
    /// The caller forced the remote engine but it cannot handle this request.
    #[error("Adobe conversion is not available for this file or credentials: {reason}")]
    UnsupportedEngineRequest { reason: String },

    // ── Local engine errors ───────────────────────────────────────────────
    /// The LibreOffice binary could not be resolved.
    #[error("LibreOffice soffice not found: {detail}")]
    BackendUnavailable { detail: String },

    /// soffice exited non-zero, could not be started, or timed out.
    #[error("LibreOffice conversion failed: {detail}")]
    LocalConversionFailed { detail: String },

    /// soffice exited cleanly but the expected output file is absent.
    #[error("Converted file not found: '{}'", .path.display())]
    OutputArtifactMissing { path: PathBuf },

    // ── Remote engine errors ──────────────────────────────────────────────
    /// A step of the remote export workflow failed.
    #[error("Adobe PDF Services conversion failed: {0}")]
    Remote(#[from] RemoteError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing the request's scratch directory failed.
    #[error("Scratch I/O failed while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status reported to the caller for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingTarget
            | GatewayError::InvalidTarget { .. }
            | GatewayError::InvalidContentLength { .. }
            | GatewayError::EmptyBody
            | GatewayError::IncompleteBody { .. }
            | GatewayError::UnsupportedEngineRequest { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Coarse failure class, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingTarget | GatewayError::InvalidTarget { .. } => "RoutingError",
            GatewayError::InvalidContentLength { .. }
            | GatewayError::EmptyBody
            | GatewayError::IncompleteBody { .. } => "IngestionError",
            GatewayError::UnsupportedEngineRequest { .. } => "EngineSelectionError",
            GatewayError::BackendUnavailable { .. } => "BackendUnavailable",
            GatewayError::LocalConversionFailed { .. } => "LocalConversionFailed",
            GatewayError::OutputArtifactMissing { .. } => "OutputArtifactMissing",
            GatewayError::Remote(e) => e.kind(),
            GatewayError::Io { .. } => "IoError",
            GatewayError::InvalidConfig(_) => "InvalidConfig",
            GatewayError::Internal(_) => "Internal",
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        GatewayError::Io { context, source }
    }
}

/// Failures of the remote export workflow, one variant per step.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Token exchange failed or returned no `access_token`.
    #[error("authentication failed: {detail}")]
    AuthenticationFailed { detail: String },

    /// Asset creation failed or returned no upload URI / asset id.
    #[error("asset creation failed: {detail}")]
    AssetCreationFailed { detail: String },

    /// The PUT of the input bytes to the upload URI failed.
    #[error("upload failed: {0}")]
    UploadFailed(#[source] TransportError),

    /// The export job submission was rejected or unreachable.
    #[error("export submission failed: {detail}")]
    ExportSubmissionFailed { detail: String },

    /// The export response carried neither a location nor a request id.
    #[error("export response missing status URL")]
    StatusUrlMissing,

    /// The job succeeded but the status document names no download URI.
    #[error("status response missing downloadUri")]
    DownloadUriMissing,

    /// The remote service reported the job as failed.
    #[error("{message}")]
    RemoteJobFailed { message: String },

    /// No terminal status before the polling deadline.
    #[error("status polling timed out after {deadline:?}")]
    PollingTimeout { deadline: Duration },

    /// The deadline passed and the last poll attempt itself failed.
    #[error("status polling failed: {0}")]
    PollingTransportError(#[source] TransportError),

    /// Fetching the converted document failed.
    #[error("download failed: {detail}")]
    DownloadFailed { detail: String },
}

impl RemoteError {
    /// Variant name, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::AuthenticationFailed { .. } => "AuthenticationFailed",
            RemoteError::AssetCreationFailed { .. } => "AssetCreationFailed",
            RemoteError::UploadFailed(_) => "UploadFailed",
            RemoteError::ExportSubmissionFailed { .. } => "ExportSubmissionFailed",
            RemoteError::StatusUrlMissing => "StatusUrlMissing",
            RemoteError::DownloadUriMissing => "DownloadUriMissing",
            RemoteError::RemoteJobFailed { .. } => "RemoteJobFailed",
            RemoteError::PollingTimeout { .. } => "PollingTimeout",
            RemoteError::PollingTransportError(_) => "PollingTransportError",
            RemoteError::DownloadFailed { .. } => "DownloadFailed",
        }
    }
}

/// A single HTTP exchange failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// No response within the per-call timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Connection, TLS, or protocol failure.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_body_display() {
        let e = GatewayError::IncompleteBody {
            read: 4,
            declared: 10,
        };
        assert_eq!(e.to_string(), "Incomplete request body: 4/10 bytes");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.kind(), "IngestionError");
    }

    #[test]
    fn engine_selection_is_client_error() {
        let e = GatewayError::UnsupportedEngineRequest {
            reason: "no credentials".into(),
        };
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.kind(), "EngineSelectionError");
    }

    #[test]
    fn backend_failures_are_server_errors() {
        let unavailable = GatewayError::BackendUnavailable {
            detail: "not on PATH".into(),
        };
        assert_eq!(unavailable.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = GatewayError::OutputArtifactMissing {
            path: PathBuf::from("/tmp/x/input.docx"),
        };
        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(missing.to_string().contains("input.docx"));
    }

    #[test]
    fn remote_job_failure_carries_remote_message() {
        let e: GatewayError = RemoteError::RemoteJobFailed {
            message: "Unsupported PDF version".into(),
        }
        .into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.kind(), "RemoteJobFailed");
        assert!(e.to_string().ends_with("Unsupported PDF version"));
    }

    #[test]
    fn upload_failure_wraps_transport_status() {
        let e = RemoteError::UploadFailed(TransportError::Status {
            url: "https://upload.example/abc".into(),
            status: 403,
            body: "expired".into(),
        });
        let msg = e.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("expired"), "got: {msg}");
    }
}
