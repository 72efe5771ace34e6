//! Remote engine: drive the PDF Services export workflow to completion.
//!
//! ## Steps
//!
//! ```text
//! Authenticate ─► CreateAsset ─► Upload ─► Submit ─► Poll ─► Download ─► Done
//! ```
//!
//! Each step is one [`RemoteStep`] variant and one transition in
//! [`RemoteDriver::advance`]. A failing step ends the workflow with the
//! [`RemoteError`] variant for that step; nothing is rolled back and an
//! abandoned remote job is left to the service's own cleanup.
//!
//! Only status polling retries: non-success polls and transport errors are
//! swallowed until the polling deadline, after which the last poll's error
//! (if it had one) is reported instead of a plain timeout.

use crate::config::{RemoteCredentials, RemoteTimeouts};
use crate::error::{RemoteError, TransportError};
use crate::transport::{HttpRequest, Method, Transport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Media type declared for every uploaded source document.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Operation path segment used for export jobs.
const EXPORT_OPERATION: &str = "exportpdf";

// ── Job state ────────────────────────────────────────────────────────────────

/// Lifecycle of the remote job as last reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Everything learned about one remote job. Filled in strictly in step order
/// and dropped when the request completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteJobState {
    pub asset_id: Option<String>,
    pub upload_uri: Option<String>,
    pub status_url: Option<String>,
    pub download_uri: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
}

/// The next thing the workflow has to do.
#[derive(Clone, PartialEq, Eq)]
pub enum RemoteStep {
    Authenticate,
    CreateAsset { token: String },
    Upload { token: String },
    Submit { token: String },
    Poll { token: String },
    Download,
    Done(Vec<u8>),
}

impl RemoteStep {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteStep::Authenticate => "authenticate",
            RemoteStep::CreateAsset { .. } => "create_asset",
            RemoteStep::Upload { .. } => "upload",
            RemoteStep::Submit { .. } => "submit",
            RemoteStep::Poll { .. } => "poll",
            RemoteStep::Download => "download",
            RemoteStep::Done(_) => "done",
        }
    }
}

// Tokens and document bytes stay out of logs.
impl fmt::Debug for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStep::Done(bytes) => write!(f, "Done({} bytes)", bytes.len()),
            other => f.write_str(other.name()),
        }
    }
}

/// The document being exported.
#[derive(Debug, Clone, Copy)]
pub struct ExportJob<'a> {
    pub input: &'a [u8],
    pub media_type: &'a str,
    pub target: &'a str,
}

// ── Wire documents ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssetRequest<'a> {
    #[serde(rename = "mediaType")]
    media_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AssetResponse {
    #[serde(default, rename = "uploadUri", alias = "upload_uri")]
    upload_uri: Option<String>,
    #[serde(default, rename = "assetID", alias = "asset_id")]
    asset_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    #[serde(rename = "assetID")]
    asset_id: &'a str,
    #[serde(rename = "targetFormat")]
    target_format: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ExportResponse {
    #[serde(default, rename = "statusUrl")]
    status_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    asset: Option<AssetRef>,
    #[serde(default, rename = "assetList")]
    asset_list: Vec<AssetRef>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetRef {
    #[serde(default, rename = "downloadUri", alias = "download_uri")]
    download_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// An empty body parses as the default document.
fn parse_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Status handling ──────────────────────────────────────────────────────────

/// What one status document says about the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling. Carries the raw status when one was present.
    Pending(Option<String>),
    /// Terminal success, with the download URI when the document named one.
    Succeeded(Option<String>),
    /// Terminal failure with the service's message.
    Failed(String),
}

/// Classify a status document. Unreadable documents count as pending.
pub fn classify_status(body: &[u8]) -> PollOutcome {
    let doc: StatusDocument = match parse_json(body) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "unreadable status document");
            return PollOutcome::Pending(None);
        }
    };
    let status = doc.status.map(|s| s.trim().to_ascii_lowercase());
    match status.as_deref() {
        Some("done" | "succeeded" | "success") => {
            let direct = doc.asset.and_then(|a| non_empty(a.download_uri));
            let listed = || {
                doc.asset_list
                    .into_iter()
                    .next()
                    .and_then(|a| non_empty(a.download_uri))
            };
            PollOutcome::Succeeded(direct.or_else(listed))
        }
        Some("failed" | "error") => {
            let message = doc
                .error
                .and_then(|e| non_empty(e.message))
                .unwrap_or_else(|| "Adobe export job failed.".to_string());
            PollOutcome::Failed(message)
        }
        other => PollOutcome::Pending(other.map(str::to_string)),
    }
}

/// Build the polling URL from an export response.
///
/// A location wins over a request id. Absolute locations are used as-is;
/// relative ones are appended to `base`.
pub fn resolve_status_url(
    base: &str,
    location: Option<&str>,
    request_id: Option<&str>,
) -> Option<String> {
    let base = base.trim_end_matches('/');
    if let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Some(location.to_string());
        }
        if location.starts_with('/') {
            return Some(format!("{base}{location}"));
        }
        return Some(format!("{base}/{location}"));
    }
    request_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| format!("{base}/operation/{EXPORT_OPERATION}/{id}/status"))
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Runs the export workflow over a [`Transport`].
pub struct RemoteDriver<'a> {
    transport: &'a dyn Transport,
    credentials: &'a RemoteCredentials,
    timeouts: RemoteTimeouts,
}

impl<'a> RemoteDriver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        credentials: &'a RemoteCredentials,
        timeouts: RemoteTimeouts,
    ) -> Self {
        Self {
            transport,
            credentials,
            timeouts,
        }
    }

    /// Export `job` and return the converted document's bytes.
    pub async fn convert(&self, job: ExportJob<'_>) -> Result<Vec<u8>, RemoteError> {
        let mut state = RemoteJobState::default();
        let mut step = RemoteStep::Authenticate;
        loop {
            step = match step {
                RemoteStep::Done(bytes) => {
                    info!(bytes = bytes.len(), "remote export complete");
                    return Ok(bytes);
                }
                current => {
                    let name = current.name();
                    debug!(step = name, "remote step");
                    self.advance(current, &job, &mut state).await.map_err(|e| {
                        warn!(step = name, error = %e, "remote step failed");
                        e
                    })?
                }
            };
        }
    }

    /// Perform one step and return the next.
    /// Run one step and return the next.
    ///
    /// A step whose inputs an earlier step should have recorded in `state`
    /// fails with that earlier step's error without sending anything.
    pub async fn advance(
        &self,
        step: RemoteStep,
        job: &ExportJob<'_>,
        state: &mut RemoteJobState,
    ) -> Result<RemoteStep, RemoteError> {
        match step {
            RemoteStep::Authenticate => {
                let token = self.authenticate().await?;
                Ok(RemoteStep::CreateAsset { token })
            }
            RemoteStep::CreateAsset { token } => {
                self.create_asset(&token, job, state).await?;
                Ok(RemoteStep::Upload { token })
            }
            RemoteStep::Upload { token } => {
                self.upload(job, state).await?;
                Ok(RemoteStep::Submit { token })
            }
            RemoteStep::Submit { token } => {
                self.submit(&token, job, state).await?;
                Ok(RemoteStep::Poll { token })
            }
            RemoteStep::Poll { token } => {
                self.poll(&token, state).await?;
                Ok(RemoteStep::Download)
            }
            RemoteStep::Download => Ok(RemoteStep::Done(self.download(state).await?)),
            done @ RemoteStep::Done(_) => Ok(done),
        }
    }

    fn authorized(&self, request: HttpRequest, token: &str) -> HttpRequest {
        request
            .header("X-API-Key", self.credentials.client_id.as_str())
            .header("Authorization", format!("Bearer {token}"))
    }

    async fn authenticate(&self) -> Result<String, RemoteError> {
        let url = self.credentials.token_url.as_str();
        info!(%url, "requesting access token");
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("client_secret", &self.credentials.client_secret)
            .finish();
        let request = HttpRequest::new(Method::Post, url, self.timeouts.request)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form);

        let fail = |detail: String| RemoteError::AuthenticationFailed { detail };
        let response = self
            .transport
            .send(request)
            .await
            .and_then(|r| r.error_for_status(url))
            .map_err(|e| fail(e.to_string()))?;
        let doc: TokenResponse = parse_json(&response.body)
            .map_err(|e| fail(format!("unreadable token response: {e}")))?;
        non_empty(doc.access_token).ok_or_else(|| fail("token response missing access_token".into()))
    }

    async fn create_asset(
        &self,
        token: &str,
        job: &ExportJob<'_>,
        state: &mut RemoteJobState,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/assets", self.credentials.base());
        info!(%url, media_type = job.media_type, "creating asset");
        let fail = |detail: String| RemoteError::AssetCreationFailed { detail };
        let payload = serde_json::to_vec(&AssetRequest {
            media_type: job.media_type,
        })
        .map_err(|e| fail(e.to_string()))?;
        let request = self
            .authorized(HttpRequest::new(Method::Post, &url, self.timeouts.request), token)
            .header("Content-Type", "application/json")
            .body(payload);

        let response = self
            .transport
            .send(request)
            .await
            .and_then(|r| r.error_for_status(&url))
            .map_err(|e| fail(e.to_string()))?;
        let doc: AssetResponse = parse_json(&response.body)
            .map_err(|e| fail(format!("unreadable assets response: {e}")))?;
        match (non_empty(doc.upload_uri), non_empty(doc.asset_id)) {
            (Some(upload_uri), Some(asset_id)) => {
                debug!(%asset_id, "asset created");
                state.upload_uri = Some(upload_uri);
                state.asset_id = Some(asset_id);
                Ok(())
            }
            _ => Err(fail("assets response missing uploadUri/assetID".into())),
        }
    }

    async fn upload(&self, job: &ExportJob<'_>, state: &RemoteJobState) -> Result<(), RemoteError> {
        let url = state
            .upload_uri
            .as_deref()
            .ok_or_else(|| asset_not_created("upload URI"))?;
        info!(bytes = job.input.len(), "uploading asset");
        let request = HttpRequest::new(Method::Put, url, self.timeouts.transfer)
            .header("Content-Type", job.media_type)
            .body(job.input.to_vec());
        self.transport
            .send(request)
            .await
            .and_then(|r| r.error_for_status(url))
            .map_err(RemoteError::UploadFailed)?;
        Ok(())
    }

    async fn submit(
        &self,
        token: &str,
        job: &ExportJob<'_>,
        state: &mut RemoteJobState,
    ) -> Result<(), RemoteError> {
        let base = self.credentials.base();
        let url = format!("{base}/operation/{EXPORT_OPERATION}");
        info!(%url, target = job.target, "submitting export job");
        let asset_id = state
            .asset_id
            .as_deref()
            .ok_or_else(|| asset_not_created("asset id"))?;
        let fail = |detail: String| RemoteError::ExportSubmissionFailed { detail };
        let payload = serde_json::to_vec(&ExportRequest {
            asset_id,
            target_format: job.target,
        })
        .map_err(|e| fail(e.to_string()))?;
        let request = self
            .authorized(HttpRequest::new(Method::Post, &url, self.timeouts.request), token)
            .header("Content-Type", "application/json")
            .body(payload);

        let response = self
            .transport
            .send(request)
            .await
            .and_then(|r| r.error_for_status(&url))
            .map_err(|e| fail(e.to_string()))?;
        let body: ExportResponse = parse_json(&response.body).unwrap_or_default();
        let location = response
            .header("location")
            .map(str::to_string)
            .or(body.status_url);
        let status_url = resolve_status_url(
            base,
            location.as_deref(),
            response.header("x-request-id"),
        )
        .ok_or(RemoteError::StatusUrlMissing)?;
        info!(%status_url, "export job accepted");
        state.status_url = Some(status_url);
        Ok(())
    }

    async fn poll(&self, token: &str, state: &mut RemoteJobState) -> Result<(), RemoteError> {
        let url = state.status_url.clone().ok_or(RemoteError::StatusUrlMissing)?;
        let deadline = Instant::now() + self.timeouts.poll_deadline;
        let mut last_error: Option<TransportError> = None;
        let mut attempt: u32 = 0;
        info!(%url, "polling export status");

        while Instant::now() < deadline {
            attempt += 1;
            let request = self
                .authorized(HttpRequest::new(Method::Get, &url, self.timeouts.request), token)
                .header("Content-Type", "application/json");
            match self
                .transport
                .send(request)
                .await
                .and_then(|r| r.error_for_status(&url))
            {
                Ok(response) => {
                    last_error = None;
                    match classify_status(&response.body) {
                        PollOutcome::Succeeded(uri) => {
                            info!(attempt, "export job succeeded");
                            state.status = JobStatus::Succeeded;
                            let uri = uri.ok_or(RemoteError::DownloadUriMissing)?;
                            state.download_uri = Some(uri);
                            return Ok(());
                        }
                        PollOutcome::Failed(message) => {
                            warn!(attempt, %message, "export job failed");
                            state.status = JobStatus::Failed;
                            state.error_message = Some(message.clone());
                            return Err(RemoteError::RemoteJobFailed { message });
                        }
                        PollOutcome::Pending(status) => {
                            debug!(attempt, status = ?status, "export job pending");
                        }
                    }
                }
                Err(e) => {
                    debug!(attempt, error = %e, "status poll failed, retrying");
                    last_error = Some(e);
                }
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }

        warn!(attempts = attempt, "status polling deadline reached");
        Err(match last_error {
            Some(e) => RemoteError::PollingTransportError(e),
            None => RemoteError::PollingTimeout {
                deadline: self.timeouts.poll_deadline,
            },
        })
    }

    async fn download(&self, state: &RemoteJobState) -> Result<Vec<u8>, RemoteError> {
        let url = state
            .download_uri
            .as_deref()
            .ok_or(RemoteError::DownloadUriMissing)?;
        info!("downloading converted document");
        let request = HttpRequest::new(Method::Get, url, self.timeouts.transfer);
        let response = self
            .transport
            .send(request)
            .await
            .and_then(|r| r.error_for_status(url))
            .map_err(|e| RemoteError::DownloadFailed {
                detail: e.to_string(),
            })?;
        Ok(response.body)
    }
}

fn asset_not_created(missing: &str) -> RemoteError {
    RemoteError::AssetCreationFailed {
        detail: format!("no {missing} recorded for this job"),
    }
}
