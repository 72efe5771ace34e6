//! HTTP surface: routing, body adaptation and response emission.
//!
//! - `POST /convert?target=<format>`: convert the request body
//! - `GET /health`: which engines this process can use
//!
//! Everything else is a 404. Failures are written as a plain-text message with
//! the status from [`GatewayError::status_code`]; nothing is streamed before
//! the conversion has fully succeeded.

use crate::error::GatewayError;
use crate::gateway::{ConversionRequest, ConvertedArtifact, Gateway, RequestHead, RequestPhase};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::TryStreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ConvertParams {
    target: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Build the router. Every route shares one [`Gateway`].
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/convert", post(convert_handler))
        .route("/health", get(health_handler))
        .fallback(not_found)
        .with_state(gateway)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
}

/// Bind to the configured address and serve until Ctrl-C or SIGTERM.
pub async fn serve(gateway: Arc<Gateway>) -> Result<(), GatewayError> {
    let addr = gateway.config().bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::io("binding listener", e))?;

    let health = gateway.health();
    info!(
        %addr,
        local_engine = health.local_engine,
        remote_engine = health.remote_engine,
        "conversion gateway listening"
    );

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::io("serving connections", e))?;

    info!("conversion gateway stopped");
    Ok(())
}

async fn convert_handler(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<ConvertParams>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let head = match RequestHead::parse(params.target.as_deref(), &headers) {
        Ok(head) => head,
        Err(e) => {
            warn!(
                phase = %RequestPhase::Failed,
                failed_in = %RequestPhase::Received,
                kind = e.kind(),
                error = %e,
                "request rejected"
            );
            return e.into_response();
        }
    };

    let body = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    match gateway.convert(ConversionRequest { head, body }).await {
        Ok(artifact) => artifact_response(artifact),
        Err(e) => e.into_response(),
    }
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.health())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// RFC 5987 `attr-char`: everything else is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `attachment; filename="<name>"`. Names that are not plain printable ASCII
/// get an ASCII stand-in plus the exact name as `filename*=UTF-8''...`.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let mut value = format!("attachment; filename=\"{fallback}\"");
    if filename.chars().any(|c| !c.is_ascii() || c.is_ascii_control()) {
        let encoded = utf8_percent_encode(filename, ATTR_CHAR);
        value.push_str(&format!("; filename*=UTF-8''{encoded}"));
    }
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn artifact_response(artifact: ConvertedArtifact) -> Response {
    let length = artifact.bytes.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(
            CONTENT_DISPOSITION,
            attachment_disposition(&artifact.output_filename),
        )
        .header(CONTENT_LENGTH, length)
        .body(Body::from(artifact.bytes))
        .unwrap_or_else(|e| GatewayError::Internal(e.to_string()).into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
    info!("shutting down, finishing in-flight requests");
}
