//! # convert-gateway
//!
//! HTTP gateway that converts documents with one of two interchangeable
//! engines: LibreOffice running headless as a local subprocess, or the Adobe
//! PDF Services export API.
//!
//! ## Why two engines?
//!
//! LibreOffice converts almost anything into almost anything, but its PDF
//! import is a layout reconstruction and Office documents produced from PDFs
//! come out rough. The remote export API produces far better Word, Excel and
//! PowerPoint files from PDFs, at the cost of credentials and a slow
//! multi-step job. The gateway sends exactly those PDF → Office requests to
//! the remote engine when credentials are configured, and everything else to
//! LibreOffice.
//!
//! ## Request Lifecycle
//!
//! ```text
//! POST /convert?target=docx
//!  │
//!  ├─ 1. Parse    target, Content-Length, X-Filename, X-File-Ext, X-Conversion-Engine
//!  ├─ 2. Select   local or remote engine (pure policy, see `engine`)
//!  ├─ 3. Ingest   stream the body to a per-request scratch dir under a deadline
//!  ├─ 4. Convert  soffice subprocess | token → asset → upload → export → poll → download
//!  └─ 5. Respond  one framed octet-stream attachment; scratch dir already gone
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convert_gateway::{serve, Gateway, GatewayConfig, RemoteCredentials};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::builder()
//!         .port(8787)
//!         .office_binary(soffice_locate::locate_soffice().ok())
//!         .remote(RemoteCredentials::from_parts(
//!             std::env::var("PDF_SERVICES_CLIENT_ID").ok(),
//!             std::env::var("PDF_SERVICES_CLIENT_SECRET").ok(),
//!         ))
//!         .build()?;
//!     serve(Arc::new(Gateway::new(config)?)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `convert-gateway` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! convert-gateway = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod server;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, GatewayConfigBuilder, RemoteCredentials, RemoteTimeouts};
pub use engine::{select_engine, Engine, EngineDecision, RequestedEngine};
pub use error::{GatewayError, RemoteError, TransportError};
pub use gateway::{ConversionRequest, ConvertedArtifact, Gateway, HealthReport, RequestHead};
pub use server::{router, serve};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
