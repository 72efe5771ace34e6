//! CLI binary for convert-gateway.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `GatewayConfig`, resolves the LibreOffice binary once, and
//! serves until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use convert_gateway::config::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URL};
use convert_gateway::{serve, Gateway, GatewayConfig, RemoteCredentials, RemoteTimeouts};
use std::io;
use soffice_locate::LocateError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default 0.0.0.0:8787, LibreOffice only
  convert-gateway

  # Enable the remote engine for PDF -> docx/pptx/xlsx
  PDF_SERVICES_CLIENT_ID=... PDF_SERVICES_CLIENT_SECRET=... convert-gateway

  # Convert a document
  curl -X POST 'http://localhost:8787/convert?target=docx' \
       -H 'X-Filename: report.pdf' --data-binary @report.pdf -o report.docx

  # Force an engine for one request
  curl ... -H 'X-Conversion-Engine: libreoffice'

REQUEST HEADERS:
  Content-Length          Required, > 0
  X-Filename              Original filename (default "document")
  X-File-Ext              Source extension, overrides the filename's
  X-Conversion-Engine     adobe | libreoffice (absent = auto)

ENVIRONMENT VARIABLES:
  CONVERT_HOST                 Bind host
  CONVERT_PORT                 Bind port
  PDF_SERVICES_CLIENT_ID       Remote API client id
  PDF_SERVICES_CLIENT_SECRET   Remote API client secret
  PDF_SERVICES_BASE_URL        Remote API base URL
  PDF_SERVICES_TOKEN_URL       Remote API token endpoint
  SOFFICE_PATH                 Explicit LibreOffice soffice binary
  RUST_LOG                     Log filter, overrides --verbose/--quiet
"#;

/// Convert documents over HTTP with LibreOffice or Adobe PDF Services.
#[derive(Parser, Debug)]
#[command(
    name = "convert-gateway",
    version,
    about = "Convert documents over HTTP with LibreOffice or Adobe PDF Services",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "CONVERT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "CONVERT_PORT", default_value_t = 8787)]
    port: u16,

    /// Remote API client id. Both id and secret enable the remote engine.
    #[arg(long, env = "PDF_SERVICES_CLIENT_ID")]
    client_id: Option<String>,

    /// Remote API client secret.
    #[arg(long, env = "PDF_SERVICES_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Remote API base URL.
    #[arg(long, env = "PDF_SERVICES_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Remote API token endpoint.
    #[arg(long, env = "PDF_SERVICES_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    token_url: String,

    /// LibreOffice soffice binary. Searched on PATH and in standard install
    /// locations when not set.
    #[arg(long, env = "SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Seconds allowed for reading a request body.
    #[arg(long, env = "CONVERT_BODY_TIMEOUT", default_value_t = 30)]
    body_timeout: u64,

    /// Seconds a LibreOffice run may take before it is killed.
    #[arg(long, env = "CONVERT_LOCAL_TIMEOUT", default_value_t = 300)]
    local_timeout: u64,

    /// Seconds to wait for the remote export job to finish.
    #[arg(long, env = "CONVERT_POLL_DEADLINE", default_value_t = 180)]
    poll_deadline: u64,

    /// Milliseconds between remote status polls.
    #[arg(long, env = "CONVERT_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Parent directory for per-request scratch directories.
    #[arg(long, env = "CONVERT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CONVERT_LOG_JSON")]
    log_json: bool,

    /// Debug-level logging.
    #[arg(short, long, env = "CONVERT_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "CONVERT_QUIET")]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Explicit `--soffice` wins; otherwise search once at startup.
///
/// A bad explicit path is fatal. Finding nothing only disables the local
/// engine.
fn resolve_office_binary(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let resolved = match explicit {
        Some(path) => soffice_locate::resolve_from(Some(path.as_os_str()), None, &[]),
        None => soffice_locate::locate_soffice(),
    };
    match resolved {
        Ok(path) => Ok(Some(path)),
        Err(e @ LocateError::OverrideMissing { .. }) => {
            Err(e).context("Invalid LibreOffice binary override")
        }
        Err(e @ LocateError::NotFound { .. }) => {
            warn!(error = %e, "LibreOffice unavailable; local conversions will fail");
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let remote = RemoteCredentials::from_parts(cli.client_id.clone(), cli.client_secret.clone())
        .map(|c| {
            c.with_base_url(cli.base_url.as_str())
                .with_token_url(cli.token_url.as_str())
        });
    if remote.is_none() {
        info!("remote credentials not configured; all conversions use LibreOffice");
    }

    let office_binary = resolve_office_binary(cli.soffice.as_deref())?;
    if let Some(ref path) = office_binary {
        info!(path = %path.display(), "using LibreOffice");
    }

    let mut builder = GatewayConfig::builder()
        .host(cli.host.as_str())
        .port(cli.port)
        .remote(remote)
        .office_binary(office_binary)
        .body_read_timeout(Duration::from_secs(cli.body_timeout))
        .local_timeout(Duration::from_secs(cli.local_timeout))
        .remote_timeouts(RemoteTimeouts {
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            poll_deadline: Duration::from_secs(cli.poll_deadline),
            ..RemoteTimeouts::default()
        });
    if let Some(dir) = cli.scratch_dir.as_ref() {
        builder = builder.scratch_root(dir);
    }
    let config = builder.build().context("Invalid configuration")?;

    let gateway = Gateway::new(config).context("Failed to initialise gateway")?;
    serve(Arc::new(gateway)).await.context("Server failed")?;
    Ok(())
}
