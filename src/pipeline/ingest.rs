//! Request ingestion: copy a declared-length body into the request's scratch
//! directory.
//!
//! The body is never buffered whole in memory. It is read in chunks of at
//! most [`CHUNK_SIZE`] bytes and written straight to disk, under a single
//! deadline covering the entire read. A client that disconnects or stalls
//! ends up here as [`GatewayError::IncompleteBody`], with the partial file
//! removed.

use crate::error::GatewayError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Upper bound for a single read from the connection.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A body that was read completely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBody {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Read exactly `declared` bytes from `reader` into a new file at `dest`.
///
/// Extra bytes beyond `declared` are left unread.
pub async fn ingest_body<R>(
    reader: &mut R,
    declared: u64,
    dest: &Path,
    read_timeout: Duration,
) -> Result<IngestedBody, GatewayError>
where
    R: AsyncRead + Unpin,
{
    if declared == 0 {
        return Err(GatewayError::EmptyBody);
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| GatewayError::io("creating input file", e))?;

    let deadline = Instant::now() + read_timeout;
    let buf_len = usize::try_from(declared).map_or(CHUNK_SIZE, |d| d.min(CHUNK_SIZE));
    let mut buf = vec![0u8; buf_len];
    let mut total: u64 = 0;

    debug!(declared, "reading request body");
    while total < declared {
        let want = usize::try_from(declared - total).map_or(buf_len, |r| r.min(buf_len));
        let n = match timeout_at(deadline, reader.read(&mut buf[..want])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, read = total, declared, "body read failed");
                break;
            }
            Err(_) => {
                warn!(
                    read = total,
                    declared,
                    timeout = ?read_timeout,
                    "body read timed out"
                );
                break;
            }
        };
        file.write_all(&buf[..n])
            .await
            .map_err(|e| GatewayError::io("writing input file", e))?;
        total += n as u64;
    }

    info!(read = total, declared, "body read bytes");
    if total < declared {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(dest).await {
            debug!(error = %e, "could not remove partial input");
        }
        return Err(GatewayError::IncompleteBody {
            read: total,
            declared,
        });
    }

    file.flush()
        .await
        .map_err(|e| GatewayError::io("flushing input file", e))?;

    Ok(IngestedBody {
        path: dest.to_path_buf(),
        bytes: total,
    })
}
