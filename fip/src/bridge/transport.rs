//! Unix socket transport at the well-known path.
//!
//! The master owns the socket file: it removes stale files, binds, listens and
//! removes the file again on cleanup. Modules only ever connect.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::net::{UnixListener, UnixSocket, UnixStream};

/// Remove a socket file if present. Returns whether a file was removed.
pub fn remove_socket_file(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Bind a listening stream socket at `path`, replacing any stale file.
///
/// If binding succeeds but listening fails, the fresh socket file is removed
/// again so a failed start leaves nothing behind.
pub fn bind_listener(path: &Path, backlog: u32) -> io::Result<UnixListener> {
    if remove_socket_file(path)? {
        tracing::debug!(path = %path.display(), "Removed stale socket file");
    }

    let socket = UnixSocket::new_stream()?;
    socket.bind(path)?;
    match socket.listen(backlog) {
        Ok(listener) => {
            tracing::trace!(path = %path.display(), backlog, "Listening");
            Ok(listener)
        }
        Err(e) => {
            let _ = remove_socket_file(path);
            Err(e)
        }
    }
}

/// Every connection attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {source}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub source: io::Error,
}

/// Connect to `path`, trying up to `attempts` times with `interval` between
/// failed attempts.
pub async fn connect_with_retry(
    path: &Path,
    attempts: u32,
    interval: Duration,
) -> Result<UnixStream, RetryExhausted> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match UnixStream::connect(path).await {
            Ok(stream) => {
                tracing::trace!(attempt, path = %path.display(), "Connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(
                    attempt,
                    attempts,
                    path = %path.display(),
                    error = %e,
                    "Connect failed"
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Err(RetryExhausted {
        attempts,
        source: last_err.unwrap_or_else(|| io::Error::other("no connection attempt made")),
    })
}
