//! Bridge client: one newline-delimited JSON exchange per connection.
//!
//! Each call walks the discovered socket candidates in order and returns the
//! first answer. Exhausting them yields a structured failure listing every
//! path tried, never an `Err`.

use super::discovery::{BridgeLocator, DEFAULT_SOCKET_NAME};
use capi_core::messages::BridgeRequest;
use capi_core::{CapiError, CapiResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time allowed for one connect + request + response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A candidate socket that existed but did not produce an answer.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeAttempt {
    pub path: PathBuf,
    pub error: String,
}

/// Result of [`BridgeClient::exec`].
#[derive(Debug, Clone)]
pub enum BridgeOutcome {
    Success {
        socket: PathBuf,
        result: Value,
    },
    Failure {
        /// Every candidate path checked, existing or not.
        searched: Vec<PathBuf>,
        attempted: Vec<BridgeAttempt>,
        last_error: Option<String>,
    },
}

impl BridgeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The host's answer, if the exchange succeeded.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    /// JSON shape returned to tool callers.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success { socket, result } => json!({
                "ok": true,
                "socket": socket,
                "result": result,
            }),
            Self::Failure {
                searched,
                attempted,
                last_error,
            } => {
                let error = if attempted.is_empty() {
                    "bridge socket not found"
                } else {
                    "bridge socket unresponsive"
                };
                json!({
                    "ok": false,
                    "error": error,
                    "searched": searched,
                    "attempted": attempted,
                    "last_error": last_error,
                })
            }
        }
    }
}

/// Client for the editor host's bridge socket.
///
/// Holds no connection; every `exec` opens and closes its own.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    locator: BridgeLocator,
    default_socket: Option<PathBuf>,
    timeout: Duration,
}

impl Default for BridgeClient {
    fn default() -> Self {
        Self::new(BridgeLocator::from_env(DEFAULT_SOCKET_NAME), None, DEFAULT_TIMEOUT)
    }
}

impl BridgeClient {
    /// `default_socket` is tried first whenever a call names no socket itself.
    pub fn new(locator: BridgeLocator, default_socket: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            locator,
            default_socket,
            timeout,
        }
    }

    /// Run `code` on the editor host.
    ///
    /// The body is wrapped in an async IIFE so it may `return` a value.
    /// `timeout` overrides the client default for this call and applies to
    /// each candidate separately.
    pub async fn exec(
        &self,
        code: &str,
        payload: Value,
        socket_path: Option<&Path>,
        timeout: Option<Duration>,
    ) -> BridgeOutcome {
        let explicit = socket_path.or(self.default_socket.as_deref());
        let searched = self.locator.candidates(explicit);
        let existing = self.locator.existing(explicit);
        let timeout = timeout.unwrap_or(self.timeout);
        let request = BridgeRequest::exec(code, payload);

        let mut attempted = Vec::new();
        for path in existing {
            match exchange(&path, &request, timeout).await {
                Ok(result) => {
                    info!(socket = %path.display(), request_id = %request.id, "bridge exec completed");
                    return BridgeOutcome::Success {
                        socket: path,
                        result,
                    };
                }
                Err(e) => {
                    debug!(socket = %path.display(), error = %e, "bridge candidate failed");
                    attempted.push(BridgeAttempt {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        let last_error = attempted.last().map(|a| a.error.clone());
        warn!(
            searched = searched.len(),
            attempted = attempted.len(),
            last_error = ?last_error,
            "no bridge socket answered"
        );
        BridgeOutcome::Failure {
            searched,
            attempted,
            last_error,
        }
    }
}

/// Send `request` on a fresh connection and read back the first line.
///
/// A peer that closes (or stalls) without a newline still gets whatever it
/// sent parsed leniently; an empty reply is an error.
#[cfg(unix)]
async fn exchange(path: &Path, request: &BridgeRequest, timeout: Duration) -> CapiResult<Value> {
    use capi_core::{encode_line, parse_lenient, LineDecoder};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;
    use tokio::time::{timeout_at, Instant};

    let deadline = Instant::now() + timeout;

    let mut stream = timeout_at(deadline, UnixStream::connect(path))
        .await
        .map_err(|_| CapiError::Timeout)?
        .map_err(|e| CapiError::Transport(format!("connect failed: {e}")))?;

    let line = encode_line(request)?;
    timeout_at(deadline, stream.write_all(&line))
        .await
        .map_err(|_| CapiError::Timeout)?
        .map_err(|e| CapiError::Transport(format!("write failed: {e}")))?;

    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(Ok(0)) => {
                let rest = decoder.take_remaining();
                if rest.is_empty() {
                    return Err(CapiError::Transport(
                        "connection closed without a response".into(),
                    ));
                }
                return Ok(parse_lenient(&rest));
            }
            Ok(Ok(n)) => {
                if let Some(first) = decoder.feed(&buf[..n]).into_iter().next() {
                    return Ok(parse_lenient(&first));
                }
            }
            Ok(Err(e)) => return Err(CapiError::Transport(format!("read failed: {e}"))),
            Err(_) => {
                let rest = decoder.take_remaining();
                if rest.is_empty() {
                    return Err(CapiError::Timeout);
                }
                return Ok(parse_lenient(&rest));
            }
        }
    }
}

#[cfg(not(unix))]
async fn exchange(_path: &Path, _request: &BridgeRequest, _timeout: Duration) -> CapiResult<Value> {
    Err(CapiError::Transport(
        "unix domain sockets are not supported on this platform".into(),
    ))
}
