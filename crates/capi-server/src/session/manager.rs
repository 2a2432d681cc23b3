//! Terminal registry.
//!
//! Owns every live session, keyed by id. The map sits behind one async
//! RwLock; each session's buffer has its own mutex, so traffic on one
//! session never waits on another's reader.

use super::lock;
use super::pty::PtyHandle;
use super::reader::{self, ReaderConfig, ReaderControl, ReaderExit, ReaderState};
use super::ring_buffer::{RingBuffer, DEFAULT_CAPACITY};
use crate::bridge::BridgeClient;
use capi_core::{sanitize, CapiError, CapiResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default upper bound on concurrently live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Default bound on waiting for a reader to exit during dispose.
pub const DEFAULT_DISPOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Host-side snippet listing terminals registered inside the editor process.
const REMOTE_LIST_CODE: &str = r#"const terminals = globalThis.__mcp_terminals;
if (!terminals) return [];
const ids = terminals instanceof Map ? Array.from(terminals.keys()) : Object.keys(terminals);
return ids.map((id) => ({ id }));"#;

/// Registry tunables.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Shell to spawn; `None` uses the platform default.
    pub shell: Option<String>,
    pub buffer_capacity: usize,
    pub reader: ReaderConfig,
    pub dispose_timeout: Duration,
    pub max_sessions: usize,
    pub cols: u16,
    pub rows: u16,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            shell: None,
            buffer_capacity: DEFAULT_CAPACITY,
            reader: ReaderConfig::default(),
            dispose_timeout: DEFAULT_DISPOSE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            cols: 80,
            rows: 24,
        }
    }
}

/// Options for [`SessionManager::read`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Strip escape sequences and control characters.
    pub strip_ansi: bool,
    /// Keep only the trailing N lines of the (cleaned) output.
    pub lines: Option<i64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            strip_ansi: true,
            lines: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Pty,
    Remote,
}

/// One entry of [`SessionManager::list`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader: Option<ReaderState>,
}

impl SessionInfo {
    fn remote(id: String) -> Self {
        Self {
            id,
            kind: SessionKind::Remote,
            pid: None,
            buffer_chars: None,
            total_written: None,
            reader: None,
        }
    }
}

/// A live terminal: PTY, output buffer and the reader feeding it.
pub struct Session {
    pub id: String,
    pty: PtyHandle,
    buffer: Arc<Mutex<RingBuffer>>,
    control: ReaderControl,
    reader: Mutex<Option<JoinHandle<ReaderExit>>>,
}

impl Session {
    /// Spawn the PTY and start its reader, both on the blocking pool.
    async fn start(id: String, config: &SessionManagerConfig) -> CapiResult<Self> {
        let (shell, cols, rows) = (config.shell.clone(), config.cols, config.rows);
        let (pty, output) =
            tokio::task::spawn_blocking(move || PtyHandle::spawn(shell.as_deref(), cols, rows))
                .await
                .map_err(|e| CapiError::Spawn(format!("spawn task failed: {e}")))??;
        let buffer = Arc::new(Mutex::new(RingBuffer::new(config.buffer_capacity)));
        let control = ReaderControl::new();

        let handle = {
            let id = id.clone();
            let buffer = Arc::clone(&buffer);
            let control = control.clone();
            let reader_config = config.reader;
            tokio::task::spawn_blocking(move || reader::run(&id, output, buffer, control, reader_config))
        };

        Ok(Self {
            id,
            pty,
            buffer,
            control,
            reader: Mutex::new(Some(handle)),
        })
    }

    pub fn info(&self) -> SessionInfo {
        let buffer = lock(&self.buffer);
        SessionInfo {
            id: self.id.clone(),
            kind: SessionKind::Pty,
            pid: self.pty.pid(),
            buffer_chars: Some(buffer.len()),
            total_written: Some(buffer.total_written()),
            reader: Some(self.control.state()),
        }
    }

    /// Stop the reader, close the master, terminate the child, join the reader.
    ///
    /// Every step runs regardless of earlier failures. Reaping the child and
    /// joining the reader are each bounded by `join_timeout`.
    async fn teardown(self: Arc<Self>, join_timeout: Duration) {
        self.control.request_stop();
        self.pty.close();

        let session = Arc::clone(&self);
        let terminate = tokio::task::spawn_blocking(move || session.pty.terminate());
        match tokio::time::timeout(join_timeout, terminate).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(session_id = %self.id, error = %e, "failed to terminate shell"),
            Ok(Err(e)) => warn!(session_id = %self.id, error = %e, "terminate task failed"),
            Err(_) => warn!(session_id = %self.id, "shell was not reaped in time"),
        }

        let handle = lock(&self.reader).take();
        if let Some(handle) = handle {
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(exit)) => debug!(session_id = %self.id, exit = ?exit, "reader joined"),
                Ok(Err(e)) => warn!(session_id = %self.id, error = %e, "reader task failed"),
                Err(_) => warn!(
                    session_id = %self.id,
                    timeout_ms = join_timeout.as_millis() as u64,
                    "reader did not stop in time"
                ),
            }
        }
    }
}

/// Registry of live terminal sessions.
///
/// Created once by the server and shared by handle; [`SessionManager::shutdown`]
/// disposes whatever is still alive when the server stops.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    config: SessionManagerConfig,
    bridge: Option<BridgeClient>,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            bridge: None,
        }
    }

    /// Attach a bridge client used by `list(include_remote = true)`.
    pub fn with_bridge(mut self, bridge: BridgeClient) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Start a terminal and return its id.
    ///
    /// A non-blank `name` becomes the id verbatim; otherwise one is generated.
    /// Fails with `SessionExists` if the id is live, and with `Spawn` if the
    /// PTY could not be created (nothing is registered in that case).
    pub async fn create(&self, name: Option<&str>) -> CapiResult<String> {
        let id = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => generate_session_id(),
        };

        self.check_room(&*self.sessions.read().await, &id)?;

        let session = Arc::new(Session::start(id.clone(), &self.config).await?);

        let mut sessions = self.sessions.write().await;
        if let Err(e) = self.check_room(&sessions, &id) {
            drop(sessions);
            session.teardown(self.config.dispose_timeout).await;
            return Err(e);
        }
        sessions.insert(id.clone(), Arc::clone(&session));
        drop(sessions);

        info!(session_id = %id, pid = ?session.pty.pid(), shell = %session.pty.shell(), "terminal created");
        Ok(id)
    }

    fn check_room(&self, sessions: &HashMap<String, Arc<Session>>, id: &str) -> CapiResult<()> {
        if sessions.contains_key(id) {
            return Err(CapiError::SessionExists(id.to_string()));
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(CapiError::Other(format!(
                "max terminals ({}) reached",
                self.config.max_sessions
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> CapiResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CapiError::SessionNotFound(id.to_string()))
    }

    /// Queue one line of input for the terminal. Does not wait for the shell.
    pub async fn send(&self, id: &str, text: &str) -> CapiResult<()> {
        let session = self.get(id).await?;
        session.pty.write_line(text)?;
        debug!(session_id = %id, bytes = text.len(), "input sent");
        Ok(())
    }

    /// Snapshot the terminal's buffered output. Never consumes it.
    pub async fn read(&self, id: &str, options: ReadOptions) -> CapiResult<String> {
        let session = self.get(id).await?;
        if !options.strip_ansi {
            return Ok(lock(&session.buffer).snapshot_window(options.lines));
        }
        let snapshot = lock(&session.buffer).snapshot();
        Ok(sanitize(&snapshot, true, options.lines))
    }

    /// Send Ctrl-C to the terminal.
    pub async fn interrupt(&self, id: &str) -> CapiResult<()> {
        let session = self.get(id).await?;
        session.pty.interrupt()?;
        debug!(session_id = %id, "interrupt sent");
        Ok(())
    }

    /// Discard the terminal's buffered output.
    pub async fn clear(&self, id: &str) -> CapiResult<()> {
        let session = self.get(id).await?;
        lock(&session.buffer).clear();
        Ok(())
    }

    /// Tear the terminal down and forget it.
    ///
    /// Unknown ids are accepted and ignored, so disposing twice succeeds.
    pub async fn dispose(&self, id: &str) -> CapiResult<()> {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.teardown(self.config.dispose_timeout).await;
                info!(session_id = %id, "terminal disposed");
            }
            None => debug!(session_id = %id, "dispose of unknown terminal ignored"),
        }
        Ok(())
    }

    /// Live local terminals sorted by id, plus the editor host's own
    /// terminals when `include_remote` is set and a bridge is configured.
    ///
    /// A bridge failure only drops the remote entries.
    pub async fn list(&self, include_remote: bool) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));

        if include_remote {
            out.extend(self.list_remote().await);
        }
        out
    }

    async fn list_remote(&self) -> Vec<SessionInfo> {
        let Some(bridge) = &self.bridge else {
            return Vec::new();
        };
        let outcome = bridge.exec(REMOTE_LIST_CODE, Value::Null, None, None).await;
        match outcome.result() {
            Some(result) => remote_ids(result).into_iter().map(SessionInfo::remote).collect(),
            None => {
                debug!("remote terminal listing unavailable");
                Vec::new()
            }
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Dispose every live terminal. Called once when the server stops.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Session>> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "disposing terminals");
        for session in drained {
            session.teardown(self.config.dispose_timeout).await;
        }
    }
}

/// Extract terminal ids from the host's answer.
///
/// Accepts a bare array or an object wrapping one under `result`; entries may
/// be strings or objects with an `id`.
fn remote_ids(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("result") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Object(obj) => obj.get("id").and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            _ => None,
        })
        .collect()
}

/// `mcp-terminal-<unix seconds>-<8 hex chars>`.
fn generate_session_id() -> String {
    use rand::Rng;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let bytes: [u8; 4] = rand::thread_rng().gen();
    format!("mcp-terminal-{secs}-{}", hex::encode(bytes))
}
