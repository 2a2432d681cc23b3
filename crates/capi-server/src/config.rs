//! Server configuration: TOML file + CLI overrides.

use crate::bridge::{BridgeClient, BridgeLocator, DEFAULT_SOCKET_NAME};
use crate::session::reader::ReaderConfig;
use crate::session::SessionManagerConfig;
use capi_core::{CapiError, CapiResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub cli: CliSection,
}

/// `[terminal]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSection {
    /// Shell binary; unset means `$SHELL` / `%ComSpec%`.
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    #[serde(default = "default_dispose_timeout_ms")]
    pub dispose_timeout_ms: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            shell: None,
            buffer_capacity: default_buffer_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            read_chunk_size: default_read_chunk_size(),
            dispose_timeout_ms: default_dispose_timeout_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// `[bridge]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Socket tried before discovery.
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default = "default_bridge_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            socket_path: None,
            timeout_ms: default_bridge_timeout_ms(),
        }
    }
}

/// `[cli]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CliSection {
    #[serde(default = "default_cli_binary")]
    pub binary: String,
}

impl Default for CliSection {
    fn default() -> Self {
        Self {
            binary: default_cli_binary(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    200_000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_read_chunk_size() -> usize {
    4096
}
fn default_dispose_timeout_ms() -> u64 {
    1000
}
fn default_max_sessions() -> usize {
    64
}
fn default_socket_name() -> String {
    DEFAULT_SOCKET_NAME.to_string()
}
fn default_bridge_timeout_ms() -> u64 {
    5000
}
fn default_cli_binary() -> String {
    "capi".to_string()
}

/// Values given on the command line; each one beats the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub shell: Option<String>,
    pub buffer_capacity: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub max_sessions: Option<usize>,
    pub socket_path: Option<String>,
    pub bridge_timeout_ms: Option<u64>,
    pub cli_binary: Option<String>,
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub shell: Option<String>,
    pub buffer_capacity: usize,
    pub poll_interval: Duration,
    pub read_chunk_size: usize,
    pub dispose_timeout: Duration,
    pub max_sessions: usize,
    pub socket_name: String,
    pub socket_path: Option<PathBuf>,
    pub bridge_timeout: Duration,
    pub cli_binary: String,
}

impl ServerConfig {
    /// Load config from a TOML file (missing file means defaults), then
    /// apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> CapiResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    Self::parse_file(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Ok(Self::resolve(file_config, overrides))
    }

    fn parse_file(content: &str) -> CapiResult<ConfigFile> {
        toml::from_str::<ConfigFile>(content)
            .map_err(|e| CapiError::Other(format!("config parse error: {e}")))
    }

    fn resolve(file: ConfigFile, cli: ConfigOverrides) -> Self {
        let socket_path = cli
            .socket_path
            .or(file.bridge.socket_path)
            .map(|s| expand_tilde_str(&s));

        Self {
            shell: cli.shell.or(file.terminal.shell),
            buffer_capacity: cli.buffer_capacity.unwrap_or(file.terminal.buffer_capacity),
            poll_interval: Duration::from_millis(
                cli.poll_interval_ms.unwrap_or(file.terminal.poll_interval_ms),
            ),
            read_chunk_size: file.terminal.read_chunk_size,
            dispose_timeout: Duration::from_millis(file.terminal.dispose_timeout_ms),
            max_sessions: cli.max_sessions.unwrap_or(file.terminal.max_sessions),
            socket_name: file.bridge.socket_name,
            socket_path,
            bridge_timeout: Duration::from_millis(
                cli.bridge_timeout_ms.unwrap_or(file.bridge.timeout_ms),
            ),
            cli_binary: cli.cli_binary.unwrap_or(file.cli.binary),
        }
    }

    pub fn session_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            shell: self.shell.clone(),
            buffer_capacity: self.buffer_capacity,
            reader: ReaderConfig {
                poll_interval: self.poll_interval,
                chunk_size: self.read_chunk_size,
            },
            dispose_timeout: self.dispose_timeout,
            max_sessions: self.max_sessions,
            ..SessionManagerConfig::default()
        }
    }

    pub fn bridge_client(&self) -> BridgeClient {
        BridgeClient::new(
            BridgeLocator::from_env(&self.socket_name),
            self.socket_path.clone(),
            self.bridge_timeout,
        )
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None, ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.buffer_capacity, 200_000);
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.read_chunk_size, 4096);
        assert_eq!(cfg.dispose_timeout, Duration::from_secs(1));
        assert_eq!(cfg.max_sessions, 64);
        assert_eq!(cfg.socket_name, "capi-bridge.sock");
        assert_eq!(cfg.bridge_timeout, Duration::from_secs(5));
        assert_eq!(cfg.cli_binary, "capi");
        assert!(cfg.shell.is_none());
        assert!(cfg.socket_path.is_none());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = ServerConfig::load(Some(&path), ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.max_sessions, 64);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[terminal]\nshell = \"/bin/zsh\"\nbuffer_capacity = 1000\n\n[bridge]\ntimeout_ms = 250\n",
        )
        .unwrap();

        let cfg = ServerConfig::load(Some(&path), ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(cfg.buffer_capacity, 1000);
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.bridge_timeout, Duration::from_millis(250));
        assert_eq!(cfg.socket_name, "capi-bridge.sock");
    }

    #[test]
    fn cli_overrides_file() {
        let file = ConfigFile::default();
        let cfg = ServerConfig::resolve(
            file,
            ConfigOverrides {
                shell: Some("/bin/bash".into()),
                max_sessions: Some(2),
                socket_path: Some("/run/x.sock".into()),
                cli_binary: Some("capi-dev".into()),
                ..ConfigOverrides::default()
            },
        );
        assert_eq!(cfg.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(cfg.max_sessions, 2);
        assert_eq!(cfg.socket_path, Some(PathBuf::from("/run/x.sock")));
        assert_eq!(cfg.cli_binary, "capi-dev");

        let session = cfg.session_config();
        assert_eq!(session.max_sessions, 2);
        assert_eq!(session.reader.chunk_size, 4096);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(ServerConfig::parse_file("[terminal\nshell=").is_err());
        assert!(ServerConfig::parse_file("[terminal]\nmax_sessions = \"many\"").is_err());
    }

    #[test]
    fn tilde_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde_str("~/.capi/x.sock"), home.join(".capi/x.sock"));
        }
        assert_eq!(expand_tilde_str("/abs/path"), PathBuf::from("/abs/path"));
    }
}
