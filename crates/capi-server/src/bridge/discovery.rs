//! Bridge socket discovery.
//!
//! Candidate order: explicit path, `<cwd>/.vscode/<name>`, `.vscode/<name>`
//! under up to six ancestors of the executable's directory,
//! `~/.capi/<name>`, then `<tmp>/<name>`. A candidate that does not exist is
//! skipped, not reported as a failure.

use std::path::{Path, PathBuf};

/// Socket file name the editor host listens on.
pub const DEFAULT_SOCKET_NAME: &str = "capi-bridge.sock";

/// Workspace-relative directory holding the socket.
const WORKSPACE_DIR: &str = ".vscode";

/// Per-user directory holding the fallback socket.
const HOME_DIR: &str = ".capi";

/// How many directories above the executable are searched.
const ANCESTOR_DEPTH: usize = 6;

/// Directories searched for the bridge socket.
///
/// Built from the process environment in production; tests fill the fields
/// with temporary directories.
#[derive(Debug, Clone)]
pub struct BridgeLocator {
    pub socket_name: String,
    pub cwd: Option<PathBuf>,
    pub exe_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}

impl BridgeLocator {
    /// Locator rooted at this process's working directory, executable and home.
    pub fn from_env(socket_name: &str) -> Self {
        Self {
            socket_name: socket_name.to_string(),
            cwd: std::env::current_dir().ok(),
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            home_dir: dirs::home_dir(),
            temp_dir: Some(std::env::temp_dir()),
        }
    }

    /// Every candidate path in priority order, duplicates removed.
    pub fn candidates(&self, explicit: Option<&Path>) -> Vec<PathBuf> {
        let name = self.socket_name.as_str();
        let mut out: Vec<PathBuf> = Vec::new();
        let mut push = |path: PathBuf| {
            if !out.contains(&path) {
                out.push(path);
            }
        };

        if let Some(path) = explicit {
            push(path.to_path_buf());
        }
        if let Some(cwd) = &self.cwd {
            push(cwd.join(WORKSPACE_DIR).join(name));
        }
        if let Some(exe_dir) = &self.exe_dir {
            for dir in exe_dir.ancestors().skip(1).take(ANCESTOR_DEPTH) {
                push(dir.join(WORKSPACE_DIR).join(name));
            }
        }
        if let Some(home) = &self.home_dir {
            push(home.join(HOME_DIR).join(name));
        }
        if let Some(tmp) = &self.temp_dir {
            push(tmp.join(name));
        }
        out
    }

    /// Candidates that currently exist on disk, in priority order.
    pub fn existing(&self, explicit: Option<&Path>) -> Vec<PathBuf> {
        self.candidates(explicit)
            .into_iter()
            .filter(|path| std::fs::metadata(path).is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(root: &Path) -> BridgeLocator {
        BridgeLocator {
            socket_name: "bridge.sock".into(),
            cwd: Some(root.join("work")),
            exe_dir: Some(root.join("install/a/b/bin")),
            home_dir: Some(root.join("home")),
            temp_dir: Some(root.join("tmp")),
        }
    }

    #[test]
    fn candidate_order() {
        let root = Path::new("/r");
        let list = locator(root).candidates(Some(Path::new("/explicit.sock")));

        assert_eq!(list[0], PathBuf::from("/explicit.sock"));
        assert_eq!(list[1], PathBuf::from("/r/work/.vscode/bridge.sock"));
        assert_eq!(list[2], PathBuf::from("/r/install/a/b/.vscode/bridge.sock"));
        assert_eq!(list[3], PathBuf::from("/r/install/a/.vscode/bridge.sock"));
        assert_eq!(list[list.len() - 2], PathBuf::from("/r/home/.capi/bridge.sock"));
        assert_eq!(list[list.len() - 1], PathBuf::from("/r/tmp/bridge.sock"));
    }

    #[test]
    fn ancestors_are_bounded() {
        let mut loc = locator(Path::new("/r"));
        loc.cwd = None;
        loc.home_dir = None;
        loc.temp_dir = None;
        loc.exe_dir = Some(PathBuf::from("/1/2/3/4/5/6/7/8/9"));

        let list = loc.candidates(None);
        assert_eq!(list.len(), 6);
        assert_eq!(list[0], PathBuf::from("/1/2/3/4/5/6/7/8/.vscode/bridge.sock"));
        assert_eq!(list[5], PathBuf::from("/1/2/3/.vscode/bridge.sock"));
    }

    #[test]
    fn duplicates_removed() {
        let mut loc = locator(Path::new("/r"));
        loc.exe_dir = None;
        let explicit = PathBuf::from("/r/work/.vscode/bridge.sock");
        let list = loc.candidates(Some(&explicit));
        assert_eq!(list.iter().filter(|p| **p == explicit).count(), 1);
    }

    #[test]
    fn missing_paths_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let loc = locator(dir.path());
        assert!(loc.existing(None).is_empty());

        let home_sock = dir.path().join("home/.capi/bridge.sock");
        std::fs::create_dir_all(home_sock.parent().unwrap()).unwrap();
        std::fs::write(&home_sock, b"").unwrap();
        assert_eq!(loc.existing(None), vec![home_sock]);
    }
}
