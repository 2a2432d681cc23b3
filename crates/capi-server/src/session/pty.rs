//! PTY wrapper using portable-pty.
//!
//! Opens a pseudo-terminal running the user's shell and exposes line writes,
//! interrupt delivery, and teardown. The readable side is handed out
//! separately as a [`PtyOutput`] owned by the session's reader.

use super::lock;
use capi_core::{CapiError, CapiResult};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// ASCII end-of-text; the terminal driver turns it into SIGINT for the
/// foreground process group.
const ETX: u8 = 0x03;

/// Writes that may wait for the shell before `send` reports the queue full.
const INPUT_QUEUE_DEPTH: usize = 256;

/// The platform's interactive shell: `SHELL` on POSIX, `ComSpec` elsewhere.
pub fn default_shell() -> String {
    if cfg!(windows) {
        std::env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// A managed PTY instance: master side plus the child shell attached to the slave.
///
/// Input is queued to a dedicated writer thread, so a shell that stops
/// reading never blocks the caller. Nothing here waits on that thread.
pub struct PtyHandle {
    /// Master side; `None` once closed.
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    /// Queue feeding the writer thread; `None` once closed.
    input: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    pid: Option<u32>,
    shell: String,
}

impl PtyHandle {
    /// Spawn `shell` (or the default shell) on a fresh PTY of the given size.
    ///
    /// Blocking; async callers run it on the blocking pool. Returns the
    /// handle and the output side for the reader. Our copy of the slave
    /// descriptor is closed before returning; the child keeps its own.
    pub fn spawn(shell: Option<&str>, cols: u16, rows: u16) -> CapiResult<(Self, PtyOutput)> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| CapiError::Spawn(format!("failed to open PTY: {e}")))?;

        let shell = shell.map(str::to_string).unwrap_or_else(default_shell);
        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CapiError::Spawn(format!("failed to spawn {shell}: {e}")))?;
        drop(pair.slave);

        let pid = child.process_id();
        info!(shell = %shell, pid = ?pid, cols, rows, "PTY spawned");

        let output = PtyOutput::from_master(pair.master.as_ref())?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CapiError::Spawn(format!("failed to take PTY writer: {e}")))?;
        let input = spawn_writer(pid, writer)?;

        Ok((
            Self {
                master: Mutex::new(Some(pair.master)),
                input: Mutex::new(Some(input)),
                child: Mutex::new(child),
                pid,
                shell,
            },
            output,
        ))
    }

    /// Queue `text` as one input line, appending `\n` if it is missing.
    ///
    /// Returns once the line is queued, not once the shell has read it.
    pub fn write_line(&self, text: &str) -> CapiResult<()> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        if !text.ends_with('\n') {
            line.push('\n');
        }
        self.enqueue(line.into_bytes())
    }

    /// Deliver Ctrl-C to the foreground process of the terminal.
    pub fn interrupt(&self) -> CapiResult<()> {
        self.enqueue(vec![ETX])
    }

    fn enqueue(&self, data: Vec<u8>) -> CapiResult<()> {
        let input = lock(&self.input);
        let input = input
            .as_ref()
            .ok_or_else(|| CapiError::Pty("PTY already closed".into()))?;
        input.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => CapiError::Pty("terminal input queue is full".into()),
            TrySendError::Closed(_) => CapiError::Pty("PTY writer has stopped".into()),
        })
    }

    /// Close the master side. Subsequent writes fail; calling twice is harmless.
    ///
    /// Never waits for a write in progress; the writer thread finishes on
    /// its own once the child is gone.
    pub fn close(&self) {
        let input = lock(&self.input).take();
        let master = lock(&self.master).take();
        if input.is_some() || master.is_some() {
            debug!(pid = ?self.pid, "PTY master closed");
        }
    }

    /// Terminate the child shell and reap it.
    ///
    /// Blocks until the child has exited; async callers bound it with a timeout.
    pub fn terminate(&self) -> CapiResult<()> {
        let mut child = lock(&self.child);
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = ?self.pid, status = ?status, "PTY child already exited");
            return Ok(());
        }
        if let Err(e) = child.kill() {
            // Usually a child that exited between the two calls.
            debug!(pid = ?self.pid, error = %e, "kill failed");
        }
        let status = child
            .wait()
            .map_err(|e| CapiError::Pty(format!("failed to reap child: {e}")))?;
        debug!(pid = ?self.pid, status = ?status, "PTY child reaped");
        Ok(())
    }

    /// OS process id of the child shell, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

/// Start the thread that owns the PTY writer and drains the input queue.
///
/// A plain thread rather than a blocking-pool task: a write stuck on a full
/// terminal must not hold up runtime shutdown. The thread ends when the
/// queue is closed or a write fails.
fn spawn_writer(
    pid: Option<u32>,
    mut writer: Box<dyn Write + Send>,
) -> CapiResult<mpsc::Sender<Vec<u8>>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("capi-pty-writer".into())
        .spawn(move || {
            while let Some(data) = rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    warn!(pid = ?pid, error = %e, "PTY write failed");
                    break;
                }
            }
            debug!(pid = ?pid, "PTY writer exited");
        })
        .map_err(|e| CapiError::Spawn(format!("failed to start PTY writer: {e}")))?;
    Ok(tx)
}

/// Readable side of a PTY master, owned by exactly one reader.
///
/// On POSIX this is a duplicate of the master descriptor, so readiness can be
/// polled with a timeout and the reader keeps a valid descriptor even after
/// the session closes its own copy. `MasterPty::try_clone_reader` is not
/// used there because it yields an opaque `Read` with nothing to poll.
pub struct PtyOutput {
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(not(unix))]
    reader: Box<dyn Read + Send>,
}

impl PtyOutput {
    #[cfg(unix)]
    fn from_master(master: &dyn MasterPty) -> CapiResult<Self> {
        let raw = master
            .as_raw_fd()
            .ok_or_else(|| CapiError::Spawn("PTY master has no file descriptor".into()))?;
        Ok(Self {
            file: std::fs::File::from(dup_owned(raw)?),
        })
    }

    #[cfg(not(unix))]
    fn from_master(master: &dyn MasterPty) -> CapiResult<Self> {
        let reader = master
            .try_clone_reader()
            .map_err(|e| CapiError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        Ok(Self { reader })
    }

    /// Wait up to `timeout` for the descriptor to become readable.
    ///
    /// Returns `Ok(true)` when a read will not block (data, EOF or a hangup).
    #[cfg(unix)]
    pub fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        use nix::errno::Errno;
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
        use std::os::fd::AsFd;

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(fds[0].revents().is_some_and(|r| !r.is_empty())),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    /// Readiness cannot be polled here; reads block until data or EOF.
    #[cfg(not(unix))]
    pub fn wait_readable(&self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(unix)]
        {
            self.file.read(buf)
        }
        #[cfg(not(unix))]
        {
            self.reader.read(buf)
        }
    }
}

/// Duplicate `raw` into a descriptor owned independently of its source.
#[cfg(unix)]
fn dup_owned(raw: std::os::fd::RawFd) -> io::Result<std::os::fd::OwnedFd> {
    use std::os::fd::{FromRawFd, OwnedFd};

    let fd = nix::unistd::dup(raw).map_err(io::Error::from)?;
    // SAFETY: `dup` just returned `fd` and nothing else refers to it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn default_shell_is_never_empty() {
        assert!(!default_shell().is_empty());
    }

    #[test]
    fn spawn_write_and_terminate() {
        let (pty, _output) = PtyHandle::spawn(Some("/bin/sh"), 80, 24).unwrap();
        assert_eq!(pty.shell(), "/bin/sh");
        assert!(pty.pid().is_some());

        pty.write_line("true").unwrap();
        pty.interrupt().unwrap();

        pty.close();
        assert!(pty.write_line("echo late").is_err());
        pty.terminate().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn terminate_reaps_the_child() {
        let (pty, _output) = PtyHandle::spawn(Some("/bin/sh"), 80, 24).unwrap();
        let pid = pty.pid().unwrap();
        pty.close();
        pty.terminate().unwrap();
        // A zombie would keep its /proc entry until reaped.
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
        pty.terminate().unwrap();
    }

    #[test]
    fn output_outlives_the_master() {
        let (pty, mut output) = PtyHandle::spawn(Some("/bin/sh"), 80, 24).unwrap();
        pty.close();
        pty.terminate().unwrap();

        let mut buf = [0u8; 1024];
        for _ in 0..64 {
            assert!(output.wait_readable(Duration::from_millis(200)).is_ok());
            match output.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    assert_ne!(e.raw_os_error(), Some(nix::errno::Errno::EBADF as i32));
                    break;
                }
            }
        }
    }

    #[test]
    fn spawn_missing_shell_fails() {
        let result = PtyHandle::spawn(Some("/nonexistent/shell-binary"), 80, 24);
        assert!(matches!(result, Err(CapiError::Spawn(_))));
    }
}
