//! Background reader draining one PTY into its session's ring buffer.
//!
//! The loop waits for readiness with a short timeout so the stop signal is
//! observed at least once per poll interval, even when the shell is silent.

use super::lock;
use super::pty::PtyOutput;
use super::ring_buffer::RingBuffer;
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Default readiness wait between stop-signal checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default maximum bytes per read.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Reader lifecycle: `Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderState {
    Running,
    Stopping,
    Stopped,
}

impl ReaderState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Why the reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The stop signal was observed.
    Stopped,
    /// Zero-length read: the child side went away.
    Eof,
    /// The descriptor failed (closed or broken).
    Error(String),
}

/// Cooperative cancellation shared by a session and its reader.
#[derive(Debug, Clone)]
pub struct ReaderControl {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl Default for ReaderControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderControl {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(ReaderState::Running as u8)),
        }
    }

    /// Ask the reader to stop. Level-triggered; calling again is harmless.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            ReaderState::Running as u8,
            ReaderState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn mark_stopped(&self) {
        self.state
            .store(ReaderState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Tunables for the reader loop.
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    pub poll_interval: Duration,
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Run the read loop until stopped, EOF, or a read error.
///
/// Blocking; intended for `tokio::task::spawn_blocking`.
pub fn run(
    session_id: &str,
    mut output: PtyOutput,
    buffer: Arc<Mutex<RingBuffer>>,
    control: ReaderControl,
    config: ReaderConfig,
) -> ReaderExit {
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    let mut decoder = Utf8Decoder::default();

    let exit = loop {
        if control.is_stop_requested() {
            break ReaderExit::Stopped;
        }

        match output.wait_readable(config.poll_interval) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => break ReaderExit::Error(e.to_string()),
        }

        match output.read(&mut chunk) {
            Ok(0) => break ReaderExit::Eof,
            Ok(n) => {
                let text = decoder.decode(&chunk[..n]);
                if !text.is_empty() {
                    trace!(session_id, bytes = n, "pty output");
                    lock(&buffer).append(&text);
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                continue
            }
            Err(e) => break ReaderExit::Error(e.to_string()),
        }
    };

    let rest = decoder.finish();
    if !rest.is_empty() {
        lock(&buffer).append(&rest);
    }

    control.mark_stopped();
    debug!(session_id, exit = ?exit, "reader finished");
    exit
}

/// Incremental UTF-8 decoder.
///
/// Invalid sequences become U+FFFD. A multi-byte character split across two
/// reads is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let split = incomplete_tail_start(&self.pending);
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Flush held-back bytes, replacing whatever is still incomplete.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Start of a trailing, truncated UTF-8 sequence, or `bytes.len()` if none.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    // A UTF-8 character is at most 4 bytes, so a truncated one is at most 3.
    let start = bytes.len().saturating_sub(3);
    for i in start..bytes.len() {
        if let Err(e) = std::str::from_utf8(&bytes[i..]) {
            if e.valid_up_to() == 0 && e.error_len().is_none() {
                return i;
            }
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_holds_split_character() {
        let euro = "€".as_bytes();
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'a', euro[0], euro[1]]), "a");
        assert_eq!(decoder.decode(&[euro[2], b'b']), "€b");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xffok"), "ok\u{fffd}ok");
    }

    #[test]
    fn decoder_flushes_truncated_tail_on_finish() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[test]
    fn control_transitions() {
        let control = ReaderControl::new();
        assert_eq!(control.state(), ReaderState::Running);
        assert!(!control.is_stop_requested());

        control.request_stop();
        assert!(control.is_stop_requested());
        assert_eq!(control.state(), ReaderState::Stopping);

        control.mark_stopped();
        control.request_stop();
        assert_eq!(control.state(), ReaderState::Stopped);
    }

    #[cfg(unix)]
    #[test]
    fn reader_stops_within_poll_interval() {
        use super::super::pty::PtyHandle;
        use std::time::Instant;

        let (pty, output) = PtyHandle::spawn(Some("/bin/sh"), 80, 24).unwrap();
        let buffer = Arc::new(Mutex::new(RingBuffer::new(1024)));
        let control = ReaderControl::new();
        let config = ReaderConfig {
            poll_interval: Duration::from_millis(20),
            chunk_size: 64,
        };

        let handle = {
            let buffer = Arc::clone(&buffer);
            let control = control.clone();
            std::thread::spawn(move || run("test", output, buffer, control, config))
        };

        std::thread::sleep(Duration::from_millis(50));
        let asked = Instant::now();
        control.request_stop();
        let exit = handle.join().unwrap();

        assert!(asked.elapsed() < Duration::from_secs(1));
        assert_eq!(control.state(), ReaderState::Stopped);
        assert_eq!(exit, ReaderExit::Stopped);

        pty.close();
        pty.terminate().unwrap();
    }
}
