//! Terminal sessions: PTY lifecycle, background reader, ring buffer, registry.

pub mod manager;
pub mod pty;
pub mod reader;
pub mod ring_buffer;

pub use manager::{ReadOptions, SessionManager, SessionManagerConfig};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
