//! Editor bridge: socket discovery and the exec exchange.

pub mod client;
pub mod discovery;

pub use client::BridgeClient;
pub use discovery::{BridgeLocator, DEFAULT_SOCKET_NAME};
