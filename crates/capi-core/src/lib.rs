//! capi-core: shared library for the capi tool server.
//!
//! Provides the error taxonomy, newline-delimited JSON framing used by the
//! editor bridge socket and the MCP transport, bridge/MCP message types, and
//! the terminal output sanitizer.

pub mod codec;
pub mod error;
pub mod messages;
pub mod sanitize;

// Re-export commonly used items at crate root.
pub use codec::{encode_line, parse_lenient, LineDecoder};
pub use error::{CapiError, CapiResult};
pub use messages::{BridgeAction, BridgeRequest, McpToolSpec};
pub use sanitize::{sanitize, strip_control, window_lines};
