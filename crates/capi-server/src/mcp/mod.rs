//! MCP (Model Context Protocol) transport.

pub mod server;

pub use server::McpServer;
