//! Tool layer: names, schemas and dispatch for every callable operation.
//!
//! No call ever fails past this boundary. Errors come back as an
//! `"Error: …"` string or an `{ok:false, …}` object with `is_error` set.

pub mod args;
pub mod bridge;
pub mod cli;
pub mod terminal;

use crate::bridge::BridgeClient;
use crate::session::SessionManager;
use capi_core::{CapiError, McpToolSpec};
use cli::CliRunner;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Text returned by a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(err: CapiError) -> Self {
        Self {
            text: format!("Error: {err}"),
            is_error: true,
        }
    }

    pub fn json(value: &Value, is_error: bool) -> Self {
        Self {
            text: value.to_string(),
            is_error,
        }
    }
}

/// Every tool the server publishes, bound to the resources they act on.
pub struct ToolHost {
    sessions: Arc<SessionManager>,
    bridge: BridgeClient,
    cli: CliRunner,
}

impl ToolHost {
    pub fn new(sessions: Arc<SessionManager>, bridge: BridgeClient, cli: CliRunner) -> Self {
        Self {
            sessions,
            bridge,
            cli,
        }
    }

    pub fn specs(&self) -> Vec<McpToolSpec> {
        let mut specs = terminal::specs();
        specs.extend(bridge::specs());
        specs.extend(cli::specs());
        specs
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.specs().iter().any(|spec| spec.name == name)
    }

    pub async fn call(&self, name: &str, arguments: &Value) -> ToolOutput {
        debug!(tool = name, "tool call");

        if let Some(out) = terminal::call(&self.sessions, name, arguments).await {
            return out;
        }
        if name == bridge::EXEC {
            return bridge::exec(&self.bridge, arguments).await;
        }
        if let Some(out) = cli::call(&self.cli, name, arguments).await {
            return out;
        }
        ToolOutput::error(CapiError::InvalidParams(format!("unknown tool: {name}")))
    }
}
