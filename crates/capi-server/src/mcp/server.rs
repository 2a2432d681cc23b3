//! MCP server loop: JSON-RPC 2.0, one message per line.
//!
//! Generic over the byte stream so the same loop serves stdio, TCP
//! connections and in-memory pipes in tests.

use crate::tools::ToolHost;
use capi_core::encode_line;
use capi_core::messages::{
    rpc_codes, JsonRpcRequest, JsonRpcResponse, McpCallParams, McpCallResult, MCP_PROTOCOL_VERSION,
};
use capi_core::CapiResult;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "capi-mcp-server";

/// Longest request line accepted; longer lines are discarded unparsed.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// A JSON-RPC error before it is attached to a request id.
type RpcError = (i32, String);

pub struct McpServer {
    tools: Arc<ToolHost>,
    max_line: usize,
}

impl McpServer {
    pub fn new(tools: Arc<ToolHost>) -> Self {
        Self {
            tools,
            max_line: MAX_LINE_BYTES,
        }
    }

    /// Answer requests from `reader` on `writer` until the reader hits EOF.
    ///
    /// Malformed input (bad UTF-8, bad JSON, an overlong line) is answered
    /// with a JSON-RPC error; only I/O failures end the loop.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> CapiResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let limit = self.max_line as u64 + 1;
            if (&mut reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let response = if buf.last() != Some(&b'\n') && buf.len() > self.max_line {
                discard_line(&mut reader).await?;
                warn!(limit = self.max_line, "oversized MCP message dropped");
                Some(JsonRpcResponse::failure(
                    Value::Null,
                    rpc_codes::INVALID_REQUEST,
                    format!("message exceeds {} bytes", self.max_line),
                ))
            } else {
                match std::str::from_utf8(&buf) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => self.handle_line(line.trim()).await,
                    Err(e) => {
                        warn!(error = %e, "MCP message is not UTF-8");
                        Some(JsonRpcResponse::failure(
                            Value::Null,
                            rpc_codes::PARSE_ERROR,
                            format!("parse error: {e}"),
                        ))
                    }
                }
            };

            if let Some(response) = response {
                writer.write_all(&encode_line(&response)?).await?;
                writer.flush().await?;
            }
        }
        debug!("MCP input closed");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable MCP message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    rpc_codes::PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
            }
        };

        let fallback_id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    fallback_id,
                    rpc_codes::INVALID_REQUEST,
                    format!("invalid request: {e}"),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                request.id.unwrap_or(Value::Null),
                rpc_codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let result = self.dispatch(&request.method, request.params).await;

        let id = match request.id {
            Some(id) => id,
            None => {
                debug!(method = %request.method, "notification handled");
                return None;
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err((code, message)) => JsonRpcResponse::failure(id, code, message),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => {
                info!("MCP client initialized");
                Ok(json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": self.tools.specs()})),
            "tools/call" => self.call_tool(params).await,
            m if m.starts_with("notifications/") => Ok(Value::Null),
            other => Err((
                rpc_codes::METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: McpCallParams = params
            .ok_or_else(|| "missing params".to_string())
            .and_then(|p| serde_json::from_value(p).map_err(|e| e.to_string()))
            .map_err(|e| (rpc_codes::INVALID_PARAMS, format!("invalid params: {e}")))?;

        if !self.tools.has_tool(&params.name) {
            return Err((
                rpc_codes::INVALID_PARAMS,
                format!("unknown tool: {}", params.name),
            ));
        }

        let output = self.tools.call(&params.name, &params.arguments).await;
        serde_json::to_value(McpCallResult::text(output.text, output.is_error))
            .map_err(|e| (rpc_codes::INVALID_PARAMS, e.to_string()))
    }
}

/// Skip input up to and including the next newline (or EOF).
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}
