//! Wire messages: bridge socket requests and MCP (JSON-RPC 2.0) envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision announced in `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes used by the MCP loop.
pub mod rpc_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

// ── Bridge socket ───────────────────────────────────────────────────

/// Actions understood by the editor host on the bridge socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeAction {
    Exec,
}

/// One request sent over a fresh bridge connection.
///
/// The response is correlated positionally: one request per connection,
/// the first line read back is its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: String,
    pub action: BridgeAction,
    pub code: String,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeRequest {
    /// Build an `exec` request, wrapping `body` so the host can `return` a value.
    pub fn exec(body: &str, payload: Value) -> Self {
        Self {
            id: generate_request_id(),
            action: BridgeAction::Exec,
            code: wrap_async(body),
            payload,
        }
    }
}

/// Wrap a code body in an async immediately-invoked function expression.
pub fn wrap_async(body: &str) -> String {
    format!("(async () => {{\n{body}\n}})()")
}

/// Generate a random request id (hex-encoded, 16 bytes = 32 hex chars).
pub fn generate_request_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

// ── MCP / JSON-RPC ──────────────────────────────────────────────────

/// Tool description as published by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// `tools/call` result: a single text content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpCallResult {
    pub content: Vec<McpContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl McpCallResult {
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            is_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text { text: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exec_request_wraps_body_and_serializes_action() {
        let req = BridgeRequest::exec("return 1;", json!({"k": "v"}));
        assert!(req.code.starts_with("(async () => {"));
        assert!(req.code.contains("return 1;"));
        assert!(req.code.ends_with("})()"));
        assert_eq!(req.id.len(), 32);

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["action"], "exec");
        assert_eq!(value["payload"]["k"], "v");
    }

    #[test]
    fn request_ids_are_fresh() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn call_result_shape() {
        let value = serde_json::to_value(McpCallResult::text("hi", false)).unwrap();
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
        );
    }

    #[test]
    fn failure_response_omits_result() {
        let resp = JsonRpcResponse::failure(json!(7), rpc_codes::METHOD_NOT_FOUND, "nope");
        let value = serde_json::to_value(resp).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["id"], 7);
    }
}
