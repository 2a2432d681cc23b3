//! `bridge_exec`: run JavaScript inside the editor host.

use super::args::{parse_plain, BridgeExecArgs};
use super::ToolOutput;
use crate::bridge::BridgeClient;
use capi_core::McpToolSpec;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

pub const EXEC: &str = "bridge_exec";

pub fn specs() -> Vec<McpToolSpec> {
    vec![McpToolSpec {
        name: EXEC.to_string(),
        description: "Run a JavaScript function body inside the editor host over the bridge \
                      socket. The body may `return` a value; the reply is JSON."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Function body; may use `await` and `return`"},
                "payload": {"description": "Data passed to the host alongside the code"},
                "socket_path": {"type": "string", "description": "Socket to try before discovery"},
                "timeout_ms": {"type": "integer", "description": "Per-socket exchange timeout"}
            },
            "required": ["code"],
        }),
    }]
}

pub async fn exec(bridge: &BridgeClient, arguments: &Value) -> ToolOutput {
    let args: BridgeExecArgs = match parse_plain(arguments) {
        Ok(args) => args,
        Err(e) => {
            return ToolOutput::json(
                &json!({"ok": false, "error": e.to_string()}),
                true,
            )
        }
    };

    let outcome = bridge
        .exec(
            &args.code,
            args.payload,
            args.socket_path.as_deref().map(Path::new),
            args.timeout_ms.map(Duration::from_millis),
        )
        .await;
    ToolOutput::json(&outcome.to_json(), !outcome.is_ok())
}
