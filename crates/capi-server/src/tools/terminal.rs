//! `terminal_*` tools over the session registry.
//!
//! Results are plain strings: `""` on success, `"Error: …"` on failure,
//! the new id for create and a JSON array for list.

use super::args::{parse_args, CreateArgs, ListArgs, ReadArgs, SendArgs, TerminalArgs};
use super::ToolOutput;
use crate::session::{ReadOptions, SessionManager};
use capi_core::{CapiResult, McpToolSpec};
use serde_json::{json, Value};

pub const CREATE: &str = "terminal_create";
pub const SEND: &str = "terminal_send";
pub const READ: &str = "terminal_read";
pub const INTERRUPT: &str = "terminal_interrupt";
pub const CLEAR: &str = "terminal_clear";
pub const DISPOSE: &str = "terminal_dispose";
pub const LIST: &str = "terminal_list";

fn payload_schema() -> Value {
    json!({
        "type": "object",
        "description": "Aggregate arguments; fields here override the direct ones"
    })
}

fn id_schema() -> Value {
    json!({"type": "string", "description": "Terminal id returned by terminal_create"})
}

fn spec(name: &str, description: &str, mut properties: Value, required: &[&str]) -> McpToolSpec {
    properties["payload"] = payload_schema();
    McpToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

pub fn specs() -> Vec<McpToolSpec> {
    vec![
        spec(
            CREATE,
            "Start a new local terminal running the user's shell. Returns its id.",
            json!({"name": {"type": "string", "description": "Id to use; generated if omitted"}}),
            &[],
        ),
        spec(
            SEND,
            "Send one line of input to a terminal (a newline is appended if missing).",
            json!({"terminalId": id_schema(), "text": {"type": "string"}}),
            &["terminalId", "text"],
        ),
        spec(
            READ,
            "Read a terminal's buffered output without consuming it.",
            json!({
                "terminalId": id_schema(),
                "strip_ansi": {"type": "boolean", "default": true, "description": "Remove escape sequences and control characters"},
                "lines": {"type": "integer", "description": "Return only the last N lines"}
            }),
            &["terminalId"],
        ),
        spec(
            INTERRUPT,
            "Send Ctrl-C to a terminal.",
            json!({"terminalId": id_schema()}),
            &["terminalId"],
        ),
        spec(
            CLEAR,
            "Discard a terminal's buffered output.",
            json!({"terminalId": id_schema()}),
            &["terminalId"],
        ),
        spec(
            DISPOSE,
            "Close a terminal and terminate its shell.",
            json!({"terminalId": id_schema()}),
            &["terminalId"],
        ),
        spec(
            LIST,
            "List live terminals as JSON.",
            json!({"include_remote": {"type": "boolean", "default": false, "description": "Also list terminals owned by the editor host"}}),
            &[],
        ),
    ]
}

/// Run the named terminal tool, or `None` if `name` is not one.
pub async fn call(sessions: &SessionManager, name: &str, arguments: &Value) -> Option<ToolOutput> {
    let result = match name {
        CREATE => create(sessions, arguments).await,
        SEND => send(sessions, arguments).await,
        READ => read(sessions, arguments).await,
        INTERRUPT => interrupt(sessions, arguments).await,
        CLEAR => clear(sessions, arguments).await,
        DISPOSE => dispose(sessions, arguments).await,
        LIST => list(sessions, arguments).await,
        _ => return None,
    };
    Some(match result {
        Ok(text) => ToolOutput::ok(text),
        Err(e) => ToolOutput::error(e),
    })
}

async fn create(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: CreateArgs = parse_args(arguments)?;
    sessions.create(args.name.as_deref()).await
}

async fn send(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: SendArgs = parse_args(arguments)?;
    sessions.send(&args.terminal_id, &args.text).await?;
    Ok(String::new())
}

async fn read(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: ReadArgs = parse_args(arguments)?;
    let options = ReadOptions {
        strip_ansi: args.strip_ansi,
        lines: args.lines,
    };
    sessions.read(&args.terminal_id, options).await
}

async fn interrupt(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: TerminalArgs = parse_args(arguments)?;
    sessions.interrupt(&args.terminal_id).await?;
    Ok(String::new())
}

async fn clear(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: TerminalArgs = parse_args(arguments)?;
    sessions.clear(&args.terminal_id).await?;
    Ok(String::new())
}

async fn dispose(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: TerminalArgs = parse_args(arguments)?;
    sessions.dispose(&args.terminal_id).await?;
    Ok(String::new())
}

async fn list(sessions: &SessionManager, arguments: &Value) -> CapiResult<String> {
    let args: ListArgs = parse_args(arguments)?;
    let entries = sessions.list(args.include_remote).await;
    Ok(serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string()))
}
