//! Typed tool arguments.
//!
//! Callers may pass fields directly or inside an aggregate `payload` object;
//! a field present in both takes the `payload` value.

use capi_core::{CapiError, CapiResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Deserialize `arguments` into `T`, folding `payload` fields over the
/// direct ones first.
pub fn parse_args<T: DeserializeOwned>(arguments: &Value) -> CapiResult<T> {
    let mut merged = object(arguments)?;
    match merged.remove("payload") {
        Some(Value::Object(payload)) => merged.extend(payload),
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(CapiError::InvalidParams("payload must be an object".into()));
        }
    }
    from_map(merged)
}

/// Deserialize `arguments` into `T` as-is; `payload` is an ordinary field.
pub fn parse_plain<T: DeserializeOwned>(arguments: &Value) -> CapiResult<T> {
    from_map(object(arguments)?)
}

fn object(arguments: &Value) -> CapiResult<Map<String, Value>> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(CapiError::InvalidParams("arguments must be an object".into())),
    }
}

fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> CapiResult<T> {
    serde_json::from_value(Value::Object(map)).map_err(|e| CapiError::InvalidParams(e.to_string()))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateArgs {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminalArgs {
    #[serde(rename = "terminalId", alias = "terminal_id", alias = "id")]
    pub terminal_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendArgs {
    #[serde(rename = "terminalId", alias = "terminal_id", alias = "id")]
    pub terminal_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadArgs {
    #[serde(rename = "terminalId", alias = "terminal_id", alias = "id")]
    pub terminal_id: String,
    #[serde(default = "default_true", alias = "stripAnsi")]
    pub strip_ansi: bool,
    #[serde(default)]
    pub lines: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    #[serde(default, alias = "includeRemote")]
    pub include_remote: bool,
}

/// `bridge_exec` arguments. `payload` is forwarded to the host untouched.
#[derive(Debug, Deserialize)]
pub struct BridgeExecArgs {
    pub code: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, alias = "socketPath")]
    pub socket_path: Option<String>,
    #[serde(default, alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

/// Extra CLI arguments: a list, or one string split the way a shell would.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CliArgList {
    List(Vec<String>),
    Line(String),
}

impl CliArgList {
    pub fn into_vec(self) -> CapiResult<Vec<String>> {
        match self {
            Self::List(args) => Ok(args),
            Self::Line(line) => shlex::split(&line)
                .ok_or_else(|| CapiError::InvalidParams(format!("cannot split args: {line}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CliExecArgs {
    pub code: String,
    #[serde(default)]
    pub args: Option<CliArgList>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CliCommandArgs {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<CliArgList>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_overrides_direct_arguments() {
        let args: ReadArgs = parse_args(&json!({
            "terminalId": "direct",
            "lines": 5,
            "payload": {"terminalId": "from-payload", "strip_ansi": false}
        }))
        .unwrap();
        assert_eq!(args.terminal_id, "from-payload");
        assert!(!args.strip_ansi);
        assert_eq!(args.lines, Some(5));
    }

    #[test]
    fn payload_alone_is_enough() {
        let args: SendArgs =
            parse_args(&json!({"payload": {"terminal_id": "t1", "text": "ls"}})).unwrap();
        assert_eq!(args.terminal_id, "t1");
        assert_eq!(args.text, "ls");
    }

    #[test]
    fn read_defaults() {
        let args: ReadArgs = parse_args(&json!({"terminalId": "t"})).unwrap();
        assert!(args.strip_ansi);
        assert_eq!(args.lines, None);
    }

    #[test]
    fn null_arguments_are_empty() {
        let args: ListArgs = parse_args(&Value::Null).unwrap();
        assert!(!args.include_remote);
        let args: CreateArgs = parse_args(&json!({"payload": null})).unwrap();
        assert!(args.name.is_none());
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let err = parse_args::<SendArgs>(&json!({"terminalId": "t"})).unwrap_err();
        assert!(matches!(err, CapiError::InvalidParams(_)));
        let err = parse_args::<CreateArgs>(&json!({"payload": 3})).unwrap_err();
        assert!(matches!(err, CapiError::InvalidParams(_)));
    }

    #[test]
    fn bridge_payload_is_not_merged() {
        let args: BridgeExecArgs = parse_plain(&json!({
            "code": "return payload.x;",
            "payload": {"code": "ignored", "x": 1}
        }))
        .unwrap();
        assert_eq!(args.code, "return payload.x;");
        assert_eq!(args.payload["x"], 1);
    }

    #[test]
    fn cli_args_accept_a_list() {
        let args: CliExecArgs =
            parse_args(&json!({"code": "1", "args": ["--json", "two words"]})).unwrap();
        assert_eq!(
            args.args.unwrap().into_vec().unwrap(),
            vec!["--json", "two words"]
        );
    }

    #[test]
    fn cli_args_accept_a_shell_style_string() {
        let args: CliCommandArgs =
            parse_args(&json!({"payload": {"args": "--name 'two words' -v"}})).unwrap();
        assert_eq!(
            args.args.unwrap().into_vec().unwrap(),
            vec!["--name", "two words", "-v"]
        );

        let args: CliCommandArgs = parse_args(&json!({"args": "\"unterminated"})).unwrap();
        let err = args.args.unwrap().into_vec().unwrap_err();
        assert!(matches!(err, CapiError::InvalidParams(_)));

        let args: CliCommandArgs = parse_args(&json!({"args": null})).unwrap();
        assert!(args.args.is_none());
    }
}
