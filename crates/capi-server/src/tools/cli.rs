//! `cli_*` tools: pass-through to the editor's command-line client.
//!
//! Runs the configured binary via `tokio::process::Command`. The tool result
//! is stdout when the process succeeds and stderr (or stdout, if stderr is
//! empty) when it fails.

use super::args::{parse_args, CliCommandArgs, CliExecArgs};
use super::ToolOutput;
use capi_core::{CapiError, CapiResult, McpToolSpec};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub const EXEC: &str = "cli_exec";
pub const COMMAND: &str = "cli_command";
pub const HELP: &str = "cli_help";

/// Upper bound on a single CLI invocation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CliRunner {
    binary: String,
    timeout: Duration,
}

impl CliRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run the binary with `args`, returning the text to show the caller.
    async fn run(&self, args: &[String], cwd: Option<&str>) -> CapiResult<ToolOutput> {
        debug!(binary = %self.binary, args = ?args, "running CLI");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CapiError::Timeout)?
            .map_err(|e| CapiError::Other(format!("failed to run {}: {e}", self.binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(ToolOutput::ok(stdout));
        }

        let exit_code = output.status.code().unwrap_or(-1);
        warn!(
            binary = %self.binary,
            exit_code,
            stderr = %stderr.chars().take(200).collect::<String>(),
            "CLI exited with error"
        );
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        Ok(ToolOutput {
            text,
            is_error: true,
        })
    }
}

pub fn specs() -> Vec<McpToolSpec> {
    let payload = json!({"type": "object", "description": "Aggregate arguments; fields here override the direct ones"});
    let args = json!({
        "type": ["array", "string"],
        "items": {"type": "string"},
        "description": "Extra CLI arguments, as a list or one shell-style string"
    });
    vec![
        McpToolSpec {
            name: EXEC.to_string(),
            description: "Run JavaScript in the editor through the CLI's `exec` subcommand.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string"},
                    "args": args,
                    "cwd": {"type": "string"},
                    "payload": payload,
                },
                "required": ["code"],
            }),
        },
        McpToolSpec {
            name: COMMAND.to_string(),
            description: "Run an arbitrary CLI subcommand (default `--help`).".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Subcommand and flags, whitespace separated"},
                    "args": args,
                    "cwd": {"type": "string"},
                    "payload": payload,
                },
            }),
        },
        McpToolSpec {
            name: HELP.to_string(),
            description: "Show the CLI's help text.".to_string(),
            input_schema: json!({"type": "object", "properties": {"payload": payload}}),
        },
    ]
}

/// Run the named CLI tool, or `None` if `name` is not one.
pub async fn call(runner: &CliRunner, name: &str, arguments: &Value) -> Option<ToolOutput> {
    let result = match name {
        EXEC => exec(runner, arguments).await,
        COMMAND => command(runner, arguments).await,
        HELP => runner.run(&["--help".to_string()], None).await,
        _ => return None,
    };
    Some(result.unwrap_or_else(ToolOutput::error))
}

async fn exec(runner: &CliRunner, arguments: &Value) -> CapiResult<ToolOutput> {
    let args: CliExecArgs = parse_args(arguments)?;
    let mut argv = vec!["exec".to_string(), args.code];
    if let Some(extra) = args.args {
        argv.extend(extra.into_vec()?);
    }
    runner.run(&argv, args.cwd.as_deref()).await
}

async fn command(runner: &CliRunner, arguments: &Value) -> CapiResult<ToolOutput> {
    let args: CliCommandArgs = parse_args(arguments)?;
    let cwd = args.cwd.clone();
    let argv = command_argv(args)?;
    runner.run(&argv, cwd.as_deref()).await
}

fn command_argv(args: CliCommandArgs) -> CapiResult<Vec<String>> {
    let mut argv: Vec<String> = args
        .command
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if let Some(extra) = args.args {
        argv.extend(extra.into_vec()?);
    }
    if argv.is_empty() {
        argv.push("--help".to_string());
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::args::CliArgList;

    #[test]
    fn command_defaults_to_help() {
        assert_eq!(command_argv(CliCommandArgs::default()).unwrap(), vec!["--help"]);
    }

    #[test]
    fn command_splits_and_appends() {
        let args = CliCommandArgs {
            command: Some("status  --json".into()),
            args: Some(CliArgList::List(vec!["--verbose".into()])),
            cwd: None,
        };
        assert_eq!(command_argv(args).unwrap(), vec!["status", "--json", "--verbose"]);

        let args = CliCommandArgs {
            command: Some("open".into()),
            args: Some(CliArgList::Line("'my file.txt' --reuse".into())),
            cwd: None,
        };
        assert_eq!(command_argv(args).unwrap(), vec!["open", "my file.txt", "--reuse"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exec_passes_string_args_split() {
        let runner = CliRunner::new("echo");
        let out = call(&runner, EXEC, &json!({"code": "1+1", "args": "-- 'a b'"}))
            .await
            .unwrap();
        assert_eq!(out.text, "exec 1+1 -- a b\n");
        assert!(!out.is_error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_returns_stdout() {
        let runner = CliRunner::new("echo");
        let out = runner.run(&["exec".into(), "1+1".into()], None).await.unwrap();
        assert_eq!(out.text, "exec 1+1\n");
        assert!(!out.is_error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_returns_stderr() {
        let runner = CliRunner::new("sh");
        let argv = vec!["-c".to_string(), "echo out; echo bad >&2; exit 3".to_string()];
        let out = runner.run(&argv, None).await.unwrap();
        assert_eq!(out.text, "bad\n");
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn missing_binary_is_an_error_string() {
        let runner = CliRunner::new("capi-binary-that-does-not-exist");
        let out = call(&runner, HELP, &Value::Null).await.unwrap();
        assert!(out.text.starts_with("Error: failed to run"));
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn unknown_name_is_not_handled() {
        let runner = CliRunner::new("capi");
        assert!(call(&runner, "terminal_read", &Value::Null).await.is_none());
    }
}
