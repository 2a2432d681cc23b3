//! capi-mcp-server: local terminals and the editor bridge as MCP tools.
//!
//! Speaks MCP over stdio by default, or over TCP with `--listen`. Every
//! connection shares one terminal registry, which is torn down on exit.

mod bridge;
mod config;
mod mcp;
mod session;
mod tools;

use anyhow::Context;
use clap::Parser;
use config::{ConfigOverrides, ServerConfig};
use mcp::McpServer;
use session::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tools::cli::CliRunner;
use tools::ToolHost;
use tracing::{error, info, warn};

/// capi-mcp-server: terminal sessions and editor bridge over MCP
#[derive(Parser, Debug)]
#[command(name = "capi-mcp-server", version, about = "MCP server for local terminals and the editor bridge")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.capi/config.toml")]
    config: String,

    /// Serve MCP over TCP on this address instead of stdio (e.g. 127.0.0.1:7010)
    #[arg(long)]
    listen: Option<String>,

    /// Shell to run in new terminals
    #[arg(long)]
    shell: Option<String>,

    /// Per-terminal output buffer capacity in characters
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Reader poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Maximum concurrent terminals
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Bridge socket to try before discovery
    #[arg(long)]
    socket_path: Option<String>,

    /// Bridge exchange timeout in milliseconds
    #[arg(long)]
    bridge_timeout_ms: Option<u64>,

    /// Editor CLI binary used by the cli_* tools
    #[arg(long)]
    cli_binary: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is the MCP channel.
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting capi-mcp-server");

    let overrides = ConfigOverrides {
        shell: cli.shell,
        buffer_capacity: cli.buffer_capacity,
        poll_interval_ms: cli.poll_interval_ms,
        max_sessions: cli.max_sessions,
        socket_path: cli.socket_path,
        bridge_timeout_ms: cli.bridge_timeout_ms,
        cli_binary: cli.cli_binary,
    };
    let config_path = PathBuf::from(&cli.config);
    let server_config =
        ServerConfig::load(Some(&config_path), overrides).context("failed to load config")?;

    let bridge = server_config.bridge_client();
    let sessions = Arc::new(
        SessionManager::new(server_config.session_config()).with_bridge(bridge.clone()),
    );
    let runner = CliRunner::new(server_config.cli_binary.clone());
    info!(
        max_sessions = server_config.max_sessions,
        cli = runner.binary(),
        socket = ?server_config.socket_path,
        "tool host ready"
    );
    let tools = Arc::new(ToolHost::new(Arc::clone(&sessions), bridge, runner));
    let server = Arc::new(McpServer::new(tools));

    let result = tokio::select! {
        result = run(Arc::clone(&server), cli.listen.as_deref()) => result,
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    info!(terminals = sessions.count().await, "shutting down");
    sessions.shutdown().await;
    info!("capi-mcp-server stopped");

    if let Err(e) = &result {
        error!(error = %e, "server error");
    }
    result
}

async fn run(server: Arc<McpServer>, listen: Option<&str>) -> anyhow::Result<()> {
    match listen {
        Some(addr) => serve_tcp(server, addr).await,
        None => {
            info!("serving MCP on stdio");
            server
                .serve(tokio::io::stdin(), tokio::io::stdout())
                .await
                .context("stdio transport failed")
        }
    }
}

/// Accept TCP clients forever, one MCP loop per connection.
async fn serve_tcp(server: Arc<McpServer>, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "serving MCP on TCP");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            info!(peer = %peer, "MCP client connected");
            let (reader, writer) = stream.into_split();
            if let Err(e) = server.serve(reader, writer).await {
                warn!(peer = %peer, error = %e, "MCP connection ended with error");
            }
            info!(peer = %peer, "MCP client disconnected");
        });
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
