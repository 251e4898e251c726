//! SSH Exec MCP Server - Entry point
//!
//! Parses CLI arguments, validates configuration, serves JSON-RPC on
//! stdin/stdout and handles graceful shutdown.

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ssh_exec_mcp::config::{Args, Config};
use ssh_exec_mcp::error::Result;
use ssh_exec_mcp::server::SshMcpServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is for JSON-RPC frames only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    info!("SSH Exec MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Target {}@{}:{} (connects on first tool call)",
        config.user, config.host, config.port
    );
    info!(
        "Timeout: {}ms, Max chars: {}, Max output: {} bytes",
        config.timeout_ms,
        config
            .max_chars
            .map_or("unlimited".to_string(), |n| n.to_string()),
        config.max_output
    );

    if config.disable_sudo {
        info!("sudo-exec tool is disabled");
    }

    let server = SshMcpServer::new(config).await?;

    info!("SSH Exec MCP Server running on stdio");

    let result = server
        .serve(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
        .await;

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Server error: {}", e);
            1
        }
    };

    info!("SSH Exec MCP Server stopped");

    // The runtime would otherwise wait on the blocking stdin read forever
    std::process::exit(code)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
