//! SSH Exec MCP Server - A Model Context Protocol server for remote SSH command execution
//!
//! This crate provides a stdio MCP server that runs commands on one remote
//! Linux host over a single persistent SSH session. It supports password and
//! key-based authentication and privilege elevation through `sudo`, with the
//! sudo password delivered on stdin and scrubbed from every response.
//!
//! # Features
//!
//! - Execute shell commands on the remote SSH server (`exec` tool)
//! - Execute commands through `sudo` (`sudo-exec` tool, can be disabled with `--disable-sudo`)
//! - Lazy, persistent SSH session with one reconnect on transient failures
//! - Per-command timeout, command length limit and output size limit
//! - Tool calls serialized against the session in arrival order
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ssh-exec-mcp --host=192.168.1.100 --user=admin --password=secret
//! ```
//!
//! # Example Usage (MCP Inspector)
//!
//! ```bash
//! npx @modelcontextprotocol/inspector ./target/release/ssh-exec-mcp -- \
//!   --host=YOUR_HOST --user=root --key=~/.ssh/id_ed25519
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod rpc;
pub mod server;
pub mod ssh;
pub mod tools;

// Re-exports for convenience
pub use config::{Args, Config};
pub use error::{Result, SshMcpError};
pub use executor::{CommandExecutor, CommandResult, ExecLimits};
pub use rpc::{RpcError, RpcResponse};
pub use server::SshMcpServer;
pub use ssh::{
    CommandOutput, Connector, RemoteCommand, RemoteShell, SessionManager, SessionState, SshConfig,
};
pub use tools::{ExecParams, SudoExecParams, ToolCall, ToolRegistry};
