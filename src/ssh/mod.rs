//! SSH session management module
//!
//! The session manager owns one lazily created, persistent SSH connection
//! and serializes command execution on it. The russh-backed implementation
//! sits behind the `Connector` / `RemoteShell` traits.

pub mod command;
pub mod config;
pub mod connection;
pub mod elevation;
pub mod handler;
pub mod sanitize;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

// Re-exports
pub use command::{CommandOutput, RemoteCommand};
pub use config::{Credential, SshConfig};
pub use connection::{RusshConnector, RusshShell};
pub use elevation::{redact, sudo_refusal, wrap_sudo_command};
pub use handler::SshHandler;
pub use sanitize::{escape_for_shell, pkill_pattern, sanitize_command, shell_quote};
pub use session::{Connector, RemoteShell, SessionLease, SessionManager, SessionState};
