//! Configuration and CLI argument parsing

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, SshMcpError};

/// Default timeout for command execution in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000; // 60 seconds

/// Default max characters for the command text (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = Some(1000);

/// Default cap on the combined stdout/stderr returned to the caller, in bytes
pub const DEFAULT_MAX_OUTPUT: usize = 64 * 1024;

/// Connection timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// CLI arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ssh-exec-mcp")]
#[command(version)]
#[command(about = "Stdio MCP server that runs commands on one remote host over SSH")]
pub struct Args {
    /// SSH host to connect to
    #[arg(long, env = "SSH_MCP_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, default_value = "22", env = "SSH_MCP_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, env = "SSH_MCP_USER")]
    pub user: String,

    /// SSH password (alternative to key)
    #[arg(long, env = "SSH_MCP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to SSH private key file (alternative to password)
    #[arg(long, env = "SSH_MCP_KEY")]
    pub key: Option<PathBuf>,

    /// Command execution timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, env = "SSH_MCP_TIMEOUT")]
    pub timeout: u64,

    /// Maximum characters for command length.
    /// Use "none", "0", or negative value to disable limit.
    /// Default: 1000
    #[arg(long = "maxChars", env = "SSH_MCP_MAX_CHARS", allow_hyphen_values = true)]
    pub max_chars: Option<String>,

    /// Maximum bytes of combined output returned per call
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT, env = "SSH_MCP_MAX_OUTPUT")]
    pub max_output: usize,

    /// Disable the sudo-exec tool
    #[arg(long, default_value = "false", env = "SSH_MCP_DISABLE_SUDO")]
    pub disable_sudo: bool,

    /// Accepted and ignored: the sudo password is a sudo-exec argument now
    #[arg(long = "sudoPassword", hide = true)]
    pub legacy_sudo_password: Option<String>,

    /// Accepted and ignored: there is no su-based elevation
    #[arg(long = "suPassword", hide = true)]
    pub legacy_su_password: Option<String>,
}

/// Parsed and validated configuration
#[derive(Clone)]
pub struct Config {
    /// SSH host
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH username
    pub user: String,

    /// SSH password
    pub password: Option<String>,

    /// Path to SSH private key
    pub key: Option<PathBuf>,

    /// Command timeout in milliseconds
    pub timeout_ms: u64,

    /// Maximum command length (None = unlimited)
    pub max_chars: Option<usize>,

    /// Maximum combined output size in bytes
    pub max_output: usize,

    /// Whether sudo-exec tool is disabled
    pub disable_sudo: bool,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        if args.legacy_sudo_password.is_some() {
            warn!("--sudoPassword is ignored; pass sudoPassword to the sudo-exec tool");
        }
        if args.legacy_su_password.is_some() {
            warn!("--suPassword is ignored; use the sudo-exec tool");
        }

        let max_chars = parse_max_chars(args.max_chars.as_deref());

        Ok(Config {
            host: args.host,
            port: args.port,
            user: args.user,
            password: sanitize_password(args.password),
            key: args.key,
            timeout_ms: args.timeout,
            max_chars,
            max_output: args.max_output,
            disable_sudo: args.disable_sudo,
        })
    }

    /// Per-command timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_chars", &self.max_chars)
            .field("max_output", &self.max_output)
            .field("disable_sudo", &self.disable_sudo)
            .finish()
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    if args.host.is_empty() {
        errors.push("Missing required --host".to_string());
    }

    if args.user.is_empty() {
        errors.push("Missing required --user".to_string());
    }

    // Must have either password or key
    if sanitize_password(args.password.clone()).is_none() && args.key.is_none() {
        errors.push("Must provide either --password or --key".to_string());
    }

    if let Some(ref key_path) = args.key {
        if !key_path.exists() {
            errors.push(format!("SSH key file not found: {}", key_path.display()));
        }
    }

    if args.timeout == 0 {
        errors.push("--timeout must be greater than 0".to_string());
    }

    if args.max_output == 0 {
        errors.push("--max-output must be greater than 0".to_string());
    }

    if !errors.is_empty() {
        return Err(SshMcpError::Config(errors.join("\n")));
    }

    Ok(())
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) → DEFAULT_MAX_CHARS
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    match value {
        None => DEFAULT_MAX_CHARS,
        Some(s) => {
            if s.eq_ignore_ascii_case("none") {
                return None;
            }

            match s.trim().parse::<i64>() {
                Ok(n) if n <= 0 => None,
                Ok(n) => Some(n as usize),
                Err(_) => DEFAULT_MAX_CHARS,
            }
        }
    }
}

/// Sanitize password: return None if empty
fn sanitize_password(password: Option<String>) -> Option<String> {
    password.filter(|p| !p.is_empty())
}
