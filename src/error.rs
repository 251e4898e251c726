//! Error types for the SSH exec MCP server

use thiserror::Error;

/// JSON-RPC error codes used on the wire
pub mod codes {
    /// Frame was JSON but not a valid request envelope
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method is not served
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Unknown tool or missing/ill-typed argument
    pub const INVALID_PARAMS: i32 = -32602;
    /// Anything without a dedicated code
    pub const INTERNAL_ERROR: i32 = -32603;
    /// SSH credential rejected
    pub const AUTHENTICATION_FAILED: i32 = -32001;
    /// SSH connection could not be established or dropped mid-call
    pub const CONNECTION_FAILED: i32 = -32002;
    /// Remote sudo refused to elevate
    pub const ELEVATION_FAILED: i32 = -32003;
}

/// Main error type for the server
#[derive(Debug, Error)]
pub enum SshMcpError {
    /// SSH connection failed before the command was started
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// SSH channel dropped after the command was started
    #[error("SSH channel dropped: {0}")]
    Disconnected(String),

    /// SSH authentication failed (password or key)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Command execution timed out
    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// sudo elevation failed
    #[error("Elevation failed: {0}")]
    ElevationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed protocol frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH key parsing error
    #[error("SSH key error: {0}")]
    SshKey(String),
}

/// Result type alias using SshMcpError
pub type Result<T> = std::result::Result<T, SshMcpError>;

impl SshMcpError {
    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        SshMcpError::Connection(msg.into())
    }

    /// Create a mid-command disconnect error from a string
    pub fn disconnected(msg: impl Into<String>) -> Self {
        SshMcpError::Disconnected(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        SshMcpError::Authentication(msg.into())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        SshMcpError::InvalidParams(msg.into())
    }

    /// Create an elevation failed error from a string
    pub fn elevation_failed(msg: impl Into<String>) -> Self {
        SshMcpError::ElevationFailed(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        SshMcpError::Config(msg.into())
    }

    /// Create a protocol error from a string
    pub fn protocol(msg: impl Into<String>) -> Self {
        SshMcpError::Protocol(msg.into())
    }

    /// JSON-RPC error code this error is reported with
    pub fn rpc_code(&self) -> i32 {
        match self {
            SshMcpError::InvalidParams(_) => codes::INVALID_PARAMS,
            SshMcpError::Authentication(_) | SshMcpError::SshKey(_) => codes::AUTHENTICATION_FAILED,
            SshMcpError::Connection(_) | SshMcpError::Disconnected(_) => codes::CONNECTION_FAILED,
            SshMcpError::ElevationFailed(_) => codes::ELEVATION_FAILED,
            SshMcpError::Protocol(_) => codes::INVALID_REQUEST,
            SshMcpError::Timeout(_) | SshMcpError::Config(_) | SshMcpError::Io(_) => {
                codes::INTERNAL_ERROR
            }
        }
    }

    /// Whether the session should be reconnected after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SshMcpError::Connection(_) | SshMcpError::Disconnected(_) | SshMcpError::Io(_)
        )
    }
}
