//! JSON-RPC 2.0 envelope types
//!
//! Incoming frames are classified leniently: anything that is not JSON is
//! dropped, a malformed envelope is answered only when it carries an `id`
//! we can echo.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{codes, SshMcpError};

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// A request the caller expects an answer to
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Caller-chosen id, echoed verbatim in the response
    pub id: Value,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response: exactly one of `result` / `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, reason)
    }
}

impl From<&SshMcpError> for RpcError {
    fn from(err: &SshMcpError) -> Self {
        Self::new(err.rpc_code(), err.to_string())
    }
}

/// What a decoded frame turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A request with an id
    Request(RpcRequest),
    /// A request without an id; never answered
    Notification { method: String },
    /// A response from the client; nothing to do
    Response,
    /// JSON, but not a usable envelope
    Invalid { id: Option<Value>, reason: String },
}

impl Incoming {
    /// Decode one frame; `Err` means the bytes were not JSON at all
    pub fn parse(frame: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(frame)?;
        Ok(Self::classify(value))
    }

    fn classify(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return Incoming::Invalid {
                id: None,
                reason: "Message must be a JSON object".to_string(),
            };
        };

        let id = take_id(&mut obj);

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Incoming::Invalid {
                id,
                reason: "Missing or unsupported jsonrpc version".to_string(),
            };
        }

        match obj.remove("method") {
            Some(Value::String(method)) => match id {
                Some(id) => Incoming::Request(RpcRequest {
                    id,
                    method,
                    params: obj.remove("params").unwrap_or(Value::Null),
                }),
                None => Incoming::Notification { method },
            },
            Some(_) => Incoming::Invalid {
                id,
                reason: "Method must be a string".to_string(),
            },
            None if obj.contains_key("result") || obj.contains_key("error") => Incoming::Response,
            None => Incoming::Invalid {
                id,
                reason: "Missing method".to_string(),
            },
        }
    }
}

/// Ids we can echo: strings and numbers
fn take_id(obj: &mut Map<String, Value>) -> Option<Value> {
    match obj.remove("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
        _ => None,
    }
}
