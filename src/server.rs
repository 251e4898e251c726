//! MCP Server implementation
//!
//! This module provides the RPC Dispatcher: it routes decoded JSON-RPC
//! messages to the tool registry and the command executor, and runs the
//! stdio serve loop.
//!
//! Tool calls are validated on the read loop and then queued to a single
//! worker, so they reach the SSH session in arrival order while the loop
//! keeps reading. Responses are written as soon as each call finishes.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, SshMcpError};
use crate::executor::{CommandExecutor, CommandResult, ExecLimits};
use crate::rpc::{FrameWriter, Incoming, LineFramer, RpcError, RpcRequest, RpcResponse};
use crate::ssh::{redact, Connector, RusshConnector, SessionManager, SshConfig};
use crate::tools::{ToolCall, ToolRegistry};

/// Protocol versions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// `tools/call` parameters
#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// What the read loop does with one frame
enum Dispatch {
    /// Answer right away
    Reply(RpcResponse),
    /// Nothing to send back
    Silent,
    /// A validated tool call for the executor
    Call { id: Value, call: ToolCall },
}

/// A queued tool call and where its outcome goes
struct Job {
    call: ToolCall,
    reply: oneshot::Sender<Result<CommandResult>>,
}

/// SSH MCP Server
///
/// Cheap to clone; clones share the registry and the SSH session.
#[derive(Clone)]
pub struct SshMcpServer {
    instructions: Arc<str>,
    registry: Arc<ToolRegistry>,
    executor: CommandExecutor,
}

impl SshMcpServer {
    /// Create a server that talks to the configured host over russh
    ///
    /// The key file is read here; the connection itself is not established
    /// until a tool is actually used.
    pub async fn new(config: Config) -> Result<Self> {
        let mut ssh_config = SshConfig::new(&config.host, &config.user).with_port(config.port);

        if let Some(ref password) = config.password {
            ssh_config = ssh_config.with_password(password);
        }

        if let Some(ref key_path) = config.key {
            let key_content = tokio::fs::read_to_string(key_path).await.map_err(|e| {
                SshMcpError::config(format!(
                    "Failed to read private key {}: {}",
                    key_path.display(),
                    e
                ))
            })?;
            ssh_config = ssh_config.with_private_key(key_content);
        }

        Ok(Self::with_connector(&config, RusshConnector::new(ssh_config)))
    }

    /// Create a server on top of an arbitrary connector
    pub fn with_connector(config: &Config, connector: impl Connector + 'static) -> Self {
        let session = Arc::new(SessionManager::new(connector));
        let limits = ExecLimits {
            timeout: config.timeout(),
            max_chars: config.max_chars,
            max_output: config.max_output,
        };

        let instructions = format!(
            "SSH MCP Server v{} - Execute commands on {}@{}:{}",
            env!("CARGO_PKG_VERSION"),
            config.user,
            config.host,
            config.port,
        );

        Self {
            instructions: instructions.into(),
            registry: Arc::new(ToolRegistry::new(!config.disable_sudo)),
            executor: CommandExecutor::new(session, limits),
        }
    }

    /// The tool registry this server exposes
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Close the server and cleanup resources
    ///
    /// Waits for an in-flight command before closing the SSH session.
    pub async fn shutdown(&self) {
        info!("Shutting down SSH MCP Server...");
        self.executor.session().close().await;
    }

    /// Handle one frame and return the response to send, if any
    ///
    /// Tool calls run inline here; `serve` queues them instead.
    pub async fn handle_frame(&self, frame: &[u8]) -> Option<RpcResponse> {
        match self.route(frame) {
            Dispatch::Reply(response) => Some(response),
            Dispatch::Silent => None,
            Dispatch::Call { id, call } => {
                let result = self.executor.execute(&call).await;
                Some(tool_response(id, result, call.secret()))
            }
        }
    }

    /// Serve JSON-RPC over `reader` / `writer` until end of input or `shutdown`
    ///
    /// Queued calls are drained and their responses written before the SSH
    /// session is closed.
    pub async fn serve<R, W, S>(&self, reader: R, writer: W, shutdown: S) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let writer = Arc::new(FrameWriter::new(writer));
        let mut framer = LineFramer::new(reader);

        let (queue, jobs) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_queue(self.executor.clone(), jobs));
        let mut responders = JoinSet::new();

        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, draining in-flight calls");
                    break Ok(());
                }
                frame = framer.next_frame() => {
                    let frame = match frame {
                        Ok(Some(frame)) => frame,
                        Ok(None) => {
                            info!("Input closed");
                            break Ok(());
                        }
                        Err(e) => {
                            error!("Failed to read from input: {}", e);
                            break Err(SshMcpError::Io(e));
                        }
                    };

                    match self.route(&frame) {
                        Dispatch::Reply(response) => send(&writer, &response).await,
                        Dispatch::Silent => {}
                        Dispatch::Call { id, call } => {
                            let secret = call.secret().map(str::to_owned);
                            let (reply, pending) = oneshot::channel();
                            if queue.send(Job { call, reply }).is_err() {
                                error!("Command queue is gone");
                            }

                            let writer = writer.clone();
                            responders.spawn(async move {
                                let result = pending.await.unwrap_or_else(|_| {
                                    Err(SshMcpError::protocol("Call was dropped before it ran"))
                                });
                                send(&writer, &tool_response(id, result, secret.as_deref())).await;
                            });
                        }
                    }
                }
                Some(joined) = responders.join_next(), if !responders.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Response task failed: {}", e);
                    }
                }
            }
        };

        drop(queue);
        if let Err(e) = worker.await {
            warn!("Command worker failed: {}", e);
        }
        while let Some(joined) = responders.join_next().await {
            if let Err(e) = joined {
                warn!("Response task failed: {}", e);
            }
        }

        self.shutdown().await;
        outcome
    }

    fn route(&self, frame: &[u8]) -> Dispatch {
        let incoming = match Incoming::parse(frame) {
            Ok(incoming) => incoming,
            Err(e) => {
                debug!("Dropping undecodable line: {}", e);
                return Dispatch::Silent;
            }
        };

        match incoming {
            Incoming::Request(request) => self.route_request(request),
            Incoming::Notification { method } => {
                debug!("Received notification: {}", method);
                Dispatch::Silent
            }
            Incoming::Response => {
                debug!("Ignoring response from client");
                Dispatch::Silent
            }
            Incoming::Invalid { id: Some(id), reason } => {
                debug!("Invalid request: {}", reason);
                Dispatch::Reply(RpcResponse::error(id, RpcError::invalid_request(reason)))
            }
            Incoming::Invalid { id: None, reason } => {
                debug!("Dropping invalid message without id: {}", reason);
                Dispatch::Silent
            }
        }
    }

    fn route_request(&self, request: RpcRequest) -> Dispatch {
        let RpcRequest { id, method, params } = request;
        debug!("{} called", method);

        let outcome = match method.as_str() {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.descriptors() })),
            "tools/call" => match self.prepare_call(params) {
                Ok(call) => return Dispatch::Call { id, call },
                Err(e) => {
                    debug!("Rejected tools/call: {}", e);
                    Err(RpcError::from(&e))
                }
            },
            other => Err(RpcError::method_not_found(other)),
        };

        Dispatch::Reply(match outcome {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::error(id, error),
        })
    }

    fn initialize(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        json!({
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": &*self.instructions,
        })
    }

    fn prepare_call(&self, params: Value) -> Result<ToolCall> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| SshMcpError::invalid_params(format!("Invalid tools/call params: {}", e)))?;
        self.registry.validate(&params.name, params.arguments)
    }
}

/// Run queued calls one after another until the queue closes
async fn run_queue(executor: CommandExecutor, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let result = executor.execute(&job.call).await;
        if job.reply.send(result).is_err() {
            debug!("Caller went away before the result was ready");
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &FrameWriter<W>, response: &RpcResponse) {
    if let Err(e) = writer.send(response).await {
        error!("Failed to write response: {}", e);
    }
}

/// Wrap an executor outcome into the `tools/call` response
fn tool_response(id: Value, result: Result<CommandResult>, secret: Option<&str>) -> RpcResponse {
    match result {
        Ok(result) => {
            let text = match secret {
                Some(secret) => redact(&result.render(), secret),
                None => result.render(),
            };
            RpcResponse::success(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": result.is_error(),
                    "structuredContent": result,
                }),
            )
        }
        Err(e) => {
            error!("Command execution failed: {}", e);
            let mut error = RpcError::from(&e);
            if let Some(secret) = secret {
                error.message = redact(&error.message, secret);
            }
            RpcResponse::error(id, error)
        }
    }
}
