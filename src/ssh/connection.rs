//! russh-backed connector and remote shell
//!
//! [`RusshConnector`] opens and authenticates one SSH connection per
//! `connect()`; [`RusshShell`] runs each command on its own exec channel of
//! that connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{decode_secret_key, PrivateKeyWithHashAlg};
use russh::Channel;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::command::{CommandOutput, RemoteCommand};
use super::config::{Credential, SshConfig};
use super::handler::SshHandler;
use super::session::{Connector, RemoteShell};
use crate::config::CONNECTION_TIMEOUT_SECS;
use crate::error::{Result, SshMcpError};

/// Opens authenticated SSH connections to the configured target
pub struct RusshConnector {
    config: SshConfig,
    connect_timeout: Duration,
}

impl RusshConnector {
    /// Create a connector; nothing is dialled until `connect()`
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Override the 30 second connection timeout
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Offer each configured credential in turn until one is accepted
    async fn authenticate(&self, session: &mut Handle<SshHandler>) -> Result<()> {
        let username = &self.config.username;
        let mut tried = Vec::new();

        for credential in self.config.credentials() {
            debug!(
                "Attempting {} authentication for user '{}'",
                credential.method(),
                username
            );

            let auth_result = match credential {
                Credential::Password(password) => session
                    .authenticate_password(username, password)
                    .await
                    .map_err(|e| SshMcpError::connection(e.to_string()))?,
                Credential::PrivateKey(key_content) => {
                    let key = decode_secret_key(key_content, None).map_err(|e| {
                        SshMcpError::SshKey(format!("Failed to parse private key: {}", e))
                    })?;
                    let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);
                    session
                        .authenticate_publickey(username, key_with_alg)
                        .await
                        .map_err(|e| SshMcpError::connection(e.to_string()))?
                }
            };

            if auth_result.success() {
                info!("{} authentication successful", credential.method());
                return Ok(());
            }
            tried.push(credential.method());
        }

        if tried.is_empty() {
            return Err(SshMcpError::auth(
                "No authentication method available (require password or private key)",
            ));
        }
        Err(SshMcpError::auth(format!(
            "Server rejected {} authentication for '{}'",
            tried.join(", "),
            username
        )))
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>> {
        info!("Connecting to SSH server {}...", self.config.target());

        let ssh_config = Arc::new(client::Config::default());
        let addr = (self.config.host.as_str(), self.config.port);

        let mut session = match timeout(
            self.connect_timeout,
            client::connect(ssh_config, addr, SshHandler::new()),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                error!("SSH connection failed: {}", e);
                return Err(SshMcpError::connection(e.to_string()));
            }
            Err(_) => {
                error!(
                    "SSH connection timeout after {}s",
                    self.connect_timeout.as_secs()
                );
                return Err(SshMcpError::connection(format!(
                    "Connection timeout after {}s",
                    self.connect_timeout.as_secs()
                )));
            }
        };

        self.authenticate(&mut session).await?;

        info!("Successfully connected to {}", self.config.target());

        Ok(Box::new(RusshShell { handle: session }))
    }

    fn target(&self) -> String {
        self.config.target()
    }
}

/// An authenticated SSH connection
pub struct RusshShell {
    handle: Handle<SshHandler>,
}

impl RusshShell {
    /// Open a new session channel
    pub(crate) async fn open_channel(&self) -> Result<Channel<client::Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| SshMcpError::connection(format!("Failed to open channel: {}", e)))
    }

    /// Whether the underlying transport has gone away
    pub(crate) fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

#[async_trait]
impl RemoteShell for RusshShell {
    async fn run(&mut self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput> {
        if self.is_closed() {
            return Err(SshMcpError::connection("SSH connection is closed"));
        }
        self.exec_via_channel(command, timeout).await
    }

    async fn close(&mut self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
        info!("SSH connection closed");
    }
}

impl std::fmt::Debug for RusshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshConnector")
            .field("config", &self.config)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
