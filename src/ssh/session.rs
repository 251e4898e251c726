//! SSH Session Manager
//!
//! Owns the single remote session of the server process. Callers go through
//! `acquire()` → [`SessionLease::run`] → `release()`; the lease holds the
//! session lock, so at most one command is in flight and waiting callers are
//! served in the order they asked (tokio's mutex is fair).
//!
//! State machine:
//!
//! ```text
//! Disconnected --acquire--> Connecting --auth ok--> Ready
//!                               |                     |
//!                               +--auth rejected--> Broken (terminal)
//! Ready --transient failure--> one reconnect --> Ready | Disconnected | Broken
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::command::{CommandOutput, RemoteCommand};
use crate::error::{Result, SshMcpError};

/// Something that can produce an authenticated remote shell
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial and authenticate. Credential rejection must be reported as
    /// `Authentication` (or `SshKey`), anything else as `Connection`.
    async fn connect(&self) -> Result<Box<dyn RemoteShell>>;

    /// `user@host:port` of the target, for logs
    fn target(&self) -> String;
}

/// An authenticated remote shell able to run one command at a time
#[async_trait]
pub trait RemoteShell: Send {
    /// Run `command`, waiting for completion or `timeout`
    ///
    /// A timeout is reported through `CommandOutput::timed_out`, not as an
    /// error. `Connection` means the command never started, `Disconnected`
    /// means it was started and the channel went away.
    async fn run(&mut self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput>;

    /// Close the underlying connection
    async fn close(&mut self);
}

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; the next `acquire()` dials
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Authenticated and usable
    Ready,
    /// Credentials were rejected; never retried
    Broken,
}

struct Slot {
    state: SessionState,
    shell: Option<Box<dyn RemoteShell>>,
    auth_failure: Option<String>,
    closed: bool,
}

/// Manages the one SSH session of the process
pub struct SessionManager {
    connector: Box<dyn Connector>,
    slot: Mutex<Slot>,
}

impl SessionManager {
    /// Create a manager; the connection is made lazily on first `acquire()`
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            slot: Mutex::new(Slot {
                state: SessionState::Disconnected,
                shell: None,
                auth_failure: None,
                closed: false,
            }),
        }
    }

    /// Current state; waits for any in-flight command
    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    /// Wait for exclusive use of the session and make sure it is Ready
    pub async fn acquire(&self) -> Result<SessionLease<'_>> {
        let mut slot = self.slot.lock().await;

        if slot.closed {
            return Err(SshMcpError::connection("SSH session has been shut down"));
        }

        let state = slot.state;
        match state {
            SessionState::Ready if slot.shell.is_some() => {}
            SessionState::Broken => {
                let reason = slot
                    .auth_failure
                    .clone()
                    .unwrap_or_else(|| "credentials rejected".to_string());
                debug!("Session is broken, failing fast");
                return Err(SshMcpError::Authentication(reason));
            }
            _ => self.connect_locked(&mut slot).await?,
        }

        Ok(SessionLease {
            manager: self,
            slot,
        })
    }

    /// Hand the session back; the connection stays open for the next call
    pub fn release(&self, lease: SessionLease<'_>) {
        drop(lease);
    }

    /// Wait for the in-flight command (if any), then close the connection
    ///
    /// Later `acquire()` calls fail.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut shell) = slot.shell.take() {
            shell.close().await;
        }
        if slot.state != SessionState::Broken {
            slot.state = SessionState::Disconnected;
        }
        slot.closed = true;
        info!("SSH session to {} closed", self.connector.target());
    }

    async fn connect_locked(&self, slot: &mut Slot) -> Result<()> {
        slot.state = SessionState::Connecting;

        match self.connector.connect().await {
            Ok(shell) => {
                slot.shell = Some(shell);
                slot.state = SessionState::Ready;
                info!("SSH session to {} is ready", self.connector.target());
                Ok(())
            }
            Err(SshMcpError::Authentication(reason) | SshMcpError::SshKey(reason)) => {
                warn!("SSH authentication failed, session marked broken: {}", reason);
                slot.state = SessionState::Broken;
                slot.auth_failure = Some(reason.clone());
                Err(SshMcpError::Authentication(reason))
            }
            Err(e) => {
                slot.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("target", &self.connector.target())
            .finish()
    }
}

/// Exclusive, Ready access to the session
pub struct SessionLease<'a> {
    manager: &'a SessionManager,
    slot: MutexGuard<'a, Slot>,
}

impl std::fmt::Debug for SessionLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("target", &self.manager.connector.target())
            .field("state", &self.slot.state)
            .finish()
    }
}

impl SessionLease<'_> {
    /// Run a command on the session
    ///
    /// A transient failure triggers exactly one reconnect. The command is
    /// replayed on the new connection only if it never started; if the
    /// channel dropped mid-command the error is surfaced after reconnecting.
    pub async fn run(&mut self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput> {
        let first = self.run_once(command, timeout).await;

        let err = match first {
            Err(e) if e.is_transient() => e,
            other => return other,
        };

        warn!("SSH session failed ({}), reconnecting once", err);
        self.drop_shell().await;
        self.manager.connect_locked(&mut self.slot).await?;

        if matches!(err, SshMcpError::Disconnected(_)) {
            return Err(err);
        }

        let second = self.run_once(command, timeout).await;
        if let Err(ref e) = second {
            if e.is_transient() {
                self.drop_shell().await;
            }
        }
        second
    }

    async fn run_once(&mut self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput> {
        let shell = self
            .slot
            .shell
            .as_mut()
            .ok_or_else(|| SshMcpError::connection("SSH session is not ready"))?;
        shell.run(command, timeout).await
    }

    async fn drop_shell(&mut self) {
        if let Some(mut shell) = self.slot.shell.take() {
            shell.close().await;
        }
        self.slot.state = SessionState::Disconnected;
    }
}
