//! Command Executor
//!
//! Runs one validated [`ToolCall`] through the session manager and shapes
//! the output into a [`CommandResult`]. Per call:
//! `Idle -> Running -> {Completed | TimedOut | Failed} -> Idle`, where
//! Failed is a session/channel failure (returned as `Err`) and a non-zero
//! exit is still Completed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SshMcpError};
use crate::ssh::command::combine;
use crate::ssh::{redact, sanitize_command, sudo_refusal, wrap_sudo_command, RemoteCommand};
use crate::ssh::{CommandOutput, SessionManager};
use crate::tools::ToolCall;

/// Outcome of a command that ran (or started and timed out)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    #[serde(skip)]
    pub stdout: String,
    #[serde(skip)]
    pub stderr: String,
    pub exit_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_signal: Option<String>,
    pub timed_out: bool,
    pub truncated: bool,
}

impl CommandResult {
    /// Whether the caller should treat the call as failed
    pub fn is_error(&self) -> bool {
        self.timed_out
            || self.exit_signal.is_some()
            || self.exit_code.is_some_and(|code| code != 0)
    }

    /// Text returned to the caller: stdout, then stderr, then status notes
    pub fn render(&self) -> String {
        let mut text = combine(&self.stdout, &self.stderr);
        if self.truncated {
            push_note(&mut text, "[output truncated]");
        }
        if self.timed_out {
            push_note(&mut text, "[command timed out]");
        } else if let Some(signal) = &self.exit_signal {
            push_note(&mut text, &format!("[terminated by signal {}]", signal));
        }
        text
    }
}

fn push_note(text: &mut String, note: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(note);
}

/// Limits applied to every call
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    /// Per-command deadline
    pub timeout: Duration,
    /// Maximum command length in characters (None = unlimited)
    pub max_chars: Option<usize>,
    /// Maximum combined output in bytes
    pub max_output: usize,
}

/// Runs tool calls against the shared session
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    session: Arc<SessionManager>,
    limits: ExecLimits,
}

impl CommandExecutor {
    pub fn new(session: Arc<SessionManager>, limits: ExecLimits) -> Self {
        Self { session, limits }
    }

    /// The session this executor runs on
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Execute a validated call
    ///
    /// Non-zero exits and timeouts come back as `Ok`; `Err` is reserved for
    /// invalid commands, session failures and sudo refusing to elevate.
    pub async fn execute(&self, call: &ToolCall) -> Result<CommandResult> {
        let command = sanitize_command(call.command(), self.limits.max_chars)?;
        debug!("{} tool called with command: {}", call.kind().name(), command);

        let remote = match call {
            ToolCall::Exec(_) => RemoteCommand::new(command),
            ToolCall::SudoExec(params) => wrap_sudo_command(command, &params.sudo_password),
        };
        // One whole secret fits past the cap
        let secret_len = call.secret().map_or(0, str::len);
        let remote = remote.with_output_limit(self.limits.max_output + secret_len);

        let mut lease = self.session.acquire().await?;
        let output = lease.run(&remote, self.limits.timeout).await;
        self.session.release(lease);

        let mut output = output?;
        if let Some(secret) = call.secret() {
            if output.truncated {
                strip_partial_secret(&mut output.stdout, secret);
                strip_partial_secret(&mut output.stderr, secret);
            }
            output.stdout = redact(&output.stdout, secret);
            output.stderr = redact(&output.stderr, secret);
        }

        if let ToolCall::SudoExec(_) = call {
            if let Some(reason) = sudo_refusal(&output) {
                warn!("sudo refused to elevate: {}", reason);
                return Err(SshMcpError::elevation_failed(reason));
            }
        }

        if output.timed_out {
            info!(
                "Command timed out after {}ms",
                self.limits.timeout.as_millis()
            );
        }

        Ok(shape(output, self.limits.max_output))
    }
}

/// Apply the output cap: stdout keeps priority, stderr gets what is left
fn shape(output: CommandOutput, max_output: usize) -> CommandResult {
    let CommandOutput {
        mut stdout,
        mut stderr,
        exit_code,
        exit_signal,
        timed_out,
        truncated,
    } = output;

    let mut truncated = truncated | truncate_at_boundary(&mut stdout, max_output);
    let remaining = max_output.saturating_sub(stdout.len());
    truncated |= truncate_at_boundary(&mut stderr, remaining);

    CommandResult {
        stdout,
        stderr,
        exit_code,
        exit_signal,
        timed_out,
        truncated,
    }
}

/// Drop a trailing proper prefix of `secret` left by the output limit
fn strip_partial_secret(text: &mut String, secret: &str) {
    let cuts = secret.char_indices().map(|(i, _)| i).skip(1);
    for end in cuts.rev() {
        if text.ends_with(&secret[..end]) {
            text.truncate(text.len() - end);
            return;
        }
    }
}

/// Truncate to at most `max` bytes without splitting a character
fn truncate_at_boundary(s: &mut String, max: usize) -> bool {
    if s.len() <= max {
        return false;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    true
}
