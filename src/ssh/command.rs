//! Command execution over SSH
//!
//! Provides `RemoteCommand` (what is sent), `CommandOutput` (what comes back)
//! and the exec-channel plumbing used by [`RusshShell`].

use std::time::Duration;

use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::connection::RusshShell;
use super::sanitize::{pkill_pattern, shell_quote};
use crate::error::{Result, SshMcpError};

/// Upper bound for the best-effort abort of a timed out command
const ABORT_TIMEOUT: Duration = Duration::from_secs(5);

/// A command line plus optional data for the remote process's stdin
///
/// Stdin is the side channel for secrets: it never becomes part of the
/// command line and is hidden from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    line: String,
    stdin: Option<String>,
    output_limit: Option<usize>,
    abort: Option<Box<RemoteCommand>>,
}

impl RemoteCommand {
    /// A command with nothing on stdin
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stdin: None,
            output_limit: None,
            abort: None,
        }
    }

    /// A command whose stdin receives `input` before EOF
    pub fn with_stdin(line: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            stdin: Some(input.into()),
            ..Self::new(line)
        }
    }

    /// Keep at most `limit` bytes of each output stream
    ///
    /// Data past the limit is still read (so the exit status arrives) but
    /// dropped, and the output is marked truncated.
    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = Some(limit);
        self
    }

    /// Use `abort` instead of the default `pkill -f` when this command times out
    pub fn with_abort(mut self, abort: RemoteCommand) -> Self {
        self.abort = Some(Box::new(abort));
        self
    }

    /// Command line as sent to the remote shell
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Stdin payload, if any
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn output_limit(&self) -> Option<usize> {
        self.output_limit
    }

    /// Command that kills this one after a timeout
    ///
    /// Defaults to `pkill -f` on the regex-escaped command line, bounded by
    /// `timeout 3s` and never failing.
    pub fn abort(&self) -> RemoteCommand {
        match &self.abort {
            Some(abort) => abort.as_ref().clone(),
            None => RemoteCommand::new(bounded_abort(&pkill(&self.line))),
        }
    }
}

impl std::fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("line", &self.line)
            .field("stdin", &self.stdin.as_ref().map(|_| "***"))
            .field("output_limit", &self.output_limit)
            .finish()
    }
}

/// `pkill -f` matching `command` literally
pub(crate) fn pkill(command: &str) -> String {
    format!("pkill -f {}", shell_quote(&pkill_pattern(command)))
}

/// Wrap a kill command so it gives up after three seconds and never fails
pub(crate) fn bounded_abort(kill: &str) -> String {
    format!("timeout 3s {} 2>/dev/null || true", kill)
}

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,

    /// Standard error from the command
    pub stderr: String,

    /// Exit code of the command (if available)
    pub exit_code: Option<u32>,

    /// Signal that terminated the remote process, e.g. `KILL`
    pub exit_signal: Option<String>,

    /// The command hit its deadline; stdout/stderr hold what arrived before it
    pub timed_out: bool,

    /// A stream went over the command's output limit and was cut
    pub truncated: bool,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the command succeeded (exit code 0 or no exit code available)
    pub fn success(&self) -> bool {
        !self.timed_out
            && self.exit_signal.is_none()
            && self.exit_code.is_none_or(|code| code == 0)
    }

    /// Get combined output: stdout first, then stderr if non-empty
    pub fn combined_output(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

/// Join stdout and stderr, inserting a newline only when stdout lacks one
pub(crate) fn combine(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else if stdout.ends_with('\n') {
        format!("{}{}", stdout, stderr)
    } else {
        format!("{}\n{}", stdout, stderr)
    }
}

/// Raw bytes of one output stream, decoded once the channel is done
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    limit: Option<usize>,
    overflowed: bool,
}

impl Capture {
    fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn push(&mut self, data: &[u8]) {
        let room = match self.limit {
            Some(limit) => limit.saturating_sub(self.bytes.len()),
            None => data.len(),
        };
        if data.len() > room {
            self.overflowed = true;
        }
        self.bytes.extend_from_slice(&data[..data.len().min(room)]);
    }

    /// Lossy UTF-8; a character cut by the limit is dropped, not replaced
    fn decode(mut self) -> String {
        if self.overflowed {
            if let Err(e) = std::str::from_utf8(&self.bytes) {
                if e.error_len().is_none() {
                    self.bytes.truncate(e.valid_up_to());
                }
            }
        }
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Everything read from an exec channel so far
#[derive(Debug, Default)]
struct ChannelCapture {
    stdout: Capture,
    stderr: Capture,
    exit_code: Option<u32>,
    exit_signal: Option<String>,
}

impl ChannelCapture {
    fn new(limit: Option<usize>) -> Self {
        Self {
            stdout: Capture::new(limit),
            stderr: Capture::new(limit),
            ..Self::default()
        }
    }

    fn into_output(self, timed_out: bool) -> CommandOutput {
        let truncated = self.stdout.overflowed || self.stderr.overflowed;
        CommandOutput {
            stdout: self.stdout.decode(),
            stderr: self.stderr.decode(),
            exit_code: self.exit_code,
            exit_signal: self.exit_signal,
            timed_out,
            truncated,
        }
    }
}

fn signal_name(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

impl RusshShell {
    /// Execute a command on a fresh exec channel
    ///
    /// Failures before the command is started are `Connection` errors; once
    /// the exec request is accepted, a dropped channel is `Disconnected`.
    /// A deadline hit is not an error: the partial output comes back with
    /// `timed_out` set after the remote process has been signalled.
    pub(crate) async fn exec_via_channel(
        &self,
        command: &RemoteCommand,
        timeout_duration: Duration,
    ) -> Result<CommandOutput> {
        let mut channel = self.open_channel().await?;

        channel
            .exec(true, command.line())
            .await
            .map_err(|e| SshMcpError::connection(format!("Failed to exec command: {}", e)))?;

        if let Some(input) = command.stdin() {
            channel
                .data(input.as_bytes())
                .await
                .map_err(|e| SshMcpError::disconnected(format!("Failed to write stdin: {}", e)))?;
        }
        channel
            .eof()
            .await
            .map_err(|e| SshMcpError::disconnected(format!("Failed to close stdin: {}", e)))?;

        let mut capture = ChannelCapture::new(command.output_limit());
        let finished = timeout(
            timeout_duration,
            collect_channel_output(&mut channel, &mut capture),
        )
        .await;

        match finished {
            Ok(true) => {
                let output = capture.into_output(false);
                debug!(
                    "Command completed: exit_code={:?}, exit_signal={:?}, stdout_len={}, stderr_len={}",
                    output.exit_code,
                    output.exit_signal,
                    output.stdout.len(),
                    output.stderr.len()
                );
                Ok(output)
            }
            Ok(false) if self.is_closed() => Err(SshMcpError::disconnected(
                "Connection closed during command execution",
            )),
            Ok(false) => {
                warn!("Channel ended without exit status");
                Ok(capture.into_output(false))
            }
            Err(_) => {
                warn!(
                    "Command timed out after {}ms, attempting abort",
                    timeout_duration.as_millis()
                );
                let _ = channel.signal(Sig::TERM).await;
                let _ = channel.close().await;
                self.abort_command(&command.abort()).await;
                Ok(capture.into_output(true))
            }
        }
    }

    /// Run the abort command for a timed out command on a new channel
    ///
    /// Best effort: failures are logged and the wait is capped at five seconds.
    async fn abort_command(&self, abort: &RemoteCommand) {
        let channel = match self.open_channel().await {
            Ok(ch) => ch,
            Err(e) => {
                error!("Failed to open channel for abort: {}", e);
                return;
            }
        };

        if let Err(e) = channel.exec(true, abort.line()).await {
            error!("Failed to exec abort command: {}", e);
            return;
        }
        if let Some(input) = abort.stdin() {
            if let Err(e) = channel.data(input.as_bytes()).await {
                error!("Failed to write abort stdin: {}", e);
                return;
            }
        }
        let _ = channel.eof().await;

        let _ = timeout(ABORT_TIMEOUT, async {
            let mut channel = channel;
            while let Some(msg) = channel.wait().await {
                if matches!(msg, ChannelMsg::Close) {
                    break;
                }
            }
        })
        .await;

        debug!("Abort command completed");
    }
}

/// Collect output from a channel until it closes
///
/// Returns whether an exit status (or exit signal) was seen. The exit status
/// may arrive after EOF, so only `Close` (or the end of the message stream)
/// stops collection.
async fn collect_channel_output(channel: &mut Channel<Msg>, capture: &mut ChannelCapture) -> bool {
    let mut exited = false;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => capture.stdout.push(&data),
            ChannelMsg::ExtendedData { data, ext } => {
                // ext == 1 is SSH_EXTENDED_DATA_STDERR
                if ext == 1 {
                    capture.stderr.push(&data);
                } else {
                    capture.stdout.push(&data);
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                capture.exit_code = Some(exit_status);
                exited = true;
            }
            ChannelMsg::ExitSignal { signal_name: signal, .. } => {
                debug!("Remote process killed by signal {:?}", signal);
                capture.exit_signal = Some(signal_name(&signal));
                exited = true;
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    exited
}
