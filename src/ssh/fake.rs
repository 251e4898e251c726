//! Scripted in-memory SSH host for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::command::{CommandOutput, RemoteCommand};
use super::session::{Connector, RemoteShell};
use crate::error::{Result, SshMcpError};

/// Sudo password the fake host accepts
pub(crate) const SUDO_PASSWORD: &str = "secret";

/// How the next `run` should fail
pub(crate) enum Failure {
    /// Channel could not be opened, the command never started
    NotStarted,
    /// Channel dropped while the command was running
    Dropped,
}

pub(crate) struct FakeHost {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub reject_auth: AtomicBool,
    pub overlapped: AtomicBool,
    running: AtomicBool,
    failing_connects: Mutex<usize>,
    next_failure: Mutex<Option<Failure>>,
    delay: Mutex<Duration>,
    executed: Mutex<Vec<RemoteCommand>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            reject_auth: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            running: AtomicBool::new(false),
            failing_connects: Mutex::new(0),
            next_failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_connects(&self, n: usize) {
        *self.failing_connects.lock().unwrap() = n;
    }

    pub fn fail_next_run(&self, failure: Failure) {
        *self.next_failure.lock().unwrap() = Some(failure);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Command lines that ran to completion, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.line().to_string())
            .collect()
    }

    /// Full commands (including stdin) that ran to completion
    pub fn executed_commands(&self) -> Vec<RemoteCommand> {
        self.executed.lock().unwrap().clone()
    }
}

pub(crate) struct FakeConnector {
    host: Arc<FakeHost>,
}

impl FakeConnector {
    pub fn new(host: Arc<FakeHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>> {
        self.host.connects.fetch_add(1, Ordering::SeqCst);
        {
            let mut failing = self.host.failing_connects.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(SshMcpError::connection("Connection refused"));
            }
        }
        if self.host.reject_auth.load(Ordering::SeqCst) {
            return Err(SshMcpError::auth("Password authentication rejected"));
        }
        Ok(Box::new(FakeShell {
            host: self.host.clone(),
        }))
    }

    fn target(&self) -> String {
        "test@fake:22".to_string()
    }
}

struct FakeShell {
    host: Arc<FakeHost>,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(&mut self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput> {
        if let Some(failure) = self.host.next_failure.lock().unwrap().take() {
            return Err(match failure {
                Failure::NotStarted => SshMcpError::connection("Failed to open channel"),
                Failure::Dropped => SshMcpError::disconnected("Channel closed"),
            });
        }

        if self.host.running.swap(true, Ordering::SeqCst) {
            self.host.overlapped.store(true, Ordering::SeqCst);
        }

        let delay = *self.host.delay.lock().unwrap();
        let takes = delay + sleep_duration(command.line());
        let mut result = if takes > timeout {
            tokio::time::sleep(timeout).await;
            CommandOutput {
                stdout: "partial\n".to_string(),
                timed_out: true,
                ..Default::default()
            }
        } else {
            tokio::time::sleep(takes).await;
            respond(command)
        };
        if let Some(limit) = command.output_limit() {
            result.truncated |= cap(&mut result.stdout, limit) | cap(&mut result.stderr, limit);
        }

        self.host.running.store(false, Ordering::SeqCst);
        self.host.executed.lock().unwrap().push(command.clone());
        Ok(result)
    }

    async fn close(&mut self) {
        self.host.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn cap(s: &mut String, limit: usize) -> bool {
    if s.len() <= limit {
        return false;
    }
    let mut cut = limit;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    true
}

fn sleep_duration(line: &str) -> Duration {
    line.strip_prefix("sleep ")
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_default()
}

/// What the fake remote prints for a command
fn respond(command: &RemoteCommand) -> CommandOutput {
    let line = command.line();
    let Some(inner) = sudo_inner(line) else {
        return run_shell(line, "test", command.stdin());
    };

    if line.starts_with("sudo -n") {
        return failed("sudo: a password is required\n", 1);
    }
    match command.stdin() {
        Some(input) if input.trim_end_matches('\n') == SUDO_PASSWORD => {
            // sudo consumed the password line; NOPASSWD-style hosts would not,
            // so the raw stdin is still handed on to `cat`.
            run_shell(&inner, "root", command.stdin())
        }
        _ => failed(
            "Sorry, try again.\nsudo: no password was provided\nsudo: 1 incorrect password attempt\n",
            1,
        ),
    }
}

fn sudo_inner(line: &str) -> Option<String> {
    if !line.starts_with("sudo ") {
        return None;
    }
    let start = line.find("sh -c '")? + "sh -c '".len();
    let quoted = line[start..].strip_suffix('\'')?;
    Some(quoted.replace("'\"'\"'", "'"))
}

fn run_shell(line: &str, user: &str, stdin: Option<&str>) -> CommandOutput {
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let home = if user == "root" { "/root" } else { "/home/test" };
    match word {
        "echo" => ok(format!("{}\n", unquote(rest.trim()))),
        "pwd" => ok(format!("{}\n", home)),
        "whoami" => ok(format!("{}\n", user)),
        "ls" if rest.contains("/nope") => failed(
            "ls: cannot access '/nope': No such file or directory\n",
            2,
        ),
        "ls" => ok("total 8\ndrwxr-xr-x 2 test test 4096 .\ndrwxr-xr-x 3 root root 4096 ..\n"),
        "cat" => ok(stdin.unwrap_or_default()),
        "yes" => ok("y\n".repeat(10_000)),
        "true" | "sleep" => ok(""),
        "false" => failed("", 1),
        // dies from a signal: no exit status
        "crash" => CommandOutput {
            stdout: "starting\n".to_string(),
            exit_signal: Some("KILL".to_string()),
            ..Default::default()
        },
        other => failed(&format!("sh: 1: {}: not found\n", other), 127),
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into(),
        exit_code: Some(0),
        ..Default::default()
    }
}

fn failed(stderr: &str, code: u32) -> CommandOutput {
    CommandOutput {
        stderr: stderr.to_string(),
        exit_code: Some(code),
        ..Default::default()
    }
}
