//! Privilege elevation via `sudo`
//!
//! The sudo password travels on the remote process's stdin, never on the
//! command line, and is scrubbed from anything read back.

use super::command::{bounded_abort, pkill, CommandOutput, RemoteCommand};
use super::sanitize::shell_quote;

/// Replacement text for a scrubbed secret
const MASK: &str = "[REDACTED]";

/// Lowercased stderr fragments sudo prints when it refuses to elevate
const SUDO_REFUSALS: &[&str] = &[
    "sorry, try again",
    "incorrect password attempt",
    "a password is required",
    "no password was provided",
    "is not in the sudoers file",
    "is not allowed to execute",
    "a terminal is required",
    "no tty present",
];

/// Wraps a command for execution with sudo privileges.
///
/// - empty password: `sudo -n` (passwordless sudo, fails instead of prompting)
/// - otherwise: `sudo -k -S -p ''` with the password written to stdin. `-k`
///   makes sudo read the password even when credentials are cached, so the
///   password line is not left over for the command itself.
///
/// On timeout the command is killed with `pkill -f` through the same sudo
/// invocation, matching the command itself rather than the sudo line.
///
/// # Examples
///
/// ```
/// use ssh_exec_mcp::ssh::elevation::wrap_sudo_command;
///
/// let cmd = wrap_sudo_command("apt update", "");
/// assert_eq!(cmd.line(), "sudo -n -- sh -c 'apt update'");
/// assert_eq!(cmd.stdin(), None);
///
/// let cmd = wrap_sudo_command("apt update", "mypassword");
/// assert_eq!(cmd.line(), "sudo -k -S -p '' -- sh -c 'apt update'");
/// assert!(!cmd.line().contains("mypassword"));
/// assert_eq!(cmd.stdin(), Some("mypassword\n"));
/// ```
pub fn wrap_sudo_command(command: &str, password: &str) -> RemoteCommand {
    let abort = sudo(&bounded_abort(&sudo_line(&pkill(command), password)), password);
    sudo(
        &sudo_line(&format!("sh -c {}", shell_quote(command)), password),
        password,
    )
    .with_abort(abort)
}

/// `argv` run through sudo, prompting with `password` unless it is empty
fn sudo_line(argv: &str, password: &str) -> String {
    if password.is_empty() {
        format!("sudo -n -- {}", argv)
    } else {
        format!("sudo -k -S -p '' -- {}", argv)
    }
}

fn sudo(line: &str, password: &str) -> RemoteCommand {
    if password.is_empty() {
        RemoteCommand::new(line)
    } else {
        RemoteCommand::with_stdin(line, format!("{}\n", password))
    }
}

/// If sudo itself refused to run the command, return its complaint
///
/// sudo exits with status 1 when it refuses; the command's own failures are
/// left alone.
pub fn sudo_refusal(output: &CommandOutput) -> Option<String> {
    if output.timed_out || output.exit_code != Some(1) {
        return None;
    }

    let stderr = output.stderr.to_lowercase();
    if SUDO_REFUSALS.iter().any(|marker| stderr.contains(marker)) {
        let reason = output
            .stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("sudo refused to run the command")
            .trim()
            .to_string();
        Some(reason)
    } else {
        None
    }
}

/// Remove every occurrence of `secret` from `text`
///
/// Repeats until no occurrence is left, so replacements cannot splice a new
/// occurrence together.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() || !text.contains(secret) {
        return text.to_string();
    }

    let mask = if MASK.contains(secret) { "" } else { MASK };
    let mut out = text.replace(secret, mask);
    for _ in 0..4 {
        if !out.contains(secret) {
            return out;
        }
        out = out.replace(secret, mask);
    }
    while out.contains(secret) {
        out = out.replace(secret, "");
    }
    out
}
