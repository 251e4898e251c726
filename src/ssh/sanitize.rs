//! Command validation and shell quoting utilities
//!
//! Provides functions for validating and escaping commands before SSH execution.

use crate::error::{Result, SshMcpError};

/// Validate a command before execution
///
/// The command is returned unchanged: it reaches the remote shell verbatim.
/// Rejected when:
/// - it is empty or whitespace only
/// - it contains a NUL byte (the remote side would silently cut it)
/// - it is longer than `max_chars` characters
///
/// # Examples
/// ```
/// use ssh_exec_mcp::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  ls -la  ", Some(1000)).unwrap();
/// assert_eq!(cmd, "  ls -la  ");
///
/// let result = sanitize_command("a".repeat(100).as_str(), Some(50));
/// assert!(result.is_err());
/// ```
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<&str> {
    if command.trim().is_empty() {
        return Err(SshMcpError::invalid_params("Command cannot be empty"));
    }

    if command.contains('\0') {
        return Err(SshMcpError::invalid_params(
            "Command cannot contain NUL bytes",
        ));
    }

    if let Some(max) = max_chars {
        let len = command.chars().count();
        if len > max {
            return Err(SshMcpError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max, len
            )));
        }
    }

    Ok(command)
}

/// Escape a string for use inside a single-quoted shell word
///
/// `'word'` becomes `'"'"'word'"'"'`: end quote, literal quote via double
/// quotes, start quote again.
///
/// # Example
/// ```
/// use ssh_exec_mcp::ssh::sanitize::escape_for_shell;
///
/// assert_eq!(escape_for_shell("it's"), "it'\"'\"'s");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Wrap a string in single quotes so the shell treats it as one literal word
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", escape_for_shell(s))
}

/// Characters with a meaning in the extended regexes `pkill -f` matches with
const REGEX_SPECIAL: &[char] = &[
    '\\', '.', '^', '$', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
];

/// Regex that matches `command` literally inside a process command line
///
/// The first character is put in a bracket expression, so the pattern does
/// not match the command line of the `pkill` (or its `sudo`/`timeout`
/// wrapper) that carries it.
///
/// # Example
/// ```
/// use ssh_exec_mcp::ssh::sanitize::pkill_pattern;
///
/// assert_eq!(pkill_pattern("sleep 30"), "[s]leep 30");
/// assert_eq!(pkill_pattern("tail -f a.log"), "[t]ail -f a\\.log");
/// ```
pub fn pkill_pattern(command: &str) -> String {
    let mut chars = command.chars();
    let mut pattern = String::with_capacity(command.len() + 8);
    match chars.next() {
        Some(first) if !matches!(first, ']' | '\\' | '^') => {
            pattern.push('[');
            pattern.push(first);
            pattern.push(']');
        }
        Some(first) => {
            pattern.push('\\');
            pattern.push(first);
        }
        None => return pattern,
    }
    for c in chars {
        if REGEX_SPECIAL.contains(&c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_command_valid() {
        assert_eq!(sanitize_command("ls -la", Some(1000)).unwrap(), "ls -la");
    }

    #[test]
    fn test_sanitize_command_keeps_text_verbatim() {
        let cmd = "  echo \"a  b\" # trailing comment\n";
        assert_eq!(sanitize_command(cmd, None).unwrap(), cmd);
    }

    #[test]
    fn test_sanitize_command_empty() {
        let result = sanitize_command("", Some(1000));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));

        let result = sanitize_command("  \t ", Some(1000));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sanitize_command_nul() {
        let result = sanitize_command("echo a\0b", None);
        assert!(result.unwrap_err().to_string().contains("NUL"));
    }

    #[test]
    fn test_sanitize_command_too_long() {
        let long_cmd = "a".repeat(100);
        let result = sanitize_command(&long_cmd, Some(50));
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_sanitize_command_counts_characters_not_bytes() {
        let cmd = "é".repeat(50);
        assert!(sanitize_command(&cmd, Some(50)).is_ok());
    }

    #[test]
    fn test_sanitize_command_unlimited() {
        let long_cmd = "a".repeat(10000);
        assert!(sanitize_command(&long_cmd, None).is_ok());
    }

    #[test]
    fn test_escape_for_shell() {
        assert_eq!(escape_for_shell("ls -la"), "ls -la");
        assert_eq!(escape_for_shell("echo 'hello'"), "echo '\"'\"'hello'\"'\"'");
        assert_eq!(escape_for_shell(""), "");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_pkill_pattern_escapes_regex_characters() {
        assert_eq!(pkill_pattern("sleep 30"), "[s]leep 30");
        assert_eq!(
            pkill_pattern("cat a.txt | grep (x)*"),
            "[c]at a\\.txt \\| grep \\(x\\)\\*"
        );
        assert_eq!(pkill_pattern("./run.sh"), "[.]/run\\.sh");
        assert_eq!(pkill_pattern(""), "");
    }

    #[test]
    fn test_pkill_pattern_special_first_character() {
        assert_eq!(pkill_pattern("^x"), "\\^x");
        assert_eq!(pkill_pattern("]a"), "\\]a");
        // never read as a pkill option
        assert_eq!(pkill_pattern("-v"), "[-]v");
    }
}
