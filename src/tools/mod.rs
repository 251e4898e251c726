//! Tool Registry
//!
//! Static catalogue of the tools the server exposes:
//! - `exec` - Execute a shell command on the remote SSH server
//! - `sudo-exec` - Execute a shell command through `sudo` (omitted with `--disable-sudo`)
//!
//! Arguments are validated into a [`ToolCall`] before anything touches the
//! SSH session. Unknown argument fields are ignored. `description` is inert:
//! any value is accepted and nothing reads it.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, SshMcpError};
use crate::ssh::elevation::redact;

/// Parameters for the exec tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ExecParams {
    /// Shell command to execute on the remote SSH server
    pub command: String,

    /// Optional human-readable note on what the command is for. Never affects execution.
    #[serde(default, deserialize_with = "inert_text", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub description: Option<String>,
}

/// Parameters for the sudo-exec tool
#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SudoExecParams {
    /// Shell command to execute with sudo on the remote SSH server
    pub command: String,

    /// Password for sudo, delivered on stdin. Empty string means passwordless sudo.
    pub sudo_password: String,

    /// Optional human-readable note on what the command is for. Never affects execution.
    #[serde(default, deserialize_with = "inert_text")]
    #[schemars(with = "Option<String>")]
    pub description: Option<String>,
}

impl std::fmt::Debug for SudoExecParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SudoExecParams")
            .field("command", &self.command)
            .field("sudo_password", &"***")
            .field("description", &self.description)
            .finish()
    }
}

/// Accept any JSON value for a free-text annotation
fn inert_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// The tools this server knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Exec,
    SudoExec,
}

impl ToolKind {
    /// Wire name of the tool
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Exec => "exec",
            ToolKind::SudoExec => "sudo-exec",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exec" => Some(ToolKind::Exec),
            "sudo-exec" | "sudo_exec" => Some(ToolKind::SudoExec),
            _ => None,
        }
    }
}

/// A validated tool invocation
#[derive(Debug)]
pub enum ToolCall {
    Exec(ExecParams),
    SudoExec(SudoExecParams),
}

impl ToolCall {
    /// Which tool is being called
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::Exec(_) => ToolKind::Exec,
            ToolCall::SudoExec(_) => ToolKind::SudoExec,
        }
    }

    /// The command text, as supplied by the caller
    pub fn command(&self) -> &str {
        match self {
            ToolCall::Exec(p) => &p.command,
            ToolCall::SudoExec(p) => &p.command,
        }
    }

    /// Whether the caller attached a description
    pub fn has_description(&self) -> bool {
        match self {
            ToolCall::Exec(p) => p.description.is_some(),
            ToolCall::SudoExec(p) => p.description.is_some(),
        }
    }

    /// Secret that must not leave the server, if the call carries one
    pub fn secret(&self) -> Option<&str> {
        match self {
            ToolCall::Exec(_) => None,
            ToolCall::SudoExec(p) => Some(p.sudo_password.as_str()).filter(|s| !s.is_empty()),
        }
    }
}

/// Name, description and input schema of a tool, as listed by `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Immutable set of tools, built once at startup
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<(ToolKind, ToolDescriptor)>,
}

impl ToolRegistry {
    /// Build the registry; `sudo-exec` is left out when `include_sudo` is false
    pub fn new(include_sudo: bool) -> Self {
        let mut tools = vec![(
            ToolKind::Exec,
            ToolDescriptor {
                name: ToolKind::Exec.name(),
                description: "Execute a shell command on the remote SSH server and return the output.",
                input_schema: schema_of::<ExecParams>(),
            },
        )];

        if include_sudo {
            tools.push((
                ToolKind::SudoExec,
                ToolDescriptor {
                    name: ToolKind::SudoExec.name(),
                    description: "Execute a shell command on the remote SSH server using sudo. \
                        The password is passed to sudo on stdin and never echoed back; \
                        an empty password uses passwordless sudo.",
                    input_schema: schema_of::<SudoExecParams>(),
                },
            ));
        }

        Self { tools }
    }

    /// Descriptors in listing order
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|(_, d)| d).collect()
    }

    /// Resolve a tool by name and validate its arguments
    pub fn validate(&self, name: &str, arguments: Option<Value>) -> Result<ToolCall> {
        let kind = ToolKind::from_name(name)
            .filter(|kind| self.tools.iter().any(|(k, _)| k == kind))
            .ok_or_else(|| SshMcpError::invalid_params(format!("Unknown tool: {}", name)))?;

        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(obj @ Value::Object(_)) => obj,
            Some(_) => {
                return Err(SshMcpError::invalid_params(
                    "Tool arguments must be an object",
                ))
            }
        };

        let call = match kind {
            ToolKind::Exec => ToolCall::Exec(parse_arguments(arguments, None)?),
            ToolKind::SudoExec => {
                let secret = arguments.get("sudoPassword").map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                ToolCall::SudoExec(parse_arguments(arguments, secret.as_deref())?)
            }
        };

        debug!(
            "Validated {} call (description {})",
            kind.name(),
            if call.has_description() { "present" } else { "absent" }
        );

        Ok(call)
    }
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(arguments: Value, secret: Option<&str>) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| {
        // serde_json quotes offending scalar values in its messages
        let message = format!("Invalid arguments: {}", e);
        let message = match secret {
            Some(secret) => redact(&message, secret),
            None => message,
        };
        SshMcpError::invalid_params(message)
    })
}

fn schema_of<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exec_params_deserialize() {
        let json = r#"{"command": "echo hello"}"#;
        let params: ExecParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.command, "echo hello");
        assert!(params.description.is_none());
    }

    #[test]
    fn test_registry_lists_both_tools() {
        let registry = ToolRegistry::new(true);
        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["exec", "sudo-exec"]);
    }

    #[test]
    fn test_registry_without_sudo() {
        let registry = ToolRegistry::new(false);
        assert_eq!(registry.descriptors().len(), 1);
        let err = registry
            .validate("sudo-exec", Some(json!({"command": "id", "sudoPassword": "x"})))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let registry = ToolRegistry::new(true);
        let descriptors = registry.descriptors();

        let exec = &descriptors[0].input_schema;
        assert_eq!(exec["type"], "object");
        assert_eq!(exec["required"], json!(["command"]));
        assert!(exec["properties"]["description"].is_object());

        let sudo = &descriptors[1].input_schema;
        let required = sudo["required"].as_array().unwrap();
        assert!(required.contains(&json!("command")));
        assert!(required.contains(&json!("sudoPassword")));
        assert!(!required.contains(&json!("description")));
    }

    #[test]
    fn test_descriptor_serializes_input_schema_key() {
        let registry = ToolRegistry::new(false);
        let value = serde_json::to_value(registry.descriptors()[0]).unwrap();
        assert_eq!(value["name"], "exec");
        assert!(value["inputSchema"].is_object());
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolRegistry::new(true)
            .validate("rm-rf", Some(json!({"command": "ls"})))
            .unwrap_err();
        assert!(matches!(err, SshMcpError::InvalidParams(_)));
    }

    #[test]
    fn test_missing_command() {
        let registry = ToolRegistry::new(true);
        let err = registry.validate("exec", None).unwrap_err();
        assert!(err.to_string().contains("command"));

        let err = registry
            .validate("exec", Some(json!({"description": "no command"})))
            .unwrap_err();
        assert!(matches!(err, SshMcpError::InvalidParams(_)));
    }

    #[test]
    fn test_missing_sudo_password() {
        let err = ToolRegistry::new(true)
            .validate("sudo-exec", Some(json!({"command": "whoami"})))
            .unwrap_err();
        assert!(err.to_string().contains("sudoPassword"));
    }

    #[test]
    fn test_arguments_must_be_object() {
        let err = ToolRegistry::new(true)
            .validate("exec", Some(json!(["ls"])))
            .unwrap_err();
        assert!(matches!(err, SshMcpError::InvalidParams(_)));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let call = ToolRegistry::new(true)
            .validate("exec", Some(json!({"command": "ls", "cwd": "/tmp", "future": 1})))
            .unwrap();
        assert_eq!(call.command(), "ls");
    }

    #[test]
    fn test_description_of_any_shape_is_accepted() {
        let registry = ToolRegistry::new(true);
        for description in [
            json!(""),
            json!("List all files # detailed format"),
            json!("quotes ' \" and $(subshell) `ticks`; newline\n\ttab \u{0007}"),
            json!("x".repeat(100_000)),
            json!(42),
            json!({"nested": true}),
            Value::Null,
        ] {
            let call = registry
                .validate(
                    "exec",
                    Some(json!({"command": "pwd", "description": description})),
                )
                .unwrap();
            assert_eq!(call.command(), "pwd");
        }
    }

    #[test]
    fn test_ill_typed_sudo_password_is_not_echoed() {
        let err = ToolRegistry::new(true)
            .validate(
                "sudo-exec",
                Some(json!({"command": "id", "sudoPassword": 987654321})),
            )
            .unwrap_err();
        assert!(!err.to_string().contains("987654321"));
    }

    #[test]
    fn test_sudo_alias_and_secret() {
        let call = ToolRegistry::new(true)
            .validate(
                "sudo_exec",
                Some(json!({"command": "whoami", "sudoPassword": "secret"})),
            )
            .unwrap();
        assert_eq!(call.kind(), ToolKind::SudoExec);
        assert_eq!(call.secret(), Some("secret"));
        assert!(!format!("{:?}", call).contains("secret"));
    }

    #[test]
    fn test_validation_error_does_not_echo_password() {
        let err = ToolRegistry::new(true)
            .validate(
                "sudo-exec",
                Some(json!({"command": 17, "sudoPassword": "hunter2"})),
            )
            .unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }
}
