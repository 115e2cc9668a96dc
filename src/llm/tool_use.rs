//! Chat transcript types and the diagnosis tool schemas
//!
//! These mirror the OpenAI-compatible `/chat/completions` wire format, which
//! both the hosted backend and a local Ollama server (`/v1`) speak.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool the model calls to run a command on the target host
pub const EXECUTE_SSH_COMMAND: &str = "execute_ssh_command";

/// Tool the model calls to end the session with a diagnosis
pub const FINISH_DIAGNOSIS: &str = "finish_diagnosis";

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Result of a tool call, bound to the call it answers
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Message text, or "" when the model sent none
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Tool calls carried by this message (empty slice if none)
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// A tool call from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// Function call details
///
/// `arguments` is kept in wire form: a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Decode the arguments into a JSON object.
    ///
    /// Malformed or missing arguments decode to an empty object so callers
    /// fall back to empty field values instead of failing the turn.
    pub fn arguments_object(&self) -> Map<String, Value> {
        let parsed = match &self.arguments {
            Value::String(raw) => serde_json::from_str::<Value>(raw).unwrap_or(Value::Null),
            other => other.clone(),
        };
        match parsed {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Tool definition for the model
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String, // Always "function"
    pub function: ToolFunction,
}

/// Function specification for a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

/// A decoded request from the model to perform one of the two diagnosis actions
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    /// Run a read-only investigation command on the target host
    RunCommand {
        call_id: String,
        command: String,
        reason: String,
    },
    /// Stop collecting and report the conclusion
    FinishDiagnosis {
        call_id: String,
        diagnosis: String,
        solution: String,
        commands_to_fix: Vec<String>,
    },
}

impl ToolInvocation {
    /// Decode a raw tool call. Returns `None` for tool names we never advertised.
    pub fn from_call(call: &ToolCall) -> Option<Self> {
        let args = call.function.arguments_object();
        let call_id = call.id.clone();

        match call.function.name.as_str() {
            EXECUTE_SSH_COMMAND => Some(ToolInvocation::RunCommand {
                call_id,
                command: string_arg(&args, "command"),
                reason: string_arg(&args, "reason"),
            }),
            FINISH_DIAGNOSIS => Some(ToolInvocation::FinishDiagnosis {
                call_id,
                diagnosis: string_arg(&args, "diagnosis"),
                solution: string_arg(&args, "solution"),
                commands_to_fix: args
                    .get("commands_to_fix")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

fn string_arg(args: &Map<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// The `execute_ssh_command` tool definition
pub fn execute_ssh_command_tool() -> Tool {
    Tool {
        tool_type: "function".to_string(),
        function: ToolFunction {
            name: EXECUTE_SSH_COMMAND.to_string(),
            description: "Run a command on the Linux server over SSH to collect information. Use it to check server state, read logs, inspect processes and so on. Once enough information is collected, call finish_diagnosis with the result.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Linux command to run (e.g. 'df -h', 'free -m', 'tail -100 /var/log/syslog')"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why this command is being run"
                    }
                },
                "required": ["command", "reason"]
            }),
        },
    }
}

/// The `finish_diagnosis` tool definition
pub fn finish_diagnosis_tool() -> Tool {
    Tool {
        tool_type: "function".to_string(),
        function: ToolFunction {
            name: FINISH_DIAGNOSIS.to_string(),
            description: "Call this to deliver the final diagnosis after analysing command results. After gathering the needed information with execute_ssh_command you must call this function to give the user the diagnosis and how to fix it.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "diagnosis": {
                        "type": "string",
                        "description": "Analysis of the information collected with execute_ssh_command: current system state, the root cause of the problem, and the relevant logs or processes."
                    },
                    "solution": {
                        "type": "string",
                        "description": "Concrete steps to resolve the problem: actions to take, configuration changes, recommended commands."
                    },
                    "commands_to_fix": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Commands the user should run to fix the problem (optional)"
                    }
                },
                "required": ["diagnosis", "solution"]
            }),
        },
    }
}

/// Both advertised tools, in the order the backend sees them
pub fn diagnosis_tools() -> Vec<Tool> {
    vec![execute_ssh_command_tool(), finish_diagnosis_tool()]
}

/// Default system prompt, used when no prompt file is available
pub const DEFAULT_DIAGNOSIS_SYSTEM_PROMPT: &str = r#"You are a Linux systems engineer. Diagnose the server problem described by the user.

You have two tools:
- execute_ssh_command runs a command on the affected server and returns its output and exit code
- finish_diagnosis ends the session with your diagnosis and solution

Guidelines:
- Investigate with read-only commands (df, free, ps, ss, journalctl, tail, systemctl status, ...)
- Never run commands that modify or destroy data; they will be blocked
- If a command fails or is blocked, read the message and adapt
- Call finish_diagnosis as soon as you have enough evidence"#;

/// Recover tool calls that a model wrote into its message text
///
/// Some locally hosted models answer with `{"name": ..., "arguments": {...}}`
/// in plain text instead of using the native `tool_calls` field. Only calls
/// naming one of the diagnosis tools are recovered.
pub fn parse_tool_calls_from_text(content: &str) -> Vec<ToolCall> {
    let content = content.trim();

    if let Some(call) = try_parse_tool_call(content, 0) {
        return vec![call];
    }

    // Scan for balanced {...} objects embedded in prose
    let mut tool_calls = Vec::new();
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in content.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Some(call) = try_parse_tool_call(&content[s..=i], tool_calls.len()) {
                            tool_calls.push(call);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    tool_calls
}

fn try_parse_tool_call(json_str: &str, index: usize) -> Option<ToolCall> {
    let value = serde_json::from_str::<Value>(json_str).ok()?;
    let name = value.get("name").and_then(|n| n.as_str())?;
    if name != EXECUTE_SSH_COMMAND && name != FINISH_DIAGNOSIS {
        return None;
    }

    // Some models use "parameters" instead of "arguments"
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("parameters"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let arguments = match arguments {
        Value::String(raw) => Value::String(raw),
        other => Value::String(other.to_string()),
    };

    Some(ToolCall {
        id: format!("text_call_{}", index),
        call_type: function_type(),
        function: FunctionCall {
            name: name.to_string(),
            arguments,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments,
            },
        }
    }

    #[test]
    fn test_decode_run_command_from_string_arguments() {
        let tc = call(
            EXECUTE_SSH_COMMAND,
            Value::String(r#"{"command": "df -h", "reason": "check disk"}"#.to_string()),
        );
        assert_eq!(
            ToolInvocation::from_call(&tc),
            Some(ToolInvocation::RunCommand {
                call_id: "call_1".to_string(),
                command: "df -h".to_string(),
                reason: "check disk".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_accepts_object_arguments() {
        let tc = call(EXECUTE_SSH_COMMAND, serde_json::json!({"command": "uptime"}));
        match ToolInvocation::from_call(&tc) {
            Some(ToolInvocation::RunCommand { command, reason, .. }) => {
                assert_eq!(command, "uptime");
                assert_eq!(reason, "");
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_arguments_fall_back_to_defaults() {
        let tc = call(FINISH_DIAGNOSIS, Value::String("{not json".to_string()));
        assert_eq!(
            ToolInvocation::from_call(&tc),
            Some(ToolInvocation::FinishDiagnosis {
                call_id: "call_1".to_string(),
                diagnosis: String::new(),
                solution: String::new(),
                commands_to_fix: vec![],
            })
        );

        let tc = call(EXECUTE_SSH_COMMAND, Value::String(r#"{"command": 42}"#.to_string()));
        match ToolInvocation::from_call(&tc) {
            Some(ToolInvocation::RunCommand { command, .. }) => assert_eq!(command, ""),
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn test_decode_finish_with_fix_commands() {
        let tc = call(
            FINISH_DIAGNOSIS,
            Value::String(
                r#"{"diagnosis": "disk full", "solution": "clear /var/log", "commands_to_fix": ["journalctl --vacuum-size=100M", 7]}"#
                    .to_string(),
            ),
        );
        match ToolInvocation::from_call(&tc) {
            Some(ToolInvocation::FinishDiagnosis { diagnosis, solution, commands_to_fix, .. }) => {
                assert_eq!(diagnosis, "disk full");
                assert_eq!(solution, "clear /var/log");
                assert_eq!(commands_to_fix, vec!["journalctl --vacuum-size=100M".to_string()]);
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tool_is_not_decoded() {
        let tc = call("delete_server", Value::String("{}".to_string()));
        assert!(ToolInvocation::from_call(&tc).is_none());
    }

    #[test]
    fn test_tool_schemas_match_wire_contract() {
        let tools = diagnosis_tools();
        assert_eq!(tools.len(), 2);

        let exec = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(exec["type"], "function");
        assert_eq!(exec["function"]["name"], "execute_ssh_command");
        assert_eq!(exec["function"]["parameters"]["required"], serde_json::json!(["command", "reason"]));
        assert_eq!(exec["function"]["parameters"]["properties"]["command"]["type"], "string");

        let finish = serde_json::to_value(&tools[1]).unwrap();
        assert_eq!(finish["function"]["name"], "finish_diagnosis");
        assert_eq!(finish["function"]["parameters"]["required"], serde_json::json!(["diagnosis", "solution"]));
        assert_eq!(
            finish["function"]["parameters"]["properties"]["commands_to_fix"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn test_tool_message_serialization() {
        let msg = ChatMessage::tool("call_9", "Exit Code: 0\n\nok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_parse_tool_calls_from_text() {
        let text = r#"I will check the disk first.
{"name": "execute_ssh_command", "arguments": {"command": "df -h", "reason": "disk usage"}}"#;
        let calls = parse_tool_calls_from_text(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, EXECUTE_SSH_COMMAND);
        assert!(calls[0].function.arguments.is_string());

        match ToolInvocation::from_call(&calls[0]) {
            Some(ToolInvocation::RunCommand { command, .. }) => assert_eq!(command, "df -h"),
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_calls_from_text_ignores_other_json() {
        assert!(parse_tool_calls_from_text(r#"{"status": "ok"}"#).is_empty());
        assert!(parse_tool_calls_from_text("The disk is full. } stray brace").is_empty());
        assert!(parse_tool_calls_from_text(r#"{"name": "rm_everything", "arguments": {}}"#).is_empty());
    }
}
