//! Reasoning backend client
//!
//! One capability: given the transcript and the tool schemas, produce the
//! next assistant turn. The hosted model and a locally hosted Ollama server
//! both expose the OpenAI-compatible `/chat/completions` endpoint, so a single
//! [`ChatCompletionsClient`] serves both; only the base URL, credentials and
//! model name differ.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::tool_use::{parse_tool_calls_from_text, ChatMessage, Tool};
use super::usage::TokenUsage;

/// Default request timeout for a single reasoning call
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 300;

/// Error type for reasoning backend calls
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty response from reasoning backend")]
    EmptyResponse,
}

/// One assistant turn as produced by the backend
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    /// The assistant message, appended verbatim to the transcript
    pub message: ChatMessage,
    /// Token usage reported for this call
    pub usage: TokenUsage,
    /// Wall-clock time spent in the call
    pub elapsed: Duration,
}

impl AssistantTurn {
    /// Free text the model sent alongside (or instead of) tool calls
    pub fn raw_text(&self) -> Option<&str> {
        self.message
            .content
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.message.calls().is_empty()
    }
}

/// Something that can take the next reasoning turn.
///
/// Implementations always force a tool call (`tool_choice = "required"`).
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Model identifier, used for logs and metric labels
    fn model(&self) -> &str;

    async fn next_turn(
        &self,
        transcript: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AssistantTurn, BackendError>;
}

/// Connection settings for one backend target
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Recover tool calls written as JSON text (local models)
    pub recover_text_tool_calls: bool,
}

impl BackendSettings {
    /// Hosted OpenAI-compatible API
    pub fn hosted(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Some(api_key.into()),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            recover_text_tool_calls: false,
        }
    }

    /// Local Ollama server through its OpenAI-compatible `/v1` API
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Some("ollama".to_string()),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            recover_text_tool_calls: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    settings: BackendSettings,
}

impl ChatCompletionsClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `settings` - base URL, credentials, model and timeout for this target
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let settings = BackendSettings {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            ..settings
        };
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }
}

#[async_trait]
impl ReasoningBackend for ChatCompletionsClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn next_turn(
        &self,
        transcript: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AssistantTurn, BackendError> {
        let endpoint = format!("{}/chat/completions", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": transcript,
            "tools": tools,
            "tool_choice": "required",
        });

        debug!(model = %self.settings.model, messages = transcript.len(), "Sending chat completion request");
        let started = Instant::now();

        let mut request = self.client.post(&endpoint).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        let elapsed = started.elapsed();

        if !status.is_success() {
            warn!(model = %self.settings.model, status = status.as_u16(), "Reasoning backend returned an error");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let (message, usage) = parse_completion(&text, self.settings.recover_text_tool_calls)?;
        Ok(AssistantTurn {
            message,
            usage,
            elapsed,
        })
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Parse a `/chat/completions` response body into the assistant message and its usage.
///
/// Tool call arguments are normalised to their JSON-string wire form so the
/// message can be replayed to the backend unchanged.
pub fn parse_completion(
    body: &str,
    recover_text_tool_calls: bool,
) -> Result<(ChatMessage, TokenUsage), BackendError> {
    if body.trim().is_empty() {
        return Err(BackendError::EmptyResponse);
    }

    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    let mut message = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(BackendError::EmptyResponse)?;

    if let Some(calls) = message.tool_calls.as_mut() {
        for call in calls.iter_mut() {
            if !call.function.arguments.is_string() {
                let raw = match &call.function.arguments {
                    Value::Null => "{}".to_string(),
                    other => other.to_string(),
                };
                call.function.arguments = Value::String(raw);
            }
        }
    }
    if message.tool_calls.as_ref().is_some_and(|calls| calls.is_empty()) {
        message.tool_calls = None;
    }

    if message.tool_calls.is_none() && recover_text_tool_calls {
        let recovered = parse_tool_calls_from_text(message.text());
        if !recovered.is_empty() {
            debug!(count = recovered.len(), "Recovered tool calls from message text");
            message.tool_calls = Some(recovered);
        }
    }

    Ok((message, usage))
}

/// Which backend target a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hosted,
    Local,
}

impl BackendKind {
    pub fn from_use_local(use_local: bool) -> Self {
        if use_local {
            BackendKind::Local
        } else {
            BackendKind::Hosted
        }
    }
}

/// The two interchangeable backend targets, selected per session
#[derive(Clone)]
pub struct BackendSet {
    hosted: Arc<dyn ReasoningBackend>,
    local: Arc<dyn ReasoningBackend>,
}

impl BackendSet {
    pub fn new(hosted: Arc<dyn ReasoningBackend>, local: Arc<dyn ReasoningBackend>) -> Self {
        Self { hosted, local }
    }

    pub fn select(&self, kind: BackendKind) -> Arc<dyn ReasoningBackend> {
        match kind {
            BackendKind::Hosted => Arc::clone(&self.hosted),
            BackendKind::Local => Arc::clone(&self.local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolInvocation;

    const TOOL_CALL_RESPONSE: &str = r#"{
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "refusal": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {"name": "execute_ssh_command", "arguments": "{\"command\":\"df -h\",\"reason\":\"disk\"}"}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 812, "completion_tokens": 44, "total_tokens": 856}
    }"#;

    #[test]
    fn test_parse_tool_call_response() {
        let (message, usage) = parse_completion(TOOL_CALL_RESPONSE, false).unwrap();
        assert_eq!(message.role, "assistant");
        assert_eq!(message.calls().len(), 1);
        assert_eq!(message.calls()[0].id, "call_abc");
        assert_eq!(usage, TokenUsage::new(812, 44));

        let turn = AssistantTurn {
            message,
            usage,
            elapsed: Duration::from_millis(5),
        };
        assert!(turn.raw_text().is_none());
        assert_eq!(
            ToolInvocation::from_call(&turn.message.calls()[0]),
            Some(ToolInvocation::RunCommand {
                call_id: "call_abc".to_string(),
                command: "df -h".to_string(),
                reason: "disk".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_plain_text_response_without_usage() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "Everything looks fine."}}]}"#;
        let (message, usage) = parse_completion(body, false).unwrap();
        assert!(message.tool_calls.is_none());
        assert_eq!(message.text(), "Everything looks fine.");
        assert_eq!(usage, TokenUsage::default());
    }

    #[test]
    fn test_object_arguments_are_normalised_to_strings() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "", "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "finish_diagnosis", "arguments": {"diagnosis": "ok", "solution": "none"}}}
        ]}}]}"#;
        let (message, _) = parse_completion(body, false).unwrap();
        assert!(message.calls()[0].function.arguments.is_string());
    }

    #[test]
    fn test_text_tool_calls_only_recovered_when_enabled() {
        let body = r#"{"choices": [{"message": {"role": "assistant",
            "content": "{\"name\": \"execute_ssh_command\", \"arguments\": {\"command\": \"uptime\", \"reason\": \"load\"}}"}}]}"#;

        let (hosted, _) = parse_completion(body, false).unwrap();
        assert!(hosted.tool_calls.is_none());

        let (local, _) = parse_completion(body, true).unwrap();
        assert_eq!(local.calls().len(), 1);
        assert_eq!(local.calls()[0].function.name, "execute_ssh_command");
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        assert!(matches!(parse_completion("", false), Err(BackendError::EmptyResponse)));
        assert!(matches!(parse_completion(r#"{"choices": []}"#, false), Err(BackendError::EmptyResponse)));
        assert!(matches!(parse_completion("<html>", false), Err(BackendError::Parse(_))));
    }

    #[test]
    fn test_backend_settings() {
        let hosted = BackendSettings::hosted("https://api.openai.com/v1/", "sk-test", "gpt-5-mini");
        assert!(!hosted.recover_text_tool_calls);
        let client = ChatCompletionsClient::new(hosted).unwrap();
        assert_eq!(client.settings().base_url, "https://api.openai.com/v1");
        assert_eq!(client.model(), "gpt-5-mini");

        let local = BackendSettings::local("http://localhost:11434/v1", "gpt-oss:20b")
            .with_timeout(Duration::from_secs(30));
        assert!(local.recover_text_tool_calls);
        assert_eq!(local.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backend_kind_selection() {
        assert_eq!(BackendKind::from_use_local(true), BackendKind::Local);
        assert_eq!(BackendKind::from_use_local(false), BackendKind::Hosted);

        let hosted: Arc<dyn ReasoningBackend> = Arc::new(
            ChatCompletionsClient::new(BackendSettings::hosted("https://api.openai.com/v1", "sk-x", "gpt-5-mini")).unwrap(),
        );
        let local: Arc<dyn ReasoningBackend> = Arc::new(
            ChatCompletionsClient::new(BackendSettings::local("http://localhost:11434/v1", "gpt-oss:20b")).unwrap(),
        );
        let set = BackendSet::new(hosted, local);
        assert_eq!(set.select(BackendKind::Hosted).model(), "gpt-5-mini");
        assert_eq!(set.select(BackendKind::Local).model(), "gpt-oss:20b");
    }
}
