//! Per-request diagnosis session state
//!
//! A session owns the transcript sent to the reasoning backend and the log of
//! command attempts. Both are append-only; nothing outside the diagnosis loop
//! holds a mutable reference to them.

use serde::Serialize;

use super::report::TurnTally;
use crate::llm::{AssistantTurn, ChatMessage};

/// Ordered, append-only conversation with the reasoning backend
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Start a transcript with the system prompt and the user's problem
    pub fn new(system_prompt: impl Into<String>, problem: &str) -> Self {
        let mut transcript = Self::default();
        transcript.push(ChatMessage::system(system_prompt));
        transcript.push(ChatMessage::user(format!("### Request\n\n{}", problem)));
        transcript
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// One command the model asked for, whether it ran or was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandExecutionRecord {
    pub command: String,
    pub reason: String,
    /// Output as fed back to the model (truncated)
    pub output: String,
    /// Process exit status; `-1` for blocked commands and execution errors
    pub exit_code: i32,
}

/// Mutable state of one diagnosis run
#[derive(Debug)]
pub struct DiagnosisSession {
    /// Unique trace ID for this session
    pub trace_id: String,
    transcript: Transcript,
    executions: Vec<CommandExecutionRecord>,
    max_turns: usize,
    tally: TurnTally,
}

impl DiagnosisSession {
    /// Create a new session
    ///
    /// # Arguments
    /// * `trace_id` - ID used to correlate logs and spans
    /// * `system_prompt` - first transcript entry
    /// * `problem` - the operator's description of the issue
    /// * `max_turns` - reasoning calls allowed before giving up
    pub fn new(trace_id: impl Into<String>, system_prompt: impl Into<String>, problem: &str, max_turns: usize) -> Self {
        Self {
            trace_id: trace_id.into(),
            transcript: Transcript::new(system_prompt, problem),
            executions: Vec::new(),
            max_turns,
            tally: TurnTally::default(),
        }
    }

    pub fn has_turns_left(&self) -> bool {
        self.tally.turns < self.max_turns
    }

    /// Account for a completed reasoning call and append its message
    pub fn record_turn(&mut self, turn: &AssistantTurn) {
        self.tally.record(turn.usage, turn.elapsed);
        self.transcript.push(turn.message.clone());
    }

    /// Append a tool result bound to `call_id`
    pub fn push_tool_result(&mut self, call_id: &str, content: impl Into<String>) {
        self.transcript.push(ChatMessage::tool(call_id, content));
    }

    pub fn record_execution(&mut self, record: CommandExecutionRecord) {
        self.executions.push(record);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn executions(&self) -> &[CommandExecutionRecord] {
        &self.executions
    }

    pub fn turns_used(&self) -> usize {
        self.tally.turns
    }

    /// Consume the session, keeping only what the caller needs
    pub fn into_parts(self) -> (Vec<CommandExecutionRecord>, TurnTally) {
        (self.executions, self.tally)
    }
}

/// Truncate to at most `max_chars` characters, respecting UTF-8 boundaries
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::TokenUsage;

    #[test]
    fn test_session_creation() {
        let session = DiagnosisSession::new("trace-1", "You are an SRE.", "nginx returns 502", 10);
        assert_eq!(session.trace_id, "trace-1");
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.transcript().messages()[0].role, "system");
        assert_eq!(session.transcript().messages()[1].text(), "### Request\n\nnginx returns 502");
        assert!(session.executions().is_empty());
        assert!(session.has_turns_left());
    }

    #[test]
    fn test_turn_budget() {
        let mut session = DiagnosisSession::new("t", "sys", "problem", 2);
        let turn = AssistantTurn {
            message: ChatMessage::assistant("thinking"),
            usage: TokenUsage::new(10, 5),
            elapsed: Duration::from_millis(250),
        };

        session.record_turn(&turn);
        assert!(session.has_turns_left());
        session.record_turn(&turn);
        assert!(!session.has_turns_left());

        assert_eq!(session.turns_used(), 2);
        assert_eq!(session.tally.usage, TokenUsage::new(20, 10));
        assert_eq!(session.tally.reasoning_time, Duration::from_millis(500));
        assert_eq!(session.transcript().len(), 4);
    }

    #[test]
    fn test_zero_budget_has_no_turns() {
        let session = DiagnosisSession::new("t", "sys", "problem", 0);
        assert!(!session.has_turns_left());
    }

    #[test]
    fn test_tool_results_are_appended() {
        let mut session = DiagnosisSession::new("t", "sys", "problem", 1);
        session.push_tool_result("call_1", "Exit Code: 0\n\nok");
        let last = session.transcript().messages().last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 4), "abcd");
        assert_eq!(truncate_chars("디스크가 가득 찼습니다", 3), "디스크");
        assert_eq!(truncate_chars("", 3), "");
    }
}
