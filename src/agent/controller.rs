//! Diagnosis Controller - the bounded reason/act loop for one request
//!
//! The DiagnosisController alternates between the reasoning backend and the
//! remote channel: the model proposes commands, the safety filter vets them,
//! approved commands run on the target host and their output is fed back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Instrument};

use super::session::{truncate_chars, CommandExecutionRecord, DiagnosisSession};
use super::report::TurnTally;
use crate::llm::{diagnosis_tools, BackendError, ReasoningBackend, ToolInvocation, DEFAULT_DIAGNOSIS_SYSTEM_PROMPT};
use crate::metrics::{LLM_CALL_DURATION, LLM_TOKENS, REMOTE_COMMANDS};
use crate::security::CommandFilter;
use crate::ssh::{
    CommandOutput, ConnectionError, RemoteChannel, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
};

/// Final message when the model answers without calling any tool and sends no text
pub const NO_TOOL_CALL_FALLBACK: &str = "Unable to complete the diagnosis.";

/// Final message when the turn budget runs out
pub const TURN_BUDGET_EXHAUSTED_MESSAGE: &str =
    "Maximum number of diagnosis turns reached. Please try again.";

/// Characters of command output kept for the model and the execution log
pub const DEFAULT_OUTPUT_CAP_CHARS: usize = 2000;

/// Configuration for a diagnosis run
#[derive(Debug, Clone)]
pub struct DiagnosisConfig {
    /// Maximum number of reasoning calls before giving up
    pub max_turns: usize,
    /// Deadline for each remote command
    pub command_timeout: Duration,
    /// Deadline for establishing the SSH session
    pub connect_timeout: Duration,
    /// Output characters kept per command
    pub output_cap_chars: usize,
    /// First message of every transcript
    pub system_prompt: String,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            output_cap_chars: DEFAULT_OUTPUT_CAP_CHARS,
            system_prompt: DEFAULT_DIAGNOSIS_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model called `finish_diagnosis`
    Finished,
    /// The model replied without calling any tool
    NoToolCall,
    /// The turn budget ran out while still collecting evidence
    TurnBudgetExhausted,
}

impl Termination {
    /// Label used for the sessions metric
    pub fn as_label(&self) -> &'static str {
        match self {
            Termination::Finished => "finished",
            Termination::NoToolCall => "no_tool_call",
            Termination::TurnBudgetExhausted => "turn_budget_exhausted",
        }
    }
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct DiagnosisOutcome {
    pub message: String,
    pub termination: Termination,
    pub executions: Vec<CommandExecutionRecord>,
    pub tally: TurnTally,
}

/// Failures that abort a diagnosis request
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("failed to connect to target host: {0}")]
    Connection(#[from] ConnectionError),
    #[error("reasoning backend failed: {0}")]
    Backend(#[from] BackendError),
}

/// Drives one diagnosis to completion
pub struct DiagnosisController {
    backend: Arc<dyn ReasoningBackend>,
    filter: CommandFilter,
    config: DiagnosisConfig,
}

impl DiagnosisController {
    /// Create a new diagnosis controller
    ///
    /// # Arguments
    /// * `backend` - reasoning backend selected for this request
    /// * `config` - turn budget, timeouts and system prompt
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: DiagnosisConfig) -> Self {
        Self {
            backend,
            filter: CommandFilter::new(),
            config,
        }
    }

    /// Run the loop until the model finishes, stops calling tools, or the
    /// turn budget runs out.
    ///
    /// Only a backend failure aborts the run. Blocked and failed commands are
    /// reported back to the model as tool results.
    ///
    /// # Arguments
    /// * `trace_id` - correlation ID for logs and spans
    /// * `channel` - open session to the target host
    /// * `problem` - the operator's description of the issue
    pub async fn run(
        &self,
        trace_id: &str,
        channel: &dyn RemoteChannel,
        problem: &str,
    ) -> Result<DiagnosisOutcome, DiagnosisError> {
        let model = self.backend.model().to_string();
        let tools = diagnosis_tools();
        let mut session = DiagnosisSession::new(
            trace_id,
            self.config.system_prompt.clone(),
            problem,
            self.config.max_turns,
        );

        while session.has_turns_left() {
            let turn_number = session.turns_used() + 1;
            let llm_span = info_span!(
                "llm_call",
                trace_id = %trace_id,
                turn = turn_number,
                model = %model,
                otel.name = "llm_call"
            );

            let turn = self
                .backend
                .next_turn(session.transcript().messages(), &tools)
                .instrument(llm_span)
                .await?;

            LLM_CALL_DURATION
                .with_label_values(&[&model])
                .observe(turn.elapsed.as_secs_f64());
            LLM_TOKENS.with_label_values(&[&model, "input"]).inc_by(turn.usage.input);
            LLM_TOKENS.with_label_values(&[&model, "output"]).inc_by(turn.usage.output);
            info!(
                trace_id = %trace_id,
                turn = turn_number,
                duration_ms = turn.elapsed.as_millis() as u64,
                tokens = turn.usage.total,
                tool_calls = turn.message.calls().len(),
                "Reasoning call completed"
            );

            session.record_turn(&turn);

            if !turn.has_tool_calls() {
                let message = turn
                    .raw_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| NO_TOOL_CALL_FALLBACK.to_string());
                info!(trace_id = %trace_id, turns = session.turns_used(), "Model replied without a tool call");
                return Ok(finish(session, message, Termination::NoToolCall));
            }

            for call in turn.message.calls() {
                debug!(
                    trace_id = %trace_id,
                    tool = %call.function.name,
                    arguments = %call.function.arguments,
                    "Tool call"
                );
                match ToolInvocation::from_call(call) {
                    Some(ToolInvocation::RunCommand {
                        call_id,
                        command,
                        reason,
                    }) => {
                        let record = self.run_command(trace_id, channel, &command, &reason).await;
                        session.push_tool_result(
                            &call_id,
                            format!("Exit Code: {}\n\n{}", record.exit_code, record.output),
                        );
                        session.record_execution(record);
                    }
                    Some(ToolInvocation::FinishDiagnosis {
                        diagnosis,
                        solution,
                        commands_to_fix,
                        ..
                    }) => {
                        info!(
                            trace_id = %trace_id,
                            turns = session.turns_used(),
                            commands = session.executions().len(),
                            "Diagnosis finished"
                        );
                        let message = format_final_message(&diagnosis, &solution, &commands_to_fix);
                        return Ok(finish(session, message, Termination::Finished));
                    }
                    None => {
                        warn!(trace_id = %trace_id, tool = %call.function.name, "Model called an unknown tool");
                        session.push_tool_result(
                            &call.id,
                            format!("Unknown tool: {}", call.function.name),
                        );
                    }
                }
            }
        }

        warn!(trace_id = %trace_id, turns = session.turns_used(), "Turn budget exhausted");
        Ok(finish(
            session,
            TURN_BUDGET_EXHAUSTED_MESSAGE.to_string(),
            Termination::TurnBudgetExhausted,
        ))
    }

    /// Vet, run and record one proposed command. Never fails.
    async fn run_command(
        &self,
        trace_id: &str,
        channel: &dyn RemoteChannel,
        command: &str,
        reason: &str,
    ) -> CommandExecutionRecord {
        let output = if let Some(rule) = self.filter.matched_rule(command) {
            warn!(trace_id = %trace_id, command = %command, rule, "Dangerous command blocked");
            REMOTE_COMMANDS.with_label_values(&["blocked"]).inc();
            CommandOutput::blocked(command)
        } else {
            let exec_span = info_span!(
                "remote_command",
                trace_id = %trace_id,
                command = %command,
                otel.name = "remote_command"
            );
            info!(trace_id = %trace_id, command = %command, reason = %reason, "Executing remote command");

            let started = Instant::now();
            let result = channel
                .execute(command, self.config.command_timeout)
                .instrument(exec_span)
                .await;

            match result {
                Ok(output) => {
                    let status = if output.exit_code == 0 { "ok" } else { "nonzero" };
                    REMOTE_COMMANDS.with_label_values(&[status]).inc();
                    debug!(
                        trace_id = %trace_id,
                        exit_code = output.exit_code,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Remote command completed"
                    );
                    output
                }
                Err(e) => {
                    warn!(trace_id = %trace_id, command = %command, error = %e, "Remote command failed");
                    REMOTE_COMMANDS.with_label_values(&["error"]).inc();
                    CommandOutput::failed(&e)
                }
            }
        };

        CommandExecutionRecord {
            command: command.to_string(),
            reason: reason.to_string(),
            output: truncate_chars(&output.text, self.config.output_cap_chars),
            exit_code: output.exit_code,
        }
    }
}

fn finish(session: DiagnosisSession, message: String, termination: Termination) -> DiagnosisOutcome {
    let (executions, tally) = session.into_parts();
    DiagnosisOutcome {
        message,
        termination,
        executions,
        tally,
    }
}

/// Render the `finish_diagnosis` arguments as the user-facing report
pub fn format_final_message(diagnosis: &str, solution: &str, commands_to_fix: &[String]) -> String {
    let mut message = format!("## Diagnosis\n{}\n\n## Solution\n{}", diagnosis, solution);
    if !commands_to_fix.is_empty() {
        message.push_str("\n\n## Recommended Commands\n");
        for command in commands_to_fix {
            message.push_str(&format!("```\n{}\n```\n", command));
        }
    }
    message
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory doubles for the backend and the remote channel

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::llm::{AssistantTurn, ChatMessage, FunctionCall, Tool, ToolCall, TokenUsage};
    use crate::ssh::{CommandOutput, ExecutionError, RemoteChannel};

    use super::*;

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: serde_json::Value::String(arguments.to_string()),
            },
        }
    }

    pub fn command_call(id: &str, command: &str) -> ToolCall {
        tool_call(id, "execute_ssh_command", json!({"command": command, "reason": "check"}))
    }

    pub fn finish_call(id: &str, diagnosis: &str, solution: &str, fixes: &[&str]) -> ToolCall {
        tool_call(
            id,
            "finish_diagnosis",
            json!({"diagnosis": diagnosis, "solution": solution, "commands_to_fix": fixes}),
        )
    }

    pub fn turn_with_calls(calls: Vec<ToolCall>) -> AssistantTurn {
        AssistantTurn {
            message: ChatMessage {
                role: "assistant".to_string(),
                content: None,
                tool_calls: Some(calls),
                tool_call_id: None,
            },
            usage: TokenUsage::new(100, 10),
            elapsed: Duration::from_millis(200),
        }
    }

    pub fn text_turn(text: &str) -> AssistantTurn {
        AssistantTurn {
            message: ChatMessage::assistant(text),
            usage: TokenUsage::new(50, 5),
            elapsed: Duration::from_millis(100),
        }
    }

    /// Replays canned turns and records every transcript it was shown
    #[derive(Default)]
    pub struct ScriptedBackend {
        turns: Mutex<VecDeque<Result<AssistantTurn, BackendError>>>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        pub fn new(turns: Vec<Result<AssistantTurn, BackendError>>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReasoningBackend for ScriptedBackend {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn next_turn(&self, transcript: &[ChatMessage], _tools: &[Tool]) -> Result<AssistantTurn, BackendError> {
            self.seen.lock().unwrap().push(transcript.to_vec());
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text_turn("out of script")))
        }
    }

    /// Answers every command with a fixed result and counts calls
    #[derive(Default)]
    pub struct FakeChannel {
        pub executed: Mutex<Vec<String>>,
        pub closes: AtomicUsize,
        pub fail_with_timeout: bool,
        pub output: String,
    }

    impl FakeChannel {
        pub fn with_output(output: &str) -> Self {
            Self {
                output: output.to_string(),
                ..Default::default()
            }
        }

        pub fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteChannel for FakeChannel {
        async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ExecutionError> {
            self.executed.lock().unwrap().push(command.to_string());
            if self.fail_with_timeout {
                return Err(ExecutionError::Timeout(timeout.as_secs()));
            }
            Ok(CommandOutput::from_streams(&self.output, "", 0))
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
