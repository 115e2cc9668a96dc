//! Prometheus metrics for diagnosis sessions
//!
//! All metrics live in the default registry and are exported as text by the
//! `/metrics` route.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Session Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished diagnosis sessions by outcome.
    ///
    /// Labels:
    /// - outcome: "finished", "no_tool_call", "turn_budget_exhausted",
    ///   "connection_failed" or "backend_failed"
    pub static ref DIAGNOSIS_SESSIONS: IntCounterVec = register_int_counter_vec!(
        "sshdiag_sessions_total",
        "Diagnosis sessions by outcome",
        &["outcome"]
    ).expect("failed to register DIAGNOSIS_SESSIONS metric");

    /// Reasoning turns used per completed session.
    pub static ref DIAGNOSIS_TURNS: Histogram = register_histogram!(
        "sshdiag_session_turns",
        "Reasoning turns used per diagnosis session",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0, 30.0, 50.0]
    ).expect("failed to register DIAGNOSIS_TURNS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Remote Execution Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Commands proposed by the model, by what happened to them.
    ///
    /// Labels:
    /// - status: "ok" (exit 0), "nonzero", "blocked" or "error"
    pub static ref REMOTE_COMMANDS: IntCounterVec = register_int_counter_vec!(
        "sshdiag_remote_commands_total",
        "Remote commands by result status",
        &["status"]
    ).expect("failed to register REMOTE_COMMANDS metric");

    /// Time to connect, handshake and authenticate with the target host.
    pub static ref SSH_CONNECT_DURATION: Histogram = register_histogram!(
        "sshdiag_ssh_connect_duration_seconds",
        "SSH session establishment time",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).expect("failed to register SSH_CONNECT_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Reasoning Backend Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Latency of a single reasoning call.
    ///
    /// Labels:
    /// - model: backend model identifier
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "sshdiag_llm_call_duration_seconds",
        "Reasoning backend call latency",
        &["model"],
        vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    /// Tokens consumed.
    ///
    /// Labels:
    /// - model: backend model identifier
    /// - kind: "input" or "output"
    pub static ref LLM_TOKENS: IntCounterVec = register_int_counter_vec!(
        "sshdiag_llm_tokens_total",
        "Tokens consumed by reasoning calls",
        &["model", "kind"]
    ).expect("failed to register LLM_TOKENS metric");
}

/// Register every metric so the exporter lists them before first use
pub fn register_all() {
    lazy_static::initialize(&DIAGNOSIS_SESSIONS);
    lazy_static::initialize(&DIAGNOSIS_TURNS);
    lazy_static::initialize(&REMOTE_COMMANDS);
    lazy_static::initialize(&SSH_CONNECT_DURATION);
    lazy_static::initialize(&LLM_CALL_DURATION);
    lazy_static::initialize(&LLM_TOKENS);
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    register_all();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
