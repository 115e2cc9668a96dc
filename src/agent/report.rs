//! Per-session aggregates and the final report
//!
//! ```text
//!   turn 1 ─┐
//!   turn 2 ─┼──► TurnTally { usage, reasoning_time, turns }
//!   turn n ─┘              │
//!                          ▼
//!   connect time ──► LatencySummary ──► DiagnosisReport
//! ```

use std::time::Duration;

use serde::Serialize;

use super::controller::Termination;
use super::session::CommandExecutionRecord;
use crate::llm::TokenUsage;

/// Approximate per-command cost charged to the remote-session latency
pub const PER_COMMAND_OVERHEAD: Duration = Duration::from_millis(100);

/// Running totals over the reasoning turns of one session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnTally {
    pub usage: TokenUsage,
    pub reasoning_time: Duration,
    pub turns: usize,
}

impl TurnTally {
    pub fn record(&mut self, usage: TokenUsage, elapsed: Duration) {
        self.usage += usage;
        self.reasoning_time += elapsed;
        self.turns += 1;
    }
}

/// Wall-clock breakdown in seconds, rounded to two decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Connect time plus a fixed overhead per executed command.
    /// This is an approximation, not a measured value.
    pub remote_session: f64,
    /// Sum of reasoning call latencies
    pub reasoning: f64,
    /// Whole request
    pub total: f64,
}

impl LatencySummary {
    pub fn new(connect_time: Duration, executions: usize, reasoning: Duration, total: Duration) -> Self {
        let remote = connect_time.as_secs_f64() + PER_COMMAND_OVERHEAD.as_secs_f64() * executions as f64;
        Self {
            remote_session: round2(remote),
            reasoning: round2(reasoning.as_secs_f64()),
            total: round2(total.as_secs_f64()),
        }
    }
}

/// Everything returned to the caller once a session completes
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisReport {
    pub trace_id: String,
    pub message: String,
    pub termination: Termination,
    pub executions: Vec<CommandExecutionRecord>,
    pub latency: LatencySummary,
    pub usage: TokenUsage,
    pub turns: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
