//! Diagnosis agent
//!
//! This module provides the loop that orchestrates:
//! - the reasoning backend with tool calling (`/chat/completions`)
//! - the command safety filter
//! - command execution over SSH on the target host
//!
//! # Architecture
//!
//! ```text
//! DiagnosisRequest → DiagnosisService
//!                       ↓
//!              ChannelConnector.open() → RemoteChannel
//!                       ↓
//!              DiagnosisController ⇄ ReasoningBackend (with tools)
//!                       ↓
//!           Tool Call: execute_ssh_command
//!                       ↓
//!           CommandFilter ── blocked ──→ "[BLOCKED] ..." (exit -1)
//!                       ↓ allowed
//!           RemoteChannel.execute() → output + exit code
//!                       ↓
//!           Feed result back → Loop, or finish_diagnosis → Report
//!                       ↓
//!              RemoteChannel.close() (always, exactly once)
//! ```

pub mod controller;
pub mod prompt;
pub mod report;
pub mod service;
pub mod session;

pub use controller::{
    format_final_message, DiagnosisConfig, DiagnosisController, DiagnosisError, DiagnosisOutcome,
    Termination, NO_TOOL_CALL_FALLBACK, TURN_BUDGET_EXHAUSTED_MESSAGE,
};
pub use prompt::load_system_prompt;
pub use report::{DiagnosisReport, LatencySummary, TurnTally};
pub use service::{DiagnosisRequest, DiagnosisService};
pub use session::{CommandExecutionRecord, DiagnosisSession, Transcript};
