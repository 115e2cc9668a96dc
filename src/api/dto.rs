//! Wire types for the HTTP API
//!
//! Field names match the existing clients of the service (`ssh.ip`, `ssh.id`,
//! `localllm`, `latency.openai`, `usage_tokens`, ...).

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::agent::{CommandExecutionRecord, DiagnosisReport, DiagnosisRequest, LatencySummary};
use crate::llm::{BackendKind, TokenUsage};
use crate::ssh::{SshTarget, DEFAULT_SSH_PORT};

/// Largest turn budget a caller may ask for
pub const MAX_TURNS_LIMIT: i64 = 50;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_max_turns() -> i64 {
    10
}

/// Target host credentials
#[derive(Deserialize)]
pub struct SshConnectionDto {
    pub ip: String,
    pub id: String,
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Body of `POST /`
#[derive(Deserialize)]
pub struct DiagnoseRequestDto {
    pub ssh: SshConnectionDto,
    /// Problem description
    pub message: String,
    pub category: String,
    pub user: String,
    #[serde(default)]
    pub localllm: bool,
    #[serde(default = "default_max_turns")]
    pub max_turns: i64,
}

impl DiagnoseRequestDto {
    /// Validate and convert into a service request
    pub fn into_request(self) -> Result<DiagnosisRequest, ApiError> {
        if !(1..=MAX_TURNS_LIMIT).contains(&self.max_turns) {
            return Err(ApiError::InvalidRequest(format!(
                "max_turns must be between 1 and {}, got {}",
                MAX_TURNS_LIMIT, self.max_turns
            )));
        }
        if self.ssh.ip.trim().is_empty() {
            return Err(ApiError::InvalidRequest("ssh.ip must not be empty".to_string()));
        }
        if self.ssh.id.trim().is_empty() {
            return Err(ApiError::InvalidRequest("ssh.id must not be empty".to_string()));
        }

        Ok(DiagnosisRequest {
            target: SshTarget::new(self.ssh.ip.trim(), self.ssh.port, self.ssh.id, self.ssh.password),
            problem: self.message,
            category: self.category,
            requester: self.user,
            backend: BackendKind::from_use_local(self.localllm),
            max_turns: self.max_turns as usize,
        })
    }
}

/// Latency breakdown in seconds
#[derive(Debug, Serialize)]
pub struct LatencyDto {
    pub ssh: f64,
    pub openai: f64,
    pub total: f64,
}

impl From<LatencySummary> for LatencyDto {
    fn from(latency: LatencySummary) -> Self {
        Self {
            ssh: latency.remote_session,
            openai: latency.reasoning,
            total: latency.total,
        }
    }
}

/// Body of a successful `POST /` response
#[derive(Debug, Serialize)]
pub struct DiagnoseResponseDto {
    pub message: String,
    pub executions: Vec<CommandExecutionRecord>,
    pub latency: LatencyDto,
    pub usage_tokens: TokenUsage,
}

impl From<DiagnosisReport> for DiagnoseResponseDto {
    fn from(report: DiagnosisReport) -> Self {
        Self {
            message: report.message,
            executions: report.executions,
            latency: report.latency.into(),
            usage_tokens: report.usage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
