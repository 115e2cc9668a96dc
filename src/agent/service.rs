//! Request-level orchestration
//!
//! One call to [`DiagnosisService::diagnose`] opens the remote session, runs
//! the controller with the selected backend, closes the session and builds
//! the report. The session is closed exactly once on every path, including
//! when the caller drops the future.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::controller::{DiagnosisConfig, DiagnosisController, DiagnosisError};
use super::prompt::load_system_prompt;
use super::report::{DiagnosisReport, LatencySummary};
use crate::llm::{BackendKind, BackendSet};
use crate::metrics::{DIAGNOSIS_SESSIONS, DIAGNOSIS_TURNS, SSH_CONNECT_DURATION};
use crate::ssh::{ChannelConnector, RemoteChannel, SshTarget};

/// A validated diagnosis request
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub target: SshTarget,
    /// Free-text description of the problem
    pub problem: String,
    /// Caller-supplied classification, only logged
    pub category: String,
    /// Who asked, only logged
    pub requester: String,
    pub backend: BackendKind,
    pub max_turns: usize,
}

/// Entry point shared by all requests
#[derive(Clone)]
pub struct DiagnosisService {
    connector: Arc<dyn ChannelConnector>,
    backends: BackendSet,
    defaults: DiagnosisConfig,
    system_prompt_path: Option<PathBuf>,
}

impl DiagnosisService {
    pub fn new(connector: Arc<dyn ChannelConnector>, backends: BackendSet, defaults: DiagnosisConfig) -> Self {
        Self {
            connector,
            backends,
            defaults,
            system_prompt_path: None,
        }
    }

    /// Re-read the system prompt from `path` for every session
    pub fn with_system_prompt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.system_prompt_path = Some(path.into());
        self
    }

    async fn system_prompt(&self) -> String {
        match &self.system_prompt_path {
            Some(path) => load_system_prompt(path).await,
            None => self.defaults.system_prompt.clone(),
        }
    }

    /// Run one diagnosis session end to end
    pub async fn diagnose(&self, request: DiagnosisRequest) -> Result<DiagnosisReport, DiagnosisError> {
        let trace_id = Uuid::now_v7().to_string();

        let root_span = info_span!(
            "diagnosis_session",
            trace_id = %trace_id,
            host = %request.target.host,
            category = %request.category,
            user = %request.requester,
            backend = ?request.backend,
            otel.name = "diagnosis_session"
        );

        async {
            let started = Instant::now();
            info!(
                trace_id = %trace_id,
                host = %request.target.host,
                max_turns = request.max_turns,
                "Starting diagnosis session"
            );

            let config = DiagnosisConfig {
                max_turns: request.max_turns,
                system_prompt: self.system_prompt().await,
                ..self.defaults.clone()
            };

            let connect_started = Instant::now();
            let channel = match self.connector.open(&request.target, config.connect_timeout).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "Could not open remote session");
                    DIAGNOSIS_SESSIONS.with_label_values(&["connection_failed"]).inc();
                    return Err(DiagnosisError::Connection(e));
                }
            };
            let connect_time = connect_started.elapsed();
            SSH_CONNECT_DURATION.observe(connect_time.as_secs_f64());

            let guard = ChannelGuard::new(channel);
            let controller = DiagnosisController::new(self.backends.select(request.backend), config);
            let result = controller.run(&trace_id, guard.channel(), &request.problem).await;
            let total = started.elapsed();
            guard.close().await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "Diagnosis aborted");
                    DIAGNOSIS_SESSIONS.with_label_values(&["backend_failed"]).inc();
                    return Err(e);
                }
            };

            DIAGNOSIS_SESSIONS
                .with_label_values(&[outcome.termination.as_label()])
                .inc();
            DIAGNOSIS_TURNS.observe(outcome.tally.turns as f64);

            let latency = LatencySummary::new(
                connect_time,
                outcome.executions.len(),
                outcome.tally.reasoning_time,
                total,
            );
            info!(
                trace_id = %trace_id,
                outcome = outcome.termination.as_label(),
                turns = outcome.tally.turns,
                commands = outcome.executions.len(),
                total_secs = latency.total,
                "Diagnosis session completed"
            );

            Ok(DiagnosisReport {
                trace_id: trace_id.clone(),
                message: outcome.message,
                termination: outcome.termination,
                executions: outcome.executions,
                latency,
                usage: outcome.tally.usage,
                turns: outcome.tally.turns,
            })
        }
        .instrument(root_span)
        .await
    }
}

/// Closes the remote session once, either explicitly or on drop
struct ChannelGuard {
    channel: Arc<dyn RemoteChannel>,
    closed: bool,
}

impl ChannelGuard {
    fn new(channel: Box<dyn RemoteChannel>) -> Self {
        Self {
            channel: Arc::from(channel),
            closed: false,
        }
    }

    fn channel(&self) -> &dyn RemoteChannel {
        self.channel.as_ref()
    }

    async fn close(mut self) {
        self.closed = true;
        self.channel.close().await;
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Cancelled mid-session; finish the close in the background
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.channel);
            handle.spawn(async move { channel.close().await });
        }
    }
}
