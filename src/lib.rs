//! sshdiag - autonomous server diagnosis over SSH
//!
//! An operator describes a problem in plain language; the agent inspects the
//! target host over SSH, reasons over the evidence with an LLM and returns a
//! diagnosis with a remediation plan.
//!
//! # Modules
//!
//! - `agent` - diagnosis loop, session state and request orchestration
//! - `llm` - reasoning backend client and tool schemas
//! - `ssh` - remote command channel
//! - `security` - command safety filter
//! - `api` - HTTP routes
//! - `config` - process configuration
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use sshdiag::{DiagnosisService, DiagnosisRequest};
//!
//! let report = service.diagnose(request).await?;
//! println!("{}", report.message);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod security;
pub mod ssh;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{DiagnosisReport, DiagnosisRequest, DiagnosisService};
pub use config::ServerConfig;
pub use security::CommandFilter;
