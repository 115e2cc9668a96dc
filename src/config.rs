//! Process configuration
//!
//! Every setting can come from a flag or an environment variable. Validation
//! reports all problems at once so a misconfigured deployment fails on the
//! first start with the full list.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::agent::DiagnosisConfig;
use crate::llm::client::DEFAULT_BACKEND_TIMEOUT_SECS;
use crate::llm::{BackendSettings, DEFAULT_DIAGNOSIS_SYSTEM_PROMPT};

#[derive(Parser, Debug, Clone)]
#[command(name = "sshdiag")]
#[command(about = "SSH diagnosis agent - investigates server problems with an LLM over SSH")]
pub struct ServerConfig {
    /// Address the HTTP API listens on
    #[arg(long, env = "SSHDIAG_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// API key for the hosted reasoning backend
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL of the hosted backend
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Hosted model name
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-5-mini")]
    pub openai_model: String,

    /// Base URL of the local Ollama server's OpenAI-compatible API
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "")]
    pub ollama_base_url: String,

    /// Local model name
    #[arg(long, env = "OLLAMA_MODEL", default_value = "gpt-oss:20b")]
    pub ollama_model: String,

    /// System prompt file, re-read for every session
    #[arg(long, env = "SSHDIAG_SYSTEM_PROMPT_FILE", default_value = "system_prompt.txt")]
    pub system_prompt_file: PathBuf,

    /// Timeout for a single reasoning call, in seconds
    #[arg(long, env = "SSHDIAG_BACKEND_TIMEOUT_SECS", default_value_t = DEFAULT_BACKEND_TIMEOUT_SECS)]
    pub backend_timeout_secs: u64,

    /// Timeout for a single remote command, in seconds
    #[arg(long, env = "SSHDIAG_COMMAND_TIMEOUT_SECS", default_value_t = 30)]
    pub command_timeout_secs: u64,

    /// Timeout for establishing the SSH session, in seconds
    #[arg(long, env = "SSHDIAG_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// OTLP collector endpoint; console logging only when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// Every problem found in a [`ServerConfig`]
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration:\n  - {}", .problems.join("\n  - "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ServerConfig {
    /// Check the whole configuration, collecting every problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.openai_api_key.is_empty() {
            problems.push("OPENAI_API_KEY is not set".to_string());
        } else if !self.openai_api_key.starts_with("sk-") {
            problems.push("OPENAI_API_KEY must start with 'sk-'".to_string());
        }
        if !self.openai_base_url.starts_with("http") {
            problems.push(format!("OPENAI_BASE_URL is not an http(s) URL: {}", self.openai_base_url));
        }
        if self.ollama_base_url.is_empty() {
            problems.push("OLLAMA_BASE_URL is not set".to_string());
        } else if !self.ollama_base_url.starts_with("http") {
            problems.push(format!("OLLAMA_BASE_URL is not an http(s) URL: {}", self.ollama_base_url));
        }
        if self.bind.parse::<SocketAddr>().is_err() {
            problems.push(format!("bind address is not host:port: {}", self.bind));
        }
        for (name, value) in [
            ("backend timeout", self.backend_timeout_secs),
            ("command timeout", self.command_timeout_secs),
            ("connect timeout", self.connect_timeout_secs),
        ] {
            if value == 0 {
                problems.push(format!("{} must be greater than zero", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    pub fn hosted_backend(&self) -> BackendSettings {
        BackendSettings::hosted(&self.openai_base_url, &self.openai_api_key, &self.openai_model)
            .with_timeout(Duration::from_secs(self.backend_timeout_secs))
    }

    pub fn local_backend(&self) -> BackendSettings {
        BackendSettings::local(&self.ollama_base_url, &self.ollama_model)
            .with_timeout(Duration::from_secs(self.backend_timeout_secs))
    }

    /// Per-session defaults; `max_turns` is overridden by each request
    pub fn diagnosis_defaults(&self) -> DiagnosisConfig {
        DiagnosisConfig {
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            system_prompt: DEFAULT_DIAGNOSIS_SYSTEM_PROMPT.to_string(),
            ..DiagnosisConfig::default()
        }
    }
}
