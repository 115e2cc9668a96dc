use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use sshdiag::api::{self, AppState};
use sshdiag::llm::{BackendSet, ChatCompletionsClient};
use sshdiag::ssh::SshConnector;
use sshdiag::tracing::{init_tracing, shutdown_tracing};
use sshdiag::{DiagnosisService, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    init_tracing("sshdiag", config.otlp_endpoint.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    if let Err(e) = config.validate() {
        for problem in &e.problems {
            error!(problem = %problem, "Invalid configuration");
        }
        shutdown_tracing();
        return Err(e.into());
    }

    let hosted = ChatCompletionsClient::new(config.hosted_backend())?;
    let local = ChatCompletionsClient::new(config.local_backend())?;
    info!(
        hosted_model = %config.openai_model,
        local_model = %config.ollama_model,
        "Reasoning backends configured"
    );

    let service = DiagnosisService::new(
        Arc::new(SshConnector),
        BackendSet::new(Arc::new(hosted), Arc::new(local)),
        config.diagnosis_defaults(),
    )
    .with_system_prompt_path(&config.system_prompt_file);

    let result = api::serve(&config.bind, AppState::new(service)).await;

    shutdown_tracing();
    result
}
