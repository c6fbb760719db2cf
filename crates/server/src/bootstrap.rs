use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use wingdesk_agent::{ChatOrchestrator, LlmClient, OpenAiChatClient};
use wingdesk_core::config::{AppConfig, ConfigError};
use wingdesk_erp::ErpGateway;

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client setup failed: {0}")]
    LlmClient(String),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        erp_url = %config.erp.url,
        router = ?config.agents.router,
        "starting application bootstrap"
    );

    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiChatClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::LlmClient(format!("{error:#}")))?,
    );
    let state = build_state(&config, llm);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        "erp gateway and agents initialized"
    );
    Ok(Application { config, state })
}

/// Wires gateway, tools and orchestrator for an already-validated config.
pub fn build_state(config: &AppConfig, llm: Arc<dyn LlmClient>) -> AppState {
    let gateway = Arc::new(ErpGateway::from_config(&config.erp));
    let orchestrator = ChatOrchestrator::with_erp(config, llm, Arc::clone(&gateway));
    AppState { gateway, orchestrator: Arc::new(orchestrator) }
}
