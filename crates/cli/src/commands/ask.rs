use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wingdesk_agent::{ChatOrchestrator, LlmClient, OpenAiChatClient, TraceContext};
use wingdesk_core::config::{AppConfig, LoadOptions};
use wingdesk_core::{AgentRole, Transcript};
use wingdesk_erp::ErpGateway;

use crate::commands::CommandResult;

pub fn run(config_path: Option<PathBuf>, message: &str, agent: Option<AgentRole>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("ask", "config_validation", error.to_string(), 2);
        }
    };
    init_logging(&config);

    let llm: Arc<dyn LlmClient> = match OpenAiChatClient::from_config(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            return CommandResult::failure("ask", "llm_client", format!("{error:#}"), 3);
        }
    };
    let gateway = Arc::new(ErpGateway::from_config(&config.erp));
    let orchestrator = ChatOrchestrator::with_erp(&config, llm, gateway);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let transcript = Transcript::from_chat(Vec::<(String, String)>::new(), message);
    let trace = TraceContext::new("cli.ask");
    let reply = runtime.block_on(async {
        match agent {
            Some(role) => orchestrator.reply_as(role, &transcript, &trace).await,
            None => orchestrator.reply(&transcript, &trace).await.text,
        }
    });

    CommandResult::success("ask", reply)
}

/// Logs go to stderr so stdout stays a single JSON payload.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
