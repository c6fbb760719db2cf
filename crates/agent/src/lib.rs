//! Agent runtime for the storefront chat.
//!
//! A request flows through a fixed pipeline:
//! 1. **Guardrail** (`guardrails`) screens the newest customer message.
//! 2. **Triage** (`routing`) decides between a handoff and a direct answer, either
//!    with the LLM (`transfer_to_<agent>` functions) or with keyword scoring.
//! 3. **Agent run** (`runtime`) drives the chosen agent's tool-calling loop against
//!    the ERP tools (`tools`).
//!
//! The LLM only reads data through the tools. It never writes to the ERP.

pub mod agents;
pub mod guardrails;
pub mod llm;
pub mod routing;
pub mod runtime;
pub mod tools;

pub use agents::{AgentCatalog, AgentDescriptor};
pub use guardrails::{GuardrailDecision, InputGuardrail};
pub use llm::{Completion, CompletionRequest, LlmClient, OpenAiChatClient};
pub use routing::{KeywordRouteClassifier, LlmRouteClassifier, RouteClassifier, RouteDecision};
pub use runtime::{AgentRuntime, ChatOrchestrator, ChatReply, TraceContext};
pub use tools::{register_erp_tools, Tool, ToolRegistry};
