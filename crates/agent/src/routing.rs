use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use wingdesk_core::{RouteTarget, Transcript};

use crate::agents::AgentDescriptor;
use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolDefinition};

pub const CLARIFICATION_REPLY: &str =
    "¡Hola! ¿En qué puedo ayudarte? ¿Buscas material de wingfoil o tienes una consulta sobre un pedido?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Handoff(RouteTarget),
    Respond(String),
}

#[async_trait]
pub trait RouteClassifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn classify(&self, transcript: &Transcript) -> Result<RouteDecision>;
}

const SALES_WORDS: &[&str] = &[
    "comprar", "compro", "comprarme", "quiero", "precio", "precios", "cuesta", "cuestan",
    "ala", "alas", "wing", "wings", "tabla", "tablas", "foil", "foils", "mastil", "neopreno",
    "talla", "tallas", "oferta", "ofertas", "descuento", "recomiendas", "recomendar",
    "principiante", "principiantes", "catalogo", "producto", "productos", "envio", "tienda",
];

const SALES_PHRASES: &[&str] = &["que me recomiendas", "hay stock de", "teneis en stock"];

const OPS_WORDS: &[&str] = &[
    "pedido", "pedidos", "proveedor", "proveedores", "recepcion", "recepciones", "albaran",
    "linea", "lineas", "almacen", "logistica", "reposicion", "inventario", "ubicacion",
];

const OPS_PHRASES: &[&str] =
    &["pedido de compra", "pedidos de compra", "orden de compra", "stock queda", "fecha prevista"];

/// Rule-based triage: keyword scores over the newest user line, then older ones.
#[derive(Clone, Debug, Default)]
pub struct KeywordRouteClassifier;

impl KeywordRouteClassifier {
    pub fn score(message: &str) -> Option<RouteTarget> {
        let normalized = normalize(message);
        let tokens: BTreeSet<&str> = normalized.split_whitespace().collect();
        let padded = format!(" {normalized} ");

        let count = |words: &[&str], phrases: &[&str]| {
            words.iter().filter(|word| tokens.contains(*word)).count()
                + 2 * phrases.iter().filter(|phrase| padded.contains(&format!(" {phrase} "))).count()
        };

        let sales = count(SALES_WORDS, SALES_PHRASES);
        let mut operations = count(OPS_WORDS, OPS_PHRASES);
        if references_order_number(&tokens, &normalized) {
            operations += 2;
        }

        match sales.cmp(&operations) {
            std::cmp::Ordering::Greater => Some(RouteTarget::Sales),
            std::cmp::Ordering::Less => Some(RouteTarget::Operations),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[async_trait]
impl RouteClassifier for KeywordRouteClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, transcript: &Transcript) -> Result<RouteDecision> {
        let decision = transcript
            .user_messages_newest_first()
            .find_map(Self::score)
            .map(RouteDecision::Handoff)
            .unwrap_or_else(|| RouteDecision::Respond(CLARIFICATION_REPLY.to_string()));
        Ok(decision)
    }
}

fn references_order_number(tokens: &BTreeSet<&str>, normalized: &str) -> bool {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let numbered = words.windows(2).any(|pair| {
        matches!(pair[0], "pedido" | "orden" | "po")
            && pair[1].chars().all(|ch| ch.is_ascii_digit())
    });
    numbered || tokens.iter().any(|token| is_po_reference(token))
}

fn is_po_reference(token: &str) -> bool {
    token
        .strip_prefix('p')
        .is_some_and(|rest| rest.len() >= 3 && rest.chars().all(|ch| ch.is_ascii_digit()))
}

/// Lowercase, fold Spanish accents and replace punctuation with spaces.
fn normalize(message: &str) -> String {
    message
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            ch if ch.is_alphanumeric() => ch,
            _ => ' ',
        })
        .collect()
}

/// Prompt-based triage: the model either calls a `transfer_to_<agent>` function or
/// answers directly.
pub struct LlmRouteClassifier {
    llm: Arc<dyn LlmClient>,
    triage: AgentDescriptor,
}

impl LlmRouteClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, triage: AgentDescriptor) -> Self {
        Self { llm, triage }
    }

    fn transfer_tools(&self) -> Vec<ToolDefinition> {
        self.triage
            .handoffs
            .iter()
            .map(|target| ToolDefinition {
                name: AgentDescriptor::transfer_function(*target),
                description: format!(
                    "Transfiere la conversación al agente {}.",
                    crate::agents::agent_name(target.role())
                ),
                parameters: json!({"type": "object", "properties": {}}),
            })
            .collect()
    }
}

#[async_trait]
impl RouteClassifier for LlmRouteClassifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn classify(&self, transcript: &Transcript) -> Result<RouteDecision> {
        let request = CompletionRequest {
            model: Some(self.triage.model.clone()),
            system: self.triage.instructions.clone(),
            messages: vec![ChatMessage::user(transcript.render())],
            tools: self.transfer_tools(),
        };

        match self.llm.complete(&request).await? {
            Completion::ToolCalls(calls) => {
                let target = calls
                    .iter()
                    .find_map(|call| {
                        self.triage
                            .handoffs
                            .iter()
                            .copied()
                            .find(|target| AgentDescriptor::transfer_function(*target) == call.name)
                    })
                    .ok_or_else(|| {
                        let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
                        anyhow!("triage called unknown functions: {}", names.join(", "))
                    })?;
                debug!(event_name = "agent.route.llm_handoff", route = ?target, "triage handoff");
                Ok(RouteDecision::Handoff(target))
            }
            Completion::Text(text) if text.trim().is_empty() => {
                bail!("triage produced an empty reply")
            }
            Completion::Text(text) => Ok(RouteDecision::Respond(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use wingdesk_core::config::AppConfig;
    use wingdesk_core::{AgentRole, Role, RouteTarget, Transcript};

    use super::{
        KeywordRouteClassifier, LlmRouteClassifier, RouteClassifier, RouteDecision,
        CLARIFICATION_REPLY,
    };
    use crate::agents::AgentCatalog;
    use crate::llm::{Completion, CompletionRequest, LlmClient, ToolCall};

    fn transcript(lines: &[(Role, &str)]) -> Transcript {
        let mut transcript = Transcript::new();
        for (role, text) in lines {
            transcript.push(*role, *text);
        }
        transcript
    }

    #[tokio::test]
    async fn purchase_intent_goes_to_sales() {
        let decision = KeywordRouteClassifier
            .classify(&transcript(&[(Role::User, "quiero comprar un ala")]))
            .await
            .expect("decision");
        assert_eq!(decision, RouteDecision::Handoff(RouteTarget::Sales));
    }

    #[tokio::test]
    async fn order_question_goes_to_operations() {
        let decision = KeywordRouteClassifier
            .classify(&transcript(&[(Role::User, "¿cuánto stock queda del pedido 45?")]))
            .await
            .expect("decision");
        assert_eq!(decision, RouteDecision::Handoff(RouteTarget::Operations));
    }

    #[tokio::test]
    async fn vague_latest_line_falls_back_to_earlier_context() {
        let decision = KeywordRouteClassifier
            .classify(&transcript(&[
                (Role::User, "necesito revisar la recepción del pedido de compra P00045"),
                (Role::Assistant, "Claro, ¿qué quieres saber?"),
                (Role::User, "¿y para cuándo llega?"),
            ]))
            .await
            .expect("decision");
        assert_eq!(decision, RouteDecision::Handoff(RouteTarget::Operations));
    }

    #[tokio::test]
    async fn no_signal_asks_for_clarification() {
        let decision = KeywordRouteClassifier
            .classify(&transcript(&[(Role::User, "hola, buenas tardes")]))
            .await
            .expect("decision");
        assert_eq!(decision, RouteDecision::Respond(CLARIFICATION_REPLY.to_string()));
    }

    struct ScriptedTriage {
        reply: Completion,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedTriage {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.seen.lock().expect("seen lock").push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn llm_classifier(reply: Completion) -> (LlmRouteClassifier, Arc<ScriptedTriage>) {
        let llm = Arc::new(ScriptedTriage { reply, seen: Mutex::new(Vec::new()) });
        let catalog = AgentCatalog::from_config(&AppConfig::default());
        let classifier =
            LlmRouteClassifier::new(llm.clone(), catalog.get(AgentRole::Triage).clone());
        (classifier, llm)
    }

    #[tokio::test]
    async fn transfer_call_becomes_handoff() {
        let (classifier, llm) = llm_classifier(Completion::ToolCalls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "transfer_to_internal_ops_agent".to_string(),
            arguments: "{}".to_string(),
        }]));

        let decision = classifier
            .classify(&transcript(&[(Role::User, "estado del pedido 45")]))
            .await
            .expect("decision");
        assert_eq!(decision, RouteDecision::Handoff(RouteTarget::Operations));

        let seen = llm.seen.lock().expect("seen lock");
        let tools: Vec<&str> = seen[0].tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(tools, vec!["transfer_to_crm_agent", "transfer_to_internal_ops_agent"]);
        assert_eq!(seen[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn plain_text_is_answered_by_triage() {
        let (classifier, _) = llm_classifier(Completion::Text("¿Qué necesitas?".to_string()));
        let decision =
            classifier.classify(&transcript(&[(Role::User, "hola")])).await.expect("decision");
        assert_eq!(decision, RouteDecision::Respond("¿Qué necesitas?".to_string()));
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let (classifier, _) = llm_classifier(Completion::ToolCalls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "obtener_productos_odoo".to_string(),
            arguments: "{}".to_string(),
        }]));
        assert!(classifier.classify(&transcript(&[(Role::User, "hola")])).await.is_err());
    }
}
