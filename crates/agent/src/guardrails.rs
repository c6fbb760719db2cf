use wingdesk_core::config::AgentsConfig;
use wingdesk_core::errors::GUARDRAIL_REPLY;
use wingdesk_core::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    pub fn into_result(self) -> Result<(), ApplicationError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { reason_code, user_message } => Err(ApplicationError::GuardrailRejected {
                reason_code: reason_code.to_string(),
                user_message,
            }),
        }
    }
}

/// Screens the customer's newest message before any model or ERP call is made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputGuardrail {
    max_message_chars: usize,
    blocked_phrases: Vec<String>,
}

impl Default for InputGuardrail {
    fn default() -> Self {
        Self { max_message_chars: 4000, blocked_phrases: Vec::new() }
    }
}

impl InputGuardrail {
    pub fn new(max_message_chars: usize, blocked_phrases: Vec<String>) -> Self {
        Self {
            max_message_chars,
            blocked_phrases: blocked_phrases
                .into_iter()
                .map(|phrase| phrase.trim().to_lowercase())
                .filter(|phrase| !phrase.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AgentsConfig) -> Self {
        Self::new(config.max_message_chars, config.blocked_phrases.clone())
    }

    pub fn evaluate(&self, message: &str) -> GuardrailDecision {
        if message.trim().is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "empty_message",
                user_message: "¿En qué puedo ayudarte? Escríbeme tu consulta.".to_string(),
            };
        }

        if message.chars().count() > self.max_message_chars {
            return GuardrailDecision::Deny {
                reason_code: "message_too_long",
                user_message: format!(
                    "Tu mensaje es demasiado largo. Resúmelo en menos de {} caracteres, por favor.",
                    self.max_message_chars
                ),
            };
        }

        let lowered = message.to_lowercase();
        if self.blocked_phrases.iter().any(|phrase| lowered.contains(phrase.as_str())) {
            return GuardrailDecision::Deny {
                reason_code: "blocked_phrase",
                user_message: GUARDRAIL_REPLY.to_string(),
            };
        }

        GuardrailDecision::Allow
    }
}
