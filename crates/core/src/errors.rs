use thiserror::Error;

use crate::domain::routing::RoutingTransitionError;

pub const FALLBACK_REPLY: &str =
    "Lo siento, ahora mismo no puedo responder a tu consulta. Inténtalo de nuevo en unos minutos.";
pub const GUARDRAIL_REPLY: &str =
    "Lo siento, no puedo ayudarte con esa petición. ¿Hay algo más sobre nuestros productos en lo que pueda ayudarte?";

/// Every failure the chat path can hit. Each one degrades to a textual reply.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("erp authentication failed: {0}")]
    Authentication(String),
    #[error("erp query failed: {0}")]
    Query(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("input rejected by guardrail `{reason_code}`")]
    GuardrailRejected { reason_code: String, user_message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Query(_) => "query",
            Self::Transport(_) => "transport",
            Self::GuardrailRejected { .. } => "guardrail",
            Self::Internal(_) => "internal",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::GuardrailRejected { user_message, .. } if !user_message.trim().is_empty() => {
                user_message
            }
            Self::GuardrailRejected { .. } => GUARDRAIL_REPLY,
            Self::Authentication(_)
            | Self::Query(_)
            | Self::Transport(_)
            | Self::Internal(_) => FALLBACK_REPLY,
        }
    }
}

impl From<RoutingTransitionError> for ApplicationError {
    fn from(value: RoutingTransitionError) -> Self {
        Self::Internal(value.to_string())
    }
}
