use thiserror::Error;
use wingdesk_core::ApplicationError;

use crate::collections::Collection;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("could not authenticate against the ERP: {0}")]
    Authentication(String),
    #[error("no {} records found", .collection.label())]
    EmptySearch { collection: Collection },
    #[error("ERP returned an error: {0}")]
    Remote(String),
    #[error("ERP request failed: {0}")]
    Transport(String),
    #[error("unexpected ERP response: {0}")]
    Decode(String),
}

impl From<GatewayError> for ApplicationError {
    fn from(value: GatewayError) -> Self {
        let message = value.to_string();
        match value {
            GatewayError::Authentication(_) => Self::Authentication(message),
            GatewayError::EmptySearch { .. }
            | GatewayError::Remote(_)
            | GatewayError::Decode(_) => Self::Query(message),
            GatewayError::Transport(_) => Self::Transport(message),
        }
    }
}
