use serde::Serialize;
use serde_json::Value;
use wingdesk_core::Record;

use crate::error::GatewayError;

/// Wire shape of a query result: either the records or `{"error": message}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Records(Vec<Record>),
    Failure { error: String },
}

impl QueryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Records(records) => Value::Array(records.into_iter().map(Value::Object).collect()),
            Self::Failure { error } => serde_json::json!({ "error": error }),
        }
    }
}

impl From<Result<Vec<Record>, GatewayError>> for QueryOutcome {
    fn from(result: Result<Vec<Record>, GatewayError>) -> Self {
        match result {
            Ok(records) => Self::Records(records),
            Err(error) => Self::Failure { error: error.to_string() },
        }
    }
}
