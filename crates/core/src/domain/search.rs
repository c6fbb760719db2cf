use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of an Odoo search domain: a `[field, operator, value]` triple or a
/// prefix logical operator (`&`, `|`, `!`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainTerm {
    Condition(String, String, Value),
    Operator(String),
}

/// Search predicate forwarded verbatim to the ERP. Empty means "all records".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchDomain(Vec<DomainTerm>);

impl SearchDomain {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.0.push(DomainTerm::Condition(field.into(), operator.into(), value.into()));
        self
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn normalize(domain: Option<Self>) -> Self {
        domain.unwrap_or_default()
    }

    pub fn terms(&self) -> &[DomainTerm] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|term| match term {
                    DomainTerm::Condition(field, operator, value) => Value::Array(vec![
                        Value::String(field.clone()),
                        Value::String(operator.clone()),
                        value.clone(),
                    ]),
                    DomainTerm::Operator(operator) => Value::String(operator.clone()),
                })
                .collect(),
        )
    }
}

impl From<Vec<DomainTerm>> for SearchDomain {
    fn from(terms: Vec<DomainTerm>) -> Self {
        Self(terms)
    }
}
