use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Triage,
    Sales,
    Operations,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Sales => "sales",
            Self::Operations => "operations",
        }
    }
}

/// Specialist a triage decision can hand the conversation to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Sales,
    Operations,
}

impl RouteTarget {
    pub fn role(&self) -> AgentRole {
        match self {
            Self::Sales => AgentRole::Sales,
            Self::Operations => AgentRole::Operations,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingState {
    Start,
    TriageEvaluating,
    SalesAgentActive,
    OpsAgentActive,
    TriageResponding,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingEvent {
    TriageStarted,
    HandedOff(RouteTarget),
    TriageAnswered,
    ReplyProduced,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTransition {
    pub from: RoutingState,
    pub to: RoutingState,
    pub event: RoutingEvent,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingTransitionError {
    #[error("invalid routing transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RoutingState, event: RoutingEvent },
}

/// Per-request routing lifecycle. Handoff is one hop: once a specialist is active
/// the only ways forward are a reply or a failure.
#[derive(Clone, Debug, Default)]
pub struct RoutingEngine;

impl RoutingEngine {
    pub fn initial_state(&self) -> RoutingState {
        RoutingState::Start
    }

    pub fn apply(
        &self,
        current: RoutingState,
        event: RoutingEvent,
    ) -> Result<RoutingTransition, RoutingTransitionError> {
        use RoutingEvent::{Failed, HandedOff, ReplyProduced, TriageAnswered, TriageStarted};
        use RoutingState::{
            Done, OpsAgentActive, SalesAgentActive, Start, TriageEvaluating, TriageResponding,
        };

        let to = match (current, event) {
            (Start, TriageStarted) => TriageEvaluating,
            (TriageEvaluating, HandedOff(RouteTarget::Sales)) => SalesAgentActive,
            (TriageEvaluating, HandedOff(RouteTarget::Operations)) => OpsAgentActive,
            (TriageEvaluating, TriageAnswered) => TriageResponding,
            (SalesAgentActive, ReplyProduced)
            | (OpsAgentActive, ReplyProduced)
            | (TriageResponding, ReplyProduced) => Done,
            (Done, _) => {
                return Err(RoutingTransitionError::InvalidTransition { state: current, event })
            }
            (_, Failed) => Done,
            _ => return Err(RoutingTransitionError::InvalidTransition { state: current, event }),
        };

        Ok(RoutingTransition { from: current, to, event })
    }
}
