pub mod config;
pub mod domain;
pub mod errors;

pub use domain::record::Record;
pub use domain::routing::{
    AgentRole, RouteTarget, RoutingEngine, RoutingEvent, RoutingState, RoutingTransition,
    RoutingTransitionError,
};
pub use domain::search::{DomainTerm, SearchDomain};
pub use domain::transcript::{Role, Transcript, TranscriptEntry};
pub use errors::ApplicationError;
