//! Remote Data Gateway for the Odoo ERP.
//!
//! Every query authenticates against the `common` service, searches a collection
//! through the `object` service and reads back a fixed field projection. Failures
//! never escape as panics: callers get a [`GatewayError`], which renders as a
//! `{"error": ...}` payload through [`QueryOutcome`].

pub mod collections;
pub mod error;
pub mod gateway;
pub mod outcome;
pub mod rpc;

pub use collections::Collection;
pub use error::GatewayError;
pub use gateway::{ErpCredentials, ErpGateway, Session};
pub use outcome::QueryOutcome;
pub use rpc::{HttpRpcTransport, RpcTransport, Service};
