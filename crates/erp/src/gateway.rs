use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};
use wingdesk_core::config::ErpConfig;
use wingdesk_core::domain::record::record_id;
use wingdesk_core::{Record, SearchDomain};

use crate::collections::Collection;
use crate::error::GatewayError;
use crate::rpc::{HttpRpcTransport, RpcTransport, Service};

#[derive(Clone, Debug)]
pub struct ErpCredentials {
    pub database: String,
    pub login: String,
    pub api_key: SecretString,
}

impl From<&ErpConfig> for ErpCredentials {
    fn from(config: &ErpConfig) -> Self {
        Self {
            database: config.database.clone(),
            login: config.login.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

/// Authenticated ERP user id, valid for the lifetime of one logical query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub uid: i64,
}

pub struct ErpGateway<T = HttpRpcTransport> {
    transport: T,
    credentials: ErpCredentials,
}

impl ErpGateway<HttpRpcTransport> {
    pub fn from_config(config: &ErpConfig) -> Self {
        Self::new(HttpRpcTransport::new(config.url.clone()), ErpCredentials::from(config))
    }
}

impl<T> ErpGateway<T>
where
    T: RpcTransport,
{
    pub fn new(transport: T, credentials: ErpCredentials) -> Self {
        Self { transport, credentials }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn authenticate(&self) -> Result<Session, GatewayError> {
        let result = self
            .transport
            .call(
                Service::Common,
                "login",
                vec![
                    json!(self.credentials.database),
                    json!(self.credentials.login),
                    json!(self.credentials.api_key.expose_secret()),
                ],
            )
            .await
            .map_err(|error| match error {
                GatewayError::Remote(message) | GatewayError::Decode(message) => {
                    GatewayError::Authentication(message)
                }
                other => other,
            })?;

        match result.as_i64() {
            Some(uid) => Ok(Session { uid }),
            None => {
                warn!(
                    event_name = "erp.auth.rejected",
                    login = %self.credentials.login,
                    "ERP login did not return a user id"
                );
                Err(GatewayError::Authentication(format!("login returned {result}")))
            }
        }
    }

    pub async fn list_products(
        &self,
        domain: Option<SearchDomain>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let session = self.authenticate().await?;
        self.search_and_read(session, Collection::Products, domain, limit).await
    }

    pub async fn list_inventory(
        &self,
        domain: Option<SearchDomain>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let session = self.authenticate().await?;
        self.search_and_read(session, Collection::Inventory, domain, limit).await
    }

    pub async fn list_purchase_orders(
        &self,
        domain: Option<SearchDomain>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let session = self.authenticate().await?;
        self.search_and_read(session, Collection::PurchaseOrders, domain, limit).await
    }

    /// Purchase orders with their lines nested under `lines`. Logs in once and
    /// reuses that session for every per-order line lookup.
    pub async fn list_purchase_orders_detailed(
        &self,
        domain: Option<SearchDomain>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let session = self.authenticate().await?;
        let mut orders =
            self.search_and_read(session, Collection::PurchaseOrders, domain, limit).await?;

        // TODO: fetch lines for all orders with one `order_id in [...]` search_read and
        // group them locally; this loop costs one round trip per order.
        for order in &mut orders {
            let lines = match record_id(order) {
                Some(order_id) => self.order_lines_with_session(session, order_id).await?,
                None => Vec::new(),
            };
            order.insert(
                "lines".to_string(),
                Value::Array(lines.into_iter().map(Value::Object).collect()),
            );
        }

        debug!(
            event_name = "erp.query.detailed_orders",
            orders = orders.len(),
            "expanded purchase orders with lines"
        );
        Ok(orders)
    }

    pub async fn list_order_lines(&self, order_id: i64) -> Result<Vec<Record>, GatewayError> {
        let session = self.authenticate().await?;
        self.order_lines_with_session(session, order_id).await
    }

    async fn order_lines_with_session(
        &self,
        session: Session,
        order_id: i64,
    ) -> Result<Vec<Record>, GatewayError> {
        let collection = Collection::PurchaseOrderLines;
        let domain = SearchDomain::all().with("order_id", "=", order_id);
        let result = self
            .execute(
                session,
                collection,
                "search_read",
                vec![domain.to_value(), fields_value(collection)],
            )
            .await?;
        decode_records(result)
    }

    async fn search_and_read(
        &self,
        session: Session,
        collection: Collection,
        domain: Option<SearchDomain>,
        limit: Option<u32>,
    ) -> Result<Vec<Record>, GatewayError> {
        let ids = self.search(session, collection, &SearchDomain::normalize(domain), limit).await?;
        let result = self
            .execute(
                session,
                collection,
                "read",
                vec![Value::Array(ids.into_iter().map(Value::from).collect()), fields_value(collection)],
            )
            .await?;
        decode_records(result)
    }

    async fn search(
        &self,
        session: Session,
        collection: Collection,
        domain: &SearchDomain,
        limit: Option<u32>,
    ) -> Result<Vec<i64>, GatewayError> {
        let mut args = vec![domain.to_value()];
        if let Some(limit) = limit {
            args.push(json!(0));
            args.push(json!(limit));
        }

        let result = self.execute(session, collection, "search", args).await?;
        let ids = result
            .as_array()
            .map(|items| items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>())
            .ok_or_else(|| GatewayError::Decode(format!("search returned {result}")))?
            .ok_or_else(|| GatewayError::Decode("search returned non-integer ids".to_string()))?;

        if ids.is_empty() {
            return Err(GatewayError::EmptySearch { collection });
        }
        Ok(ids)
    }

    async fn execute(
        &self,
        session: Session,
        collection: Collection,
        operation: &str,
        extra: Vec<Value>,
    ) -> Result<Value, GatewayError> {
        let mut args = vec![
            json!(self.credentials.database),
            json!(session.uid),
            json!(self.credentials.api_key.expose_secret()),
            json!(collection.model()),
            json!(operation),
        ];
        args.extend(extra);
        self.transport.call(Service::Object, "execute", args).await
    }
}

fn fields_value(collection: Collection) -> Value {
    json!(collection.fields())
}

fn decode_records(result: Value) -> Result<Vec<Record>, GatewayError> {
    match result {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(GatewayError::Decode(format!("expected record object, got {other}"))),
            })
            .collect(),
        other => Err(GatewayError::Decode(format!("expected record list, got {other}"))),
    }
}
