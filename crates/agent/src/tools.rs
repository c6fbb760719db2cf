use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use wingdesk_core::SearchDomain;
use wingdesk_erp::{ErpGateway, HttpRpcTransport, QueryOutcome, RpcTransport};

use crate::llm::ToolDefinition;

pub const PRODUCTS_TOOL: &str = "obtener_productos_odoo";
pub const INVENTORY_TOOL: &str = "obtener_inventario_odoo";
pub const PURCHASE_ORDERS_TOOL: &str = "obtener_pedidos_compra_odoo";
pub const PURCHASE_ORDERS_DETAILED_TOOL: &str = "obtener_pedidos_compra_detallado_odoo";
pub const ORDER_LINES_TOOL: &str = "obtener_lineas_pedido_odoo";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the accepted arguments object.
    fn parameters(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for the named tools, in the order given. Unknown names are skipped.
    pub fn definitions(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The ERP read each tool performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErpQuery {
    Products,
    Inventory,
    PurchaseOrders,
    PurchaseOrdersDetailed,
    OrderLines,
}

impl ErpQuery {
    pub const ALL: [ErpQuery; 5] = [
        Self::Products,
        Self::Inventory,
        Self::PurchaseOrders,
        Self::PurchaseOrdersDetailed,
        Self::OrderLines,
    ];

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Products => PRODUCTS_TOOL,
            Self::Inventory => INVENTORY_TOOL,
            Self::PurchaseOrders => PURCHASE_ORDERS_TOOL,
            Self::PurchaseOrdersDetailed => PURCHASE_ORDERS_DETAILED_TOOL,
            Self::OrderLines => ORDER_LINES_TOOL,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Products => {
                "Devuelve productos de Odoo (name, type, list_price, default_code) según filtros y límite opcionales. Ejemplo de domain: [[\"type\", \"=\", \"consu\"]]."
            }
            Self::Inventory => {
                "Devuelve registros de inventario de Odoo (product_id, quantity, location_id) según filtros y límite opcionales. Ejemplo de domain: [[\"product_id\", \"=\", 123]]."
            }
            Self::PurchaseOrders => {
                "Devuelve pedidos de compra de Odoo (name, partner_id, date_order, state) según filtros y límite opcionales. Ejemplo de domain: [[\"state\", \"=\", \"purchase\"]]."
            }
            Self::PurchaseOrdersDetailed => {
                "Devuelve pedidos de compra con sus líneas anidadas en `lines`, según filtros y límite opcionales."
            }
            Self::OrderLines => {
                "Devuelve las líneas (product_id, product_qty, product_uom, date_planned, location_dest_id) de un pedido de compra concreto."
            }
        }
    }

    fn parameters(&self) -> Value {
        match self {
            Self::OrderLines => json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "integer", "description": "ID del pedido de compra."}
                },
                "required": ["order_id"],
            }),
            _ => json!({
                "type": "object",
                "properties": {
                    "domain": {
                        "type": "array",
                        "description": "Filtros de búsqueda Odoo: ternas [campo, operador, valor] u operadores lógicos.",
                        "items": {}
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Máximo de registros a devolver."
                    }
                },
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    domain: Option<SearchDomain>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LineArgs {
    order_id: i64,
}

/// One ERP read exposed to the model. The output is the serialized [`QueryOutcome`].
pub struct ErpTool<T = HttpRpcTransport> {
    gateway: Arc<ErpGateway<T>>,
    query: ErpQuery,
}

impl<T> ErpTool<T>
where
    T: RpcTransport,
{
    pub fn new(gateway: Arc<ErpGateway<T>>, query: ErpQuery) -> Self {
        Self { gateway, query }
    }

    async fn run(&self, input: Value) -> Result<QueryOutcome, String> {
        let input = if input.is_null() { json!({}) } else { input };

        let gateway = &self.gateway;
        let result = match self.query {
            ErpQuery::Products => {
                let args: ListArgs = parse_args(input)?;
                gateway.list_products(args.domain, args.limit).await
            }
            ErpQuery::Inventory => {
                let args: ListArgs = parse_args(input)?;
                gateway.list_inventory(args.domain, args.limit).await
            }
            ErpQuery::PurchaseOrders => {
                let args: ListArgs = parse_args(input)?;
                gateway.list_purchase_orders(args.domain, args.limit).await
            }
            ErpQuery::PurchaseOrdersDetailed => {
                let args: ListArgs = parse_args(input)?;
                gateway.list_purchase_orders_detailed(args.domain, args.limit).await
            }
            ErpQuery::OrderLines => {
                let args: LineArgs = parse_args(input)?;
                gateway.list_order_lines(args.order_id).await
            }
        };
        Ok(QueryOutcome::from(result))
    }
}

fn parse_args<A>(input: Value) -> Result<A, String>
where
    A: DeserializeOwned,
{
    serde_json::from_value(input).map_err(|error| format!("invalid arguments: {error}"))
}

#[async_trait]
impl<T> Tool for ErpTool<T>
where
    T: RpcTransport + 'static,
{
    fn name(&self) -> &'static str {
        self.query.tool_name()
    }

    fn description(&self) -> &'static str {
        self.query.description()
    }

    fn parameters(&self) -> Value {
        self.query.parameters()
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let outcome = match self.run(input).await {
            Ok(outcome) => outcome,
            Err(message) => {
                warn!(
                    event_name = "agent.tool.invalid_arguments",
                    tool = self.name(),
                    error = %message,
                    "tool called with invalid arguments"
                );
                QueryOutcome::Failure { error: message }
            }
        };

        info!(
            event_name = "agent.tool.completed",
            tool = self.name(),
            failed = outcome.is_failure(),
            "ERP tool completed"
        );
        Ok(outcome.into_value())
    }
}

/// Registers all five ERP tools against one shared gateway.
pub fn register_erp_tools<T>(registry: &mut ToolRegistry, gateway: Arc<ErpGateway<T>>)
where
    T: RpcTransport + 'static,
{
    for query in ErpQuery::ALL {
        registry.register(ErpTool::new(Arc::clone(&gateway), query));
    }
}
