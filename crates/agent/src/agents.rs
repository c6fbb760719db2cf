use wingdesk_core::config::AppConfig;
use wingdesk_core::{AgentRole, RouteTarget};

use crate::tools::{
    INVENTORY_TOOL, ORDER_LINES_TOOL, PRODUCTS_TOOL, PURCHASE_ORDERS_DETAILED_TOOL,
    PURCHASE_ORDERS_TOOL,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub role: AgentRole,
    pub name: &'static str,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<&'static str>,
    pub handoffs: Vec<RouteTarget>,
}

impl AgentDescriptor {
    /// Name of the function the triage model calls to hand off to `target`.
    pub fn transfer_function(target: RouteTarget) -> String {
        format!("transfer_to_{}", agent_name(target.role()))
    }
}

pub fn agent_name(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Triage => "triage_agent",
        AgentRole::Sales => "crm_agent",
        AgentRole::Operations => "internal_ops_agent",
    }
}

/// The three agents of the storefront, built once from config.
#[derive(Clone, Debug)]
pub struct AgentCatalog {
    triage: AgentDescriptor,
    sales: AgentDescriptor,
    operations: AgentDescriptor,
}

impl AgentCatalog {
    pub fn from_config(config: &AppConfig) -> Self {
        let model = &config.llm.model;
        Self {
            triage: AgentDescriptor {
                role: AgentRole::Triage,
                name: agent_name(AgentRole::Triage),
                instructions: TRIAGE_INSTRUCTIONS.to_string(),
                model: model.clone(),
                tools: Vec::new(),
                handoffs: vec![RouteTarget::Sales, RouteTarget::Operations],
            },
            sales: AgentDescriptor {
                role: AgentRole::Sales,
                name: agent_name(AgentRole::Sales),
                instructions: sales_instructions(&config.agents.contact_url),
                model: model.clone(),
                tools: vec![PRODUCTS_TOOL, INVENTORY_TOOL],
                handoffs: Vec::new(),
            },
            operations: AgentDescriptor {
                role: AgentRole::Operations,
                name: agent_name(AgentRole::Operations),
                instructions: OPERATIONS_INSTRUCTIONS.to_string(),
                model: model.clone(),
                tools: vec![
                    PRODUCTS_TOOL,
                    INVENTORY_TOOL,
                    PURCHASE_ORDERS_TOOL,
                    PURCHASE_ORDERS_DETAILED_TOOL,
                    ORDER_LINES_TOOL,
                ],
                handoffs: Vec::new(),
            },
        }
    }

    pub fn get(&self, role: AgentRole) -> &AgentDescriptor {
        match role {
            AgentRole::Triage => &self.triage,
            AgentRole::Sales => &self.sales,
            AgentRole::Operations => &self.operations,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&AgentDescriptor> {
        [&self.triage, &self.sales, &self.operations].into_iter().find(|agent| agent.name == name)
    }
}

const TRIAGE_INSTRUCTIONS: &str = "\
Eres el agente de recepción de una tienda online de wingfoil. Tu única tarea es decidir quién debe atender cada conversación.

- Si el usuario quiere comprar, pide consejo sobre material, precios, tallas, disponibilidad para comprar o información de productos, transfiere a crm_agent.
- Si la consulta trata de gestión interna (pedidos de compra, proveedores, recepciones, líneas de pedido, stock de almacén o logística), transfiere a internal_ops_agent.
- Si no está claro, responde tú con una sola pregunta breve para aclarar qué necesita.

No respondas preguntas de producto ni de pedidos por tu cuenta.";

fn sales_instructions(contact_url: &str) -> String {
    format!(
        "\
Eres un agente comercial experto en deportes acuáticos, especializado en wingfoil, y tu misión principal es vender los productos de nuestra tienda online. Tienes acceso a información actualizada de productos, stock y precios a través de las herramientas de Odoo.

- Atiendes a los clientes con un tono profesional, cercano y entusiasta, con conocimiento técnico real de los productos.
- Asesora y guía al cliente hacia el equipo ideal según su nivel, necesidades y presupuesto.
- Cuando sea relevante, sugiere productos concretos del catálogo destacando ventajas, características técnicas y diferencias entre modelos.
- Si el cliente busca algo específico, filtra y recomienda productos usando los datos de la tienda.
- Ante dudas de inventario, consulta Odoo y responde con precisión sobre disponibilidad, precios y variantes.
- Responde de forma consultiva, breve y clara. Haz preguntas para entender mejor al cliente antes de recomendar.
- Si el cliente está indeciso, ofrece comparativas y resalta promociones o novedades.
- Si el cliente solicita contacto humano, ofrécele el enlace directo a WhatsApp: {contact_url}

Nunca inventes información sobre productos que no existen en la tienda. Si no tienes datos suficientes, pide detalles o sugiere consultar con un asesor humano."
    )
}

const OPERATIONS_INSTRUCTIONS: &str = "\
Eres el agente de operaciones internas de una tienda de wingfoil. Ayudas al equipo con pedidos de compra, líneas de pedido, recepciones e inventario usando las herramientas de Odoo.

- Consulta siempre Odoo antes de responder sobre pedidos, cantidades, fechas previstas o ubicaciones.
- Para preguntas sobre un pedido concreto, localiza el pedido y revisa sus líneas.
- Responde de forma precisa y estructurada, citando referencias de pedido y producto.
- Si una herramienta devuelve un error o no hay datos, dilo claramente.
- Si la situación requiere intervención humana (incidencias con proveedores, discrepancias de stock, decisiones de compra), indícalo de forma explícita.

Nunca inventes datos de pedidos, cantidades ni fechas.";
