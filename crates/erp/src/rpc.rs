use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::GatewayError;

/// Logical service on the Odoo JSON-RPC endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Common,
    Object,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Object => "object",
        }
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Invokes `service.method(*args)` and returns the raw `result` value.
    async fn call(
        &self,
        service: Service,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, GatewayError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u32,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: Service,
    method: &'a str,
    args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: Option<String>,
}

impl RpcErrorBody {
    fn describe(self) -> String {
        self.data
            .and_then(|data| data.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(self.message)
    }
}

/// JSON-RPC 2.0 over HTTP POST, one request per call.
#[derive(Clone, Debug)]
pub struct HttpRpcTransport {
    client: Client,
    url: String,
}

impl HttpRpcTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(
        &self,
        service: Service,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, GatewayError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams { service, method, args },
            id: rand::thread_rng().gen_range(1..=1_000_000),
        };
        debug!(
            event_name = "erp.rpc.request",
            service = service.as_str(),
            method,
            request_id = request.id,
            "sending ERP rpc call"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "ERP endpoint returned {}",
                response.status()
            )));
        }

        let payload: RpcResponse =
            response.json().await.map_err(|error| GatewayError::Decode(error.to_string()))?;

        if let Some(error) = payload.error {
            return Err(GatewayError::Remote(error.describe()));
        }

        Ok(payload.result.unwrap_or(Value::Null))
    }
}
