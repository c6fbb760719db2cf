use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use wingdesk_agent::tools::ErpQuery;
use wingdesk_agent::{ChatOrchestrator, TraceContext};
use wingdesk_core::errors::FALLBACK_REPLY;
use wingdesk_core::{SearchDomain, Transcript};
use wingdesk_erp::{ErpGateway, QueryOutcome};

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ErpGateway>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .route("/chat", post(chat))
        .route("/productos", get(products))
        .route("/inventario", get(inventory))
        .route("/pedidos_compra", get(purchase_orders))
        .route("/pedidos_compra_detallado", get(purchase_orders_detailed))
        .route("/lineas_pedido/{order_id}", get(order_lines))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The widget sends `null` on the first turn.
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    pub user_message: String,
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let trace = TraceContext::new("chat");

    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            warn!(
                event_name = "chat.request.rejected",
                correlation_id = %trace.trace_id,
                error = %rejection,
                "chat payload could not be decoded"
            );
            return Json(json!({ "response": FALLBACK_REPLY }));
        }
    };

    let transcript = Transcript::from_chat(
        request.history.unwrap_or_default().into_iter().map(|entry| (entry.role, entry.content)),
        &request.user_message,
    );
    let reply = state.orchestrator.reply(&transcript, &trace).await;
    info!(
        event_name = "chat.request.completed",
        correlation_id = %trace.trace_id,
        agent = reply.agent.as_str(),
        final_state = ?reply.final_state,
        turns = transcript.len(),
        "chat reply produced"
    );

    let text = if reply.text.trim().is_empty() { FALLBACK_REPLY.to_string() } else { reply.text };
    Json(json!({ "response": text }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub domain: Option<String>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn search_domain(&self) -> Result<Option<SearchDomain>, Response> {
        match self.domain.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            None => Ok(None),
            Some(raw) => SearchDomain::parse_json(raw)
                .map(Some)
                .map_err(|error| bad_request(format!("invalid domain filter: {error}"))),
        }
    }
}

fn list_params(
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<(Option<SearchDomain>, Option<u32>), Response> {
    let Query(query) = query.map_err(|rejection| {
        bad_request(format!("invalid query parameters: {}", rejection.body_text()))
    })?;
    Ok((query.search_domain()?, query.limit))
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn products(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let (domain, limit) = list_params(query)?;
    let result = state.gateway.list_products(domain, limit).await;
    Ok(outcome_response(ErpQuery::Products, result.into()))
}

async fn inventory(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let (domain, limit) = list_params(query)?;
    let result = state.gateway.list_inventory(domain, limit).await;
    Ok(outcome_response(ErpQuery::Inventory, result.into()))
}

async fn purchase_orders(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let (domain, limit) = list_params(query)?;
    let result = state.gateway.list_purchase_orders(domain, limit).await;
    Ok(outcome_response(ErpQuery::PurchaseOrders, result.into()))
}

async fn purchase_orders_detailed(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, Response> {
    let (domain, limit) = list_params(query)?;
    let result = state.gateway.list_purchase_orders_detailed(domain, limit).await;
    Ok(outcome_response(ErpQuery::PurchaseOrdersDetailed, result.into()))
}

async fn order_lines(
    State(state): State<AppState>,
    order_id: Result<Path<i64>, PathRejection>,
) -> Result<Response, Response> {
    let Path(order_id) = order_id.map_err(|rejection| {
        bad_request(format!("invalid order id: {}", rejection.body_text()))
    })?;
    let result = state.gateway.list_order_lines(order_id).await;
    Ok(outcome_response(ErpQuery::OrderLines, result.into()))
}

fn outcome_response(query_kind: ErpQuery, outcome: QueryOutcome) -> Response {
    if let QueryOutcome::Failure { error } = &outcome {
        warn!(
            event_name = "erp.query.failed",
            query = query_kind.tool_name(),
            error = %error,
            "erp query returned an error payload"
        );
    }
    (StatusCode::OK, Json(outcome.into_value())).into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wingdesk_agent::{Completion, CompletionRequest, LlmClient};
    use wingdesk_core::config::{AppConfig, RouterStrategy};
    use wingdesk_core::errors::FALLBACK_REPLY;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::router;
    use crate::bootstrap::build_state;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Completion>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    fn rpc(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    async fn mount_odoo(server: &MockServer, uid: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"service": "common"}})))
            .respond_with(rpc(uid))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"args": ["shop", 2, "erp-key", "product.template", "search"]}})))
            .respond_with(rpc(json!([1, 2])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"args": ["shop", 2, "erp-key", "product.template", "read"]}})))
            .respond_with(rpc(json!([
                {"id": 1, "name": "Ala 5m", "type": "consu", "list_price": 899.0, "default_code": "WING-5"},
                {"id": 2, "name": "Tabla 95L", "type": "consu", "list_price": 1190.0, "default_code": "BOARD-95"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"args": ["shop", 2, "erp-key", "purchase.order.line", "search_read", [["order_id", "=", 123]]]}})))
            .respond_with(rpc(json!([
                {"id": 1, "product_id": [1, "Ala 5m"], "product_qty": 5.0, "product_uom": [1, "Units"],
                 "date_planned": "2024-05-10 00:00:00", "location_dest_id": [8, "WH/Stock"]},
                {"id": 2, "product_id": [2, "Tabla 95L"], "product_qty": 2.0, "product_uom": [1, "Units"],
                 "date_planned": "2024-05-12 00:00:00", "location_dest_id": [8, "WH/Stock"]}
            ])))
            .mount(server)
            .await;
    }

    fn app(erp_url: String, replies: Vec<Completion>) -> axum::Router {
        let mut config = AppConfig::default();
        config.erp.url = erp_url;
        config.erp.database = "shop".to_string();
        config.erp.login = "bot@example.com".to_string();
        config.erp.api_key = "erp-key".to_string().into();
        config.agents.router = RouterStrategy::Keyword;

        let llm = Arc::new(ScriptedLlm { replies: Mutex::new(replies.into()) });
        router(build_state(&config, llm))
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn chat(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn ping_answers_ok() {
        let (status, body) = send(app("http://127.0.0.1:9".to_string(), Vec::new()), get("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn products_return_projected_records() {
        let server = MockServer::start().await;
        mount_odoo(&server, json!(2)).await;

        let (status, body) = send(app(server.uri(), Vec::new()), get("/productos")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[0]["default_code"], json!("WING-5"));
    }

    #[tokio::test]
    async fn order_lines_for_order_123_return_two_lines() {
        let server = MockServer::start().await;
        mount_odoo(&server, json!(2)).await;

        let (status, body) = send(app(server.uri(), Vec::new()), get("/lineas_pedido/123")).await;
        assert_eq!(status, StatusCode::OK);
        let lines = body.as_array().expect("line array");
        assert_eq!(lines.len(), 2);
        for line in lines {
            for field in ["product_id", "product_qty", "product_uom", "date_planned", "location_dest_id"] {
                assert!(line.get(field).is_some(), "missing {field}");
            }
        }
    }

    #[tokio::test]
    async fn failed_login_is_reported_as_error_payload() {
        let server = MockServer::start().await;
        mount_odoo(&server, json!(false)).await;

        let (status, body) = send(app(server.uri(), Vec::new()), get("/inventario")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_domain_is_a_bad_request() {
        let (status, body) = send(
            app("http://127.0.0.1:9".to_string(), Vec::new()),
            get("/pedidos_compra?domain=%5B%5B%22state%22"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|error| error.contains("invalid domain")));
    }

    #[tokio::test]
    async fn non_numeric_limit_and_order_id_get_json_errors() {
        for uri in ["/productos?limit=abc", "/lineas_pedido/abc"] {
            let (status, body) =
                send(app("http://127.0.0.1:9".to_string(), Vec::new()), get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri}: {body}");
        }
    }

    #[tokio::test]
    async fn chat_accepts_null_history() {
        let app = app(
            "http://127.0.0.1:9".to_string(),
            vec![Completion::Text("Tenemos alas desde 5 m².".to_string())],
        );

        let (status, body) =
            send(app, chat(json!({"history": null, "user_message": "quiero comprar un ala"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], json!("Tenemos alas desde 5 m²."));
    }

    #[tokio::test]
    async fn chat_routes_to_sales_and_returns_reply() {
        let app = app(
            "http://127.0.0.1:9".to_string(),
            vec![Completion::Text("El Ala 5m es ideal para empezar.".to_string())],
        );

        let (status, body) = send(
            app,
            chat(json!({
                "history": [{"role": "assistant", "content": "¡Hola! ¿En qué te ayudo?"}],
                "user_message": "quiero comprar un ala"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], json!("El Ala 5m es ideal para empezar."));
    }

    #[tokio::test]
    async fn chat_always_answers_even_when_the_model_fails() {
        let (status, body) = send(
            app("http://127.0.0.1:9".to_string(), Vec::new()),
            chat(json!({"user_message": "quiero comprar un ala"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], json!(FALLBACK_REPLY));
    }

    #[tokio::test]
    async fn chat_with_undecodable_body_still_answers() {
        let (status, body) = send(
            app("http://127.0.0.1:9".to_string(), Vec::new()),
            chat(json!({"history": "not a list"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["response"].as_str().is_some_and(|text| !text.is_empty()));
    }
}
