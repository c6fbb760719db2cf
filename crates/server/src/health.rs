use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use wingdesk_erp::{ErpGateway, RpcTransport};

use crate::routes::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub erp: HealthCheck,
    pub checked_at: String,
}

/// Liveness only; never touches the ERP.
pub async fn ping() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let erp = erp_check(&state.gateway).await;
    let ready = erp.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "wingdesk-server runtime initialized".to_string(),
        },
        erp,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn erp_check<T>(gateway: &ErpGateway<T>) -> HealthCheck
where
    T: RpcTransport,
{
    match gateway.authenticate().await {
        Ok(session) => {
            HealthCheck { status: "ready", detail: format!("erp login succeeded (uid {})", session.uid) }
        }
        Err(error) => {
            warn!(
                event_name = "system.health.erp_degraded",
                correlation_id = "health",
                error = %error,
                "erp login check failed"
            );
            HealthCheck { status: "degraded", detail: error.to_string() }
        }
    }
}
