//! Read-only aggregation endpoints over the registry and status table,
//! for external monitoring and alerting.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::envelope::stamp_request_id;
use crate::health::HealthMonitor;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct HealthQuery {
    /// `?check=true` probes all services live before answering.
    #[serde(default)]
    pub check: bool,
}

/// GET /api/health
/// Cached status by default; 200 when every service is available,
/// 503 otherwise.
pub async fn health_handler(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    if query.check {
        let monitor = HealthMonitor::new(
            state.http.clone(),
            (*state.registry).clone(),
            state.status.clone(),
            Duration::from_secs(state.config.probe_timeout_secs),
            Duration::from_secs(state.config.health_interval_secs),
        );
        monitor.probe_all().await;
    }

    let healthy = state.status.all_available();
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "services": state.status.snapshot(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    let mut response = (code, Json(body)).into_response();
    stamp_request_id(&mut response, &Uuid::new_v4().to_string());
    response
}

/// GET /api/gateway-status
/// Always 200: the full registry joined with the status table, plus
/// gateway metadata.
pub async fn gateway_status_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();
    let services: Vec<serde_json::Value> = state
        .registry
        .all()
        .iter()
        .map(|service| {
            json!({
                "name": service.name,
                "baseUrl": service.base_url,
                "status": snapshot.get(service.name),
            })
        })
        .collect();

    let body = json!({
        "gateway": {
            "service": "gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": state.uptime_seconds(),
        },
        "services": services,
        "timestamp": Utc::now().to_rfc3339(),
    });

    let mut response = (StatusCode::OK, Json(body)).into_response();
    stamp_request_id(&mut response, &Uuid::new_v4().to_string());
    response
}
