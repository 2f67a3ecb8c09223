//! Reverse proxy router: forwards inbound requests under a registered
//! route prefix to the mapped downstream service.
//!
//! The forward path runs through a typed stage chain
//! (`before_forward` / `after_forward` / `on_error`) instead of
//! side-effecting callbacks. The built-in `StatusRecorder` stage
//! reconciles the status table from live traffic.
//!
//! The router never retries a forward. Retry lives on the client side
//! of the wire, where the caller controls idempotency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::Client;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::{relay_response, NotFoundEnvelope, UnavailableEnvelope, REQUEST_ID_HEADER};
use crate::state::AppState;

/// Request bodies above this size are rejected before forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Everything the gateway carries about one in-flight proxied request.
/// Created per inbound request, dropped when the response is sent.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub correlation_id: String,
    pub target_service: String,
    pub target_url: String,
}

impl ProxiedRequest {
    /// True for auth-service registration flows, which get their own
    /// user-facing failure message.
    pub fn is_registration(&self) -> bool {
        self.target_service == "auth" && self.path.contains("register")
    }
}

/// Result of a completed forward (an HTTP response came back, whatever
/// its status).
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    pub status: u16,
    pub response_time_ms: u64,
}

/// A connection-level forward failure: no HTTP response was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("downstream unreachable: {detail}")]
pub struct ForwardError {
    pub detail: String,
}

/// Tagged result of a `before_forward` stage.
pub enum StageFlow {
    Continue,
    /// Short-circuit: respond without forwarding.
    Halt(Response),
}

/// One typed extension point on the forward path.
pub trait ProxyStage: Send + Sync {
    fn before_forward(&self, _request: &mut ProxiedRequest) -> StageFlow {
        StageFlow::Continue
    }

    fn after_forward(&self, _request: &ProxiedRequest, _outcome: &ForwardOutcome) {}

    fn on_error(&self, _request: &ProxiedRequest, _error: &ForwardError) {}
}

/// Built-in stage: writes live-traffic observations into the status
/// table. Live traffic marks >=500 unavailable: a service answering
/// 500s is reachable but not serving.
pub struct StatusRecorder {
    status: crate::status::StatusTable,
}

impl StatusRecorder {
    pub fn new(status: crate::status::StatusTable) -> Self {
        Self { status }
    }
}

impl ProxyStage for StatusRecorder {
    fn after_forward(&self, request: &ProxiedRequest, outcome: &ForwardOutcome) {
        if outcome.status >= 500 {
            self.status
                .mark_unavailable(&request.target_service, &format!("HTTP {}", outcome.status));
        } else {
            self.status
                .mark_available(&request.target_service, Some(outcome.response_time_ms));
        }
    }

    fn on_error(&self, request: &ProxiedRequest, error: &ForwardError) {
        self.status
            .mark_unavailable(&request.target_service, &error.detail);
    }
}

/// Fallback handler: everything not handled by the status routes lands
/// here. Resolves the route prefix, forwards, or answers 404.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    let Some((service, remainder)) = state.registry.resolve(&path) else {
        return NotFoundEnvelope::new(&path, &correlation_id).into_response();
    };

    let method = match reqwest::Method::from_bytes(parts.method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };

    let authorization = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_type = parts
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let target_url = match &query {
        Some(q) => format!("{}{}?{}", service.base_url, remainder, q),
        None => format!("{}{}", service.base_url, remainder),
    };

    let proxied = ProxiedRequest {
        method,
        path: remainder,
        query,
        authorization,
        content_type,
        body,
        correlation_id,
        target_service: service.name.to_string(),
        target_url,
    };

    forward(
        &state.http,
        &state.stages,
        proxied,
        Duration::from_secs(state.config.proxy_timeout_secs),
    )
    .await
}

/// Forwards one proxied request through the stage chain.
pub async fn forward(
    http: &Client,
    stages: &[Arc<dyn ProxyStage>],
    mut proxied: ProxiedRequest,
    timeout: Duration,
) -> Response {
    for stage in stages {
        if let StageFlow::Halt(response) = stage.before_forward(&mut proxied) {
            return response;
        }
    }

    let mut outbound = http
        .request(proxied.method.clone(), &proxied.target_url)
        .timeout(timeout)
        .header(REQUEST_ID_HEADER, &proxied.correlation_id);
    if let Some(auth) = &proxied.authorization {
        outbound = outbound.header(reqwest::header::AUTHORIZATION, auth);
    }
    if let Some(ct) = &proxied.content_type {
        outbound = outbound.header(reqwest::header::CONTENT_TYPE, ct);
    }
    if !proxied.body.is_empty() {
        outbound = outbound.body(proxied.body.clone());
    }

    let started = Instant::now();
    let upstream = match outbound.send().await {
        Ok(response) => response,
        Err(e) => {
            let error = ForwardError {
                detail: e.to_string(),
            };
            warn!(
                service = %proxied.target_service,
                request_id = %proxied.correlation_id,
                error = %error.detail,
                "downstream unreachable"
            );
            for stage in stages {
                stage.on_error(&proxied, &error);
            }
            return unavailable(&proxied, &error.detail);
        }
    };

    let outcome = ForwardOutcome {
        status: upstream.status().as_u16(),
        response_time_ms: started.elapsed().as_millis() as u64,
    };
    for stage in stages {
        stage.after_forward(&proxied, &outcome);
    }

    if outcome.status >= 500 {
        warn!(
            service = %proxied.target_service,
            request_id = %proxied.correlation_id,
            status = outcome.status,
            "downstream server error"
        );
        return unavailable(&proxied, &format!("HTTP {}", outcome.status));
    }

    info!(
        service = %proxied.target_service,
        request_id = %proxied.correlation_id,
        status = outcome.status,
        elapsed_ms = outcome.response_time_ms,
        "forwarded"
    );

    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            // The response line arrived but the body transfer died.
            let error = ForwardError {
                detail: e.to_string(),
            };
            for stage in stages {
                stage.on_error(&proxied, &error);
            }
            return unavailable(&proxied, &error.detail);
        }
    };

    relay_response(status, content_type, body, &proxied.correlation_id)
}

fn unavailable(proxied: &ProxiedRequest, detail: &str) -> Response {
    let envelope = if proxied.is_registration() {
        UnavailableEnvelope::for_registration(detail, &proxied.correlation_id)
    } else {
        UnavailableEnvelope::new(&proxied.target_service, detail, &proxied.correlation_id)
    };
    envelope.into_response()
}
