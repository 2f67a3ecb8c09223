//! Uniform JSON error envelopes returned by the gateway itself.
//!
//! Downstream failures and unmatched routes never fall through as bare
//! transport errors; callers always get a structured body carrying
//! the correlation id for support diagnosis.

use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Body of the 503 envelope returned when a downstream service is
/// unreachable or answers with a server error.
#[derive(Debug, Serialize)]
pub struct UnavailableEnvelope {
    pub status: &'static str,
    pub message: String,
    pub error: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: String,
    pub suggestions: Vec<String>,
}

impl UnavailableEnvelope {
    pub fn new(service: &str, detail: &str, request_id: &str) -> Self {
        Self {
            status: "error",
            message: format!("{service} service temporarily unavailable"),
            error: detail.to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            suggestions: vec![
                "Please try again in a few moments".to_string(),
                "Check overall service status at /api/gateway-status".to_string(),
                "Contact support with the request id if the problem persists".to_string(),
            ],
        }
    }

    /// Registration flows carry their own user-facing message in
    /// place of the generic one.
    pub fn for_registration(detail: &str, request_id: &str) -> Self {
        let mut envelope = Self::new("auth", detail, request_id);
        envelope.message =
            "Registration is temporarily unavailable, please try again shortly".to_string();
        envelope
    }

    pub fn into_response(self) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(self)).into_response();
        stamp_request_id(&mut response, &request_id);
        response
    }
}

/// Body of the 404 envelope for paths under no registered route prefix.
#[derive(Debug, Serialize)]
pub struct NotFoundEnvelope {
    pub status: &'static str,
    pub message: &'static str,
    pub path: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub suggestions: Vec<String>,
}

impl NotFoundEnvelope {
    pub fn new(path: &str, request_id: &str) -> Self {
        Self {
            status: "error",
            message: "Route not found",
            path: path.to_string(),
            request_id: request_id.to_string(),
            suggestions: vec![
                "Check the request path for typos".to_string(),
                "See /api/gateway-status for the list of routed services".to_string(),
            ],
        }
    }

    pub fn into_response(self) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (StatusCode::NOT_FOUND, Json(self)).into_response();
        stamp_request_id(&mut response, &request_id);
        response
    }
}

/// Sets `X-Request-ID` on an outgoing response.
pub fn stamp_request_id(response: &mut Response, request_id: &str) {
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

/// Builds a response that relays a downstream body verbatim.
pub fn relay_response(
    status: StatusCode,
    content_type: Option<String>,
    body: bytes::Bytes,
    request_id: &str,
) -> Response {
    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }
    let mut response = builder
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response());
    stamp_request_id(&mut response, request_id);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_envelope_shape() {
        let envelope = UnavailableEnvelope::new("cv", "connection refused", "req-1");
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "cv service temporarily unavailable");
        assert_eq!(value["error"], "connection refused");
        assert_eq!(value["requestId"], "req-1");
        assert!(value["timestamp"].as_str().is_some());
        assert!(value["suggestions"].as_array().unwrap().len() >= 2);
    }

    #[test]
    fn test_registration_envelope_replaces_message() {
        let envelope = UnavailableEnvelope::for_registration("connection refused", "req-2");
        assert!(envelope.message.contains("Registration"));
        assert_eq!(envelope.error, "connection refused");
    }

    #[test]
    fn test_not_found_envelope_carries_path() {
        let envelope = NotFoundEnvelope::new("/api/nope", "req-3");
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["message"], "Route not found");
        assert_eq!(value["path"], "/api/nope");
        assert_eq!(value["requestId"], "req-3");
    }
}
