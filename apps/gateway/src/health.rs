//! Background health monitoring for registered services.
//!
//! The monitor polls `GET {base_url}/api/health` on every registered
//! service. Classification is deliberately liveness-oriented: any
//! response below 500 (4xx included) counts as available, because the
//! health endpoint only needs to be reachable, not successful. Live
//! proxied traffic applies the stricter >=500 rule (see `proxy.rs`).

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, warn};

use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::status::{HealthCheckResult, StatusTable};

pub struct HealthMonitor {
    http: Client,
    registry: ServiceRegistry,
    status: StatusTable,
    probe_timeout: Duration,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        http: Client,
        registry: ServiceRegistry,
        status: StatusTable,
        probe_timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            http,
            registry,
            status,
            probe_timeout,
            interval,
        }
    }

    /// Probes every registered service concurrently and merges the
    /// results into the status table. One probe's failure is isolated
    /// from the others; each produces its own record.
    pub async fn probe_all(&self) {
        let probes = self
            .registry
            .all()
            .iter()
            .map(|service| probe_service(&self.http, service, self.probe_timeout));

        for result in join_all(probes).await {
            if !result.available {
                warn!(
                    service = %result.service,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "health probe failed"
                );
            }
            self.status.apply(&result);
        }
    }

    /// Runs the periodic probe loop for the lifetime of the process.
    /// Never returns and never propagates a probe failure.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The startup sweep already ran; skip the interval's immediate
        // first tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("running periodic health sweep");
            self.probe_all().await;
        }
    }
}

/// Probes a single service's health endpoint.
///
/// Network error or timeout -> unavailable with the error message;
/// HTTP >=500 -> unavailable; anything below 500 -> available.
pub async fn probe_service(
    http: &Client,
    service: &ServiceDescriptor,
    timeout: Duration,
) -> HealthCheckResult {
    let url = format!("{}/api/health", service.base_url);
    let started = Instant::now();

    match http.get(&url).timeout(timeout).send().await {
        Ok(response) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let status = response.status();
            if status.is_server_error() {
                HealthCheckResult {
                    service: service.name.to_string(),
                    available: false,
                    response_time_ms: None,
                    error: Some(format!("HTTP {}", status.as_u16())),
                }
            } else {
                HealthCheckResult {
                    service: service.name.to_string(),
                    available: true,
                    response_time_ms: Some(elapsed_ms),
                    error: None,
                }
            }
        }
        Err(e) => HealthCheckResult {
            service: service.name.to_string(),
            available: false,
            response_time_ms: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn descriptor(name: &'static str, base_url: String) -> ServiceDescriptor {
        ServiceDescriptor { name, base_url }
    }

    #[tokio::test]
    async fn test_probe_healthy_service_records_response_time() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/health");
            then.status(200).json_body(serde_json::json!({"status": "ok"}));
        });

        let http = Client::new();
        let service = descriptor("cv", server.base_url());
        let result = probe_service(&http, &service, Duration::from_secs(10)).await;

        assert!(result.available);
        assert!(result.response_time_ms.is_some());
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_probe_counts_4xx_as_reachable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/health");
            then.status(404);
        });

        let http = Client::new();
        let service = descriptor("auth", server.base_url());
        let result = probe_service(&http, &service, Duration::from_secs(10)).await;

        // Reachability is the signal; a 404 health endpoint still means
        // the process is up.
        assert!(result.available);
    }

    #[tokio::test]
    async fn test_probe_counts_5xx_as_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/health");
            then.status(503);
        });

        let http = Client::new();
        let service = descriptor("export", server.base_url());
        let result = probe_service(&http, &service, Duration::from_secs(10)).await;

        assert!(!result.available);
        assert_eq!(result.error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_probe_connection_refused_records_error() {
        let http = Client::new();
        // Port 1 is never listening.
        let service = descriptor("payment", "http://127.0.0.1:1".to_string());
        let result = probe_service(&http, &service, Duration::from_secs(2)).await;

        assert!(!result.available);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_probe_all_isolates_failures_between_services() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/health");
            then.status(200);
        });

        let config = crate::config::Config {
            port: 0,
            rust_log: "info".to_string(),
            auth_service_url: server.base_url(),
            user_service_url: "http://127.0.0.1:1".to_string(), // refused
            cv_service_url: server.base_url(),
            export_service_url: server.base_url(),
            ai_service_url: server.base_url(),
            payment_service_url: server.base_url(),
            health_interval_secs: 60,
            probe_timeout_secs: 2,
            proxy_timeout_secs: 30,
        };
        let registry = ServiceRegistry::from_config(&config);
        let status = StatusTable::new();
        let monitor = HealthMonitor::new(
            Client::new(),
            registry.clone(),
            status.clone(),
            Duration::from_secs(2),
            Duration::from_secs(60),
        );

        monitor.probe_all().await;

        // Exactly one entry per registered service, each stamped.
        let snapshot = status.snapshot();
        assert_eq!(snapshot.len(), registry.all().len());

        assert!(!status.get("user").unwrap().available);
        for name in ["auth", "cv", "export", "ai", "payment"] {
            assert!(
                status.get(name).unwrap().available,
                "{name} should be unaffected by the user service failure"
            );
        }
    }
}
