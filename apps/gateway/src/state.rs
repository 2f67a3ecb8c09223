use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::config::Config;
use crate::proxy::{ProxyStage, StatusRecorder};
use crate::registry::ServiceRegistry;
use crate::status::StatusTable;

/// Shared application state injected into all route handlers via Axum
/// extractors. The status table lives here, not in a module-level
/// singleton, so tests can build isolated gateways.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub status: StatusTable,
    pub http: Client,
    pub config: Config,
    /// Typed forward-path extension points; see `proxy::ProxyStage`.
    pub stages: Arc<Vec<Arc<dyn ProxyStage>>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(ServiceRegistry::from_config(&config));
        let status = StatusTable::new();
        let stages: Arc<Vec<Arc<dyn ProxyStage>>> =
            Arc::new(vec![Arc::new(StatusRecorder::new(status.clone()))]);

        Self {
            registry,
            status,
            http: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            config,
            stages,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
