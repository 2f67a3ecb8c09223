use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current view of one downstream service, as seen by the gateway.
///
/// Two writers touch this record: the background health monitor (probe
/// results) and the proxy router (live traffic). Writes are
/// last-write-wins by completion time; `last_checked` only moves
/// forward. The table is advisory; routing never consults it.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub available: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Outcome of a single health probe, merged into the table then dropped.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub service: String,
    pub available: bool,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

/// Concurrency-safe service status table, owned by the gateway and
/// injected into the health monitor and the proxy router.
#[derive(Clone, Default)]
pub struct StatusTable {
    inner: Arc<RwLock<HashMap<String, ServiceStatus>>>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_available(&self, service: &str, response_time_ms: Option<u64>) {
        let mut table = self.inner.write().expect("status table lock poisoned");
        table.insert(
            service.to_string(),
            ServiceStatus {
                available: true,
                last_checked: Utc::now(),
                last_error: None,
                response_time_ms,
            },
        );
    }

    pub fn mark_unavailable(&self, service: &str, error: &str) {
        let mut table = self.inner.write().expect("status table lock poisoned");
        table.insert(
            service.to_string(),
            ServiceStatus {
                available: false,
                last_checked: Utc::now(),
                last_error: Some(error.to_string()),
                response_time_ms: None,
            },
        );
    }

    /// Merges one probe result into the table.
    pub fn apply(&self, result: &HealthCheckResult) {
        if result.available {
            self.mark_available(&result.service, result.response_time_ms);
        } else {
            let error = result.error.as_deref().unwrap_or("unavailable");
            self.mark_unavailable(&result.service, error);
        }
    }

    pub fn get(&self, service: &str) -> Option<ServiceStatus> {
        let table = self.inner.read().expect("status table lock poisoned");
        table.get(service).cloned()
    }

    /// A point-in-time copy of the whole table.
    pub fn snapshot(&self) -> HashMap<String, ServiceStatus> {
        let table = self.inner.read().expect("status table lock poisoned");
        table.clone()
    }

    /// True only when every recorded service is currently available.
    pub fn all_available(&self) -> bool {
        let table = self.inner.read().expect("status table lock poisoned");
        !table.is_empty() && table.values().all(|s| s.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_available_clears_previous_error() {
        let table = StatusTable::new();
        table.mark_unavailable("cv", "connection refused");
        table.mark_available("cv", Some(12));

        let status = table.get("cv").unwrap();
        assert!(status.available);
        assert_eq!(status.last_error, None);
        assert_eq!(status.response_time_ms, Some(12));
    }

    #[test]
    fn test_mark_unavailable_records_error() {
        let table = StatusTable::new();
        table.mark_unavailable("ai", "HTTP 502");

        let status = table.get("ai").unwrap();
        assert!(!status.available);
        assert_eq!(status.last_error.as_deref(), Some("HTTP 502"));
    }

    #[test]
    fn test_updates_never_touch_other_entries() {
        let table = StatusTable::new();
        table.mark_available("auth", Some(5));
        table.mark_available("cv", Some(7));

        // Re-probe auth repeatedly; cv must be untouched.
        for _ in 0..3 {
            table.mark_available("auth", Some(6));
        }
        table.mark_unavailable("auth", "connection refused");

        let cv = table.get("cv").unwrap();
        assert!(cv.available);
        assert_eq!(cv.response_time_ms, Some(7));
    }

    #[test]
    fn test_last_checked_is_monotonically_non_decreasing() {
        let table = StatusTable::new();
        table.mark_available("export", None);
        let first = table.get("export").unwrap().last_checked;
        table.mark_unavailable("export", "HTTP 500");
        let second = table.get("export").unwrap().last_checked;
        assert!(second >= first);
    }

    #[test]
    fn test_all_available_requires_nonempty_table() {
        let table = StatusTable::new();
        assert!(!table.all_available());

        table.mark_available("auth", None);
        table.mark_available("cv", None);
        assert!(table.all_available());

        table.mark_unavailable("cv", "timeout");
        assert!(!table.all_available());
    }

    #[test]
    fn test_apply_merges_probe_result() {
        let table = StatusTable::new();
        table.apply(&HealthCheckResult {
            service: "payment".to_string(),
            available: false,
            response_time_ms: None,
            error: Some("timed out after 10s".to_string()),
        });

        let status = table.get("payment").unwrap();
        assert!(!status.available);
        assert_eq!(status.last_error.as_deref(), Some("timed out after 10s"));
    }
}
