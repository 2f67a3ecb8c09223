//! Bounded-concurrency executor for independent request sets.
//!
//! Parallel mode processes the input in fixed windows of `concurrency`
//! items; each window is dispatched fully and awaited before the next
//! one starts. A failing item records its error and never aborts the
//! batch. Output order always equals input order.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;
use reqwest::Method;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::ApiClient;

/// One request in a batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub method: Method,
    pub url: String,
    pub data: Option<Value>,
    pub params: Option<HashMap<String, String>>,
}

impl BatchRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
            data: None,
            params: None,
        }
    }

    pub fn post(url: &str, data: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.to_string(),
            data: Some(data),
            params: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub parallel: bool,
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            concurrency: 5,
        }
    }
}

/// Per-item outcome, positionally matched to the input.
#[derive(Debug)]
pub struct BatchOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ApiError>,
}

impl BatchOutcome {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl From<Result<Value, ApiError>> for BatchOutcome {
    fn from(result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(data) => BatchOutcome::ok(data),
            Err(error) => BatchOutcome::failed(error),
        }
    }
}

/// Runs `f` over `items` in windows of at most `concurrency`, awaiting
/// each window completely before dispatching the next. Results keep
/// input order.
pub async fn run_chunked<T, R, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let concurrency = concurrency.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter();

    loop {
        let window: Vec<T> = remaining.by_ref().take(concurrency).collect();
        if window.is_empty() {
            break;
        }
        results.extend(join_all(window.into_iter().map(&f)).await);
    }

    results
}

impl ApiClient {
    /// Executes a set of independent requests, collecting one outcome
    /// per item in input order.
    pub async fn execute_batch(
        &self,
        requests: Vec<BatchRequest>,
        options: BatchOptions,
    ) -> Vec<BatchOutcome> {
        if options.parallel {
            run_chunked(requests, options.concurrency, |request| {
                self.run_batch_item(request)
            })
            .await
        } else {
            let mut outcomes = Vec::with_capacity(requests.len());
            for request in requests {
                outcomes.push(self.run_batch_item(request).await);
            }
            outcomes
        }
    }

    async fn run_batch_item(&self, request: BatchRequest) -> BatchOutcome {
        self.request(request.method, &request.url, request.data, request.params)
            .await
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::SessionEvents;
    use crate::tokens::{MemoryTokenStore, TokenStore};
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopSession;
    impl SessionEvents for NoopSession {
        fn on_session_expired(&self) {}
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            &server.url("/api"),
            Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
            Arc::new(NoopSession),
        )
    }

    /// Tracks how many tasks are inside `f` at once.
    struct ConcurrencyGauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyGauge {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_windows_bound_concurrency() {
        let gauge = Arc::new(ConcurrencyGauge::new());
        let started = tokio::time::Instant::now();

        let items: Vec<usize> = (0..12).collect();
        let results = run_chunked(items, 5, |n| {
            let gauge = Arc::clone(&gauge);
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(100)).await;
                gauge.exit();
                n * 2
            }
        })
        .await;

        // 12 items at concurrency 5: windows of 5, 5, 2.
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(results, (0..12).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_preserves_order_despite_uneven_latency() {
        // Earlier items sleep longer; order must still hold.
        let items: Vec<u64> = (0..10).collect();
        let results = run_chunked(items, 5, |n| async move {
            tokio::time::sleep(Duration::from_millis(100 - n * 10)).await;
            n
        })
        .await;

        assert_eq!(results, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batch_collects_mixed_outcomes_in_order() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/cv/1");
            then.status(200).json_body(serde_json::json!({"id": 1}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/cv/2");
            then.status(404)
                .json_body(serde_json::json!({"message": "CV not found"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/cv/3");
            then.status(200).json_body(serde_json::json!({"id": 3}));
        });

        let client = client(&server);
        let outcomes = client
            .execute_batch(
                vec![
                    BatchRequest::get("cv/1"),
                    BatchRequest::get("cv/2"),
                    BatchRequest::get("cv/3"),
                ],
                BatchOptions::default(),
            )
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].data.as_ref().unwrap()["id"], 1);
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].error.as_ref().unwrap().status(), Some(404));
        assert!(outcomes[2].success);
        assert_eq!(outcomes[2].data.as_ref().unwrap()["id"], 3);
    }

    #[tokio::test]
    async fn test_sequential_mode_runs_every_item() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/ai/analyze");
            then.status(200).json_body(serde_json::json!({"score": 1}));
        });

        let client = client(&server);
        let requests: Vec<BatchRequest> = (0..4)
            .map(|n| BatchRequest::post("ai/analyze", serde_json::json!({ "cv": n })))
            .collect();
        let outcomes = client
            .execute_batch(
                requests,
                BatchOptions {
                    parallel: false,
                    concurrency: 5,
                },
            )
            .await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.success));
        mock.assert_hits(4);
    }
}
