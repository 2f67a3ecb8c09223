//! The single entry point for UI-facing API calls.
//!
//! ARCHITECTURAL RULE: no other module talks to the gateway directly.
//! Every call goes through `ApiClient`, which layers, in order:
//! transport-level retry with backoff, a one-shot delayed retry for
//! 503, and single-flight token refresh with a single replay for 401.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{extract_detail, ApiError};
use crate::refresh::{RefreshCoordinator, SessionEvents};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::tokens::{TokenPair, TokenStore};

/// Deadline for a single request on the wire.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Fixed pause before the one-shot retry of a 503 response.
const UNAVAILABLE_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct ApiClient {
    http: reqwest::Client,
    /// Gateway API root, e.g. `http://localhost:8080/api`.
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh: RefreshCoordinator,
    retry_policy: RetryPolicy,
    unavailable_retry_delay: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, store: Arc<dyn TokenStore>, session: Arc<dyn SessionEvents>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::new();
        let refresh_url = join_path(&base_url, "auth/refresh");
        let refresh = RefreshCoordinator::new(
            http.clone(),
            refresh_url,
            Arc::clone(&store),
            session,
        );

        Self {
            http,
            base_url,
            store,
            refresh,
            retry_policy: RetryPolicy::default(),
            unavailable_retry_delay: UNAVAILABLE_RETRY_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_unavailable_retry_delay(mut self, delay: Duration) -> Self {
        self.unavailable_retry_delay = delay;
        self
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Resolves a caller path against the gateway root. `ai/analyze`
    /// and `/api/ai/analyze` produce the identical outbound URL; the
    /// `api` segment is never doubled.
    pub fn url_for(&self, path: &str) -> String {
        join_path(&self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn get_with_params(
        &self,
        path: &str,
        params: HashMap<String, String>,
    ) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None, Some(params)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body), None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, Some(body), None).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None, None).await
    }

    /// Runs one logical call through the full recovery stack.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        params: Option<HashMap<String, String>>,
    ) -> Result<Value, ApiError> {
        let url = self.url_for(path);
        let mut bearer = self.store.access_token();
        // Each recovery path fires at most once per logical request;
        // the flags are what keep a 401 loop or a 503 loop impossible.
        let mut replayed_unauthorized = false;
        let mut retried_unavailable = false;

        loop {
            let outcome = retry_with_backoff(&self.retry_policy, || {
                self.send_once(&method, &url, body.as_ref(), params.as_ref(), bearer.as_deref())
            })
            .await;

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match error.status() {
                Some(401) if !replayed_unauthorized => {
                    replayed_unauthorized = true;
                    match self.refresh.refresh_access_token().await {
                        Ok(token) => {
                            debug!("replaying request with refreshed token");
                            bearer = Some(token);
                            continue;
                        }
                        // The session is already torn down; the caller
                        // gets the error that started the recovery.
                        Err(_) => return Err(error),
                    }
                }
                Some(503) if !retried_unavailable => {
                    retried_unavailable = true;
                    warn!(url = %url, "service unavailable, retrying once after delay");
                    tokio::time::sleep(self.unavailable_retry_delay).await;
                    continue;
                }
                _ => return Err(error),
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        params: Option<&HashMap<String, String>>,
        bearer: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .timeout(REQUEST_TIMEOUT);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(ApiError::from_transport)?;

        if (200..300).contains(&status) {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        } else {
            Err(ApiError::Http {
                status,
                message: extract_detail(&text),
            })
        }
    }

    /// Authenticates and persists the session: token pair plus the
    /// cached profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value, ApiError> {
        let response = self
            .request(
                Method::POST,
                "auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await?;

        if let (Some(access), Some(refresh)) = (
            response.get("access_token").and_then(Value::as_str),
            response.get("refresh_token").and_then(Value::as_str),
        ) {
            self.store.store_pair(&TokenPair {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
                expiry: None,
            });
        }
        if let Some(user) = response.get("user") {
            self.store.store_user(user);
        }

        Ok(response)
    }

    /// Drops the local session. No server call; tokens are bearer-style
    /// and simply stop being sent.
    pub fn logout(&self) {
        self.store.clear_session();
    }
}

fn join_path(base_url: &str, path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("api/").unwrap_or(trimmed);
    format!("{base_url}/{trimmed}")
}
