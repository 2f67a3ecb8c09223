//! Single-flight access-token refresh.
//!
//! The first caller hitting a 401 creates the refresh future and
//! parks it in a shared slot; every concurrent 401-er awaits that same
//! future instead of issuing its own refresh call. The slot is cleared
//! on completion, success or failure, so a later 401 starts a fresh
//! refresh. At most one refresh request is ever on the wire
//! process-wide.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{extract_detail, ApiError};
use crate::tokens::{TokenStore, REFRESH_TOKEN_KEY};

/// Refresh and replay must not hang on a dead connection.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

type SharedRefresh = Shared<BoxFuture<'static, Result<String, ApiError>>>;

/// Session lifecycle notifications. The frontend binds
/// `on_session_expired` to a redirect to the login route.
pub trait SessionEvents: Send + Sync {
    fn on_session_expired(&self);
}

pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn TokenStore>,
    session: Arc<dyn SessionEvents>,
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        refresh_url: String,
        store: Arc<dyn TokenStore>,
        session: Arc<dyn SessionEvents>,
    ) -> Self {
        Self {
            http,
            refresh_url,
            store,
            session,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns a fresh access token, joining the in-flight refresh if
    /// one exists. On failure the whole session is torn down: tokens
    /// cleared, redirect signalled, and the error handed to every
    /// waiter.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let shared = {
            let mut slot = self.in_flight.lock().expect("refresh slot lock poisoned");
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let http = self.http.clone();
                    let url = self.refresh_url.clone();
                    let store = Arc::clone(&self.store);
                    let session = Arc::clone(&self.session);
                    let slot_handle = Arc::clone(&self.in_flight);

                    let fresh: SharedRefresh = async move {
                        let result = perform_refresh(http, url, Arc::clone(&store)).await;
                        if let Err(error) = &result {
                            warn!(error = %error, "token refresh failed, ending session");
                            store.clear_session();
                            session.on_session_expired();
                        }
                        // Free the slot so the next 401 triggers a new
                        // refresh rather than observing this outcome.
                        *slot_handle.lock().expect("refresh slot lock poisoned") = None;
                        result
                    }
                    .boxed()
                    .shared();

                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        shared.await
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// The actual refresh call. Goes straight to the auth endpoint with a
/// bare client; routing it through the wrapped client would recurse
/// into the 401 handler.
async fn perform_refresh(
    http: reqwest::Client,
    url: String,
    store: Arc<dyn TokenStore>,
) -> Result<String, ApiError> {
    let Some(refresh_token) = store.refresh_token() else {
        return Err(ApiError::SessionExpired);
    };

    let response = http
        .post(&url)
        .timeout(REFRESH_TIMEOUT)
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .map_err(ApiError::from_transport)?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status,
            message: extract_detail(&body),
        });
    }

    let parsed: RefreshResponse = response.json().await.map_err(|e| ApiError::Http {
        status,
        message: format!("invalid refresh response: {e}"),
    })?;

    store.set_access_token(&parsed.access_token);
    if let Some(rotated) = parsed.refresh_token {
        store.set(REFRESH_TOKEN_KEY, &rotated);
    }
    info!("access token refreshed");
    Ok(parsed.access_token)
}
