//! Token persistence behind the browser's origin-scoped key-value
//! store. The trait is the seam: the real frontend binds it to local
//! storage, tests use the in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// The access/refresh token pair. Created by login, rotated by
/// refresh, destroyed by logout or an unrecoverable refresh failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Origin-scoped key-value storage for session state. Only the token
/// refresh coordinator and the login/logout flows write here.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);

    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    fn set_access_token(&self, token: &str) {
        self.set(ACCESS_TOKEN_KEY, token);
    }

    fn store_pair(&self, pair: &TokenPair) {
        self.set(ACCESS_TOKEN_KEY, &pair.access_token);
        self.set(REFRESH_TOKEN_KEY, &pair.refresh_token);
    }

    fn cached_user(&self) -> Option<serde_json::Value> {
        self.get(USER_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    fn store_user(&self, user: &serde_json::Value) {
        self.set(USER_KEY, &user.to_string());
    }

    /// Wipes the whole session: both tokens and the cached profile.
    fn clear_session(&self) {
        self.remove(ACCESS_TOKEN_KEY);
        self.remove(REFRESH_TOKEN_KEY);
        self.remove(USER_KEY);
    }
}

/// In-memory store with the same last-write-wins semantics as the
/// browser storage it stands in for.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .expect("token store lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .expect("token store lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .expect("token store lock poisoned")
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_pair_and_read_back() {
        let store = MemoryTokenStore::new();
        store.store_pair(&TokenPair {
            access_token: "acc".to_string(),
            refresh_token: "ref".to_string(),
            expiry: None,
        });

        assert_eq!(store.access_token().as_deref(), Some("acc"));
        assert_eq!(store.refresh_token().as_deref(), Some("ref"));
    }

    #[test]
    fn test_clear_session_removes_everything() {
        let store = MemoryTokenStore::new();
        store.set(ACCESS_TOKEN_KEY, "acc");
        store.set(REFRESH_TOKEN_KEY, "ref");
        store.store_user(&serde_json::json!({"email": "a@b.c"}));

        store.clear_session();

        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert_eq!(store.cached_user(), None);
    }

    #[test]
    fn test_cached_user_roundtrips_json() {
        let store = MemoryTokenStore::new();
        let user = serde_json::json!({"id": 7, "email": "a@b.c"});
        store.store_user(&user);
        assert_eq!(store.cached_user(), Some(user));
    }
}
