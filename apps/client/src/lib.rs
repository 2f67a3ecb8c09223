//! Client-side HTTP request layer for the gateway.
//!
//! Everything here runs on the user's side of the wire: transparent
//! retry with backoff for transport failures, single-flight recovery
//! from expired access tokens, a one-shot delay-and-retry for 503
//! responses, and a bounded-concurrency batch executor.

pub mod batch;
pub mod error;
pub mod http;
pub mod refresh;
pub mod retry;
pub mod tokens;

pub use batch::{BatchOptions, BatchOutcome, BatchRequest};
pub use error::ApiError;
pub use http::ApiClient;
pub use refresh::{RefreshCoordinator, SessionEvents};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use tokens::{MemoryTokenStore, TokenPair, TokenStore};
