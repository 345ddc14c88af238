//! Cache client interface used by higher-level services (PKCE state, key generation lease).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command).
///
/// Kept independent from `AppError` so callers decide how to fail
/// (fatal at startup for the key lease, 500 for request handlers).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
}

/// A minimal, string-based cache interface shared by every replica.
///
/// Implementations must be cheap to share (`Arc<dyn CacheClient>`).
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Unconditionally set a value with TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Set value if the key does not exist, with TTL.
    //
    // Returns:
    // - `Ok(true)`  if the key was set
    // - `Ok(false)` if the key already exists
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;

    // Atomically read and delete a value.
    async fn take_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Delete `key` only while it still holds `value`. Returns whether it was deleted.
    async fn del_if_equals(&self, key: &str, value: &str) -> CacheResult<bool>;

    async fn ping(&self) -> CacheResult<()>;
}
