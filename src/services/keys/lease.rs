//! Auto-expiring mutual exclusion across replicas, arbitrated by the shared cache.
//!
//! A lease is `SET <key> <holder-token> NX EX <ttl>`. The holder releases it
//! with a compare-and-delete; a holder that dies simply lets the TTL run out.
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::services::cache::{CacheClient, CacheError};
use crate::services::random::random_token;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("lease still held after waiting {0:?}")]
    Timeout(Duration),

    #[error("failed to generate lease token: {0}")]
    Random(#[from] getrandom::Error),
}

/// Proof of holding the lease. Consumed by [`LeaseLock::release`].
#[derive(Debug)]
pub struct Lease {
    token: String,
}

#[derive(Clone)]
pub struct LeaseLock {
    cache: Arc<dyn CacheClient>,
    key: String,
    ttl: Duration,
    poll_interval: Duration,
    max_wait: Duration,
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("backend", &self.cache.backend_name())
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl LeaseLock {
    pub fn new(cache: Arc<dyn CacheClient>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            ttl: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            max_wait: Duration::from_secs(60),
        }
    }

    #[cfg(test)]
    pub fn with_timing(mut self, ttl: Duration, poll_interval: Duration, max_wait: Duration) -> Self {
        self.ttl = ttl;
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn try_acquire(&self) -> Result<Option<Lease>, LeaseError> {
        let token = random_token(16)?;
        let acquired = self
            .cache
            .set_if_absent_with_ttl(&self.key, &token, self.ttl)
            .await?;

        debug!(key = %self.key, acquired, "lease acquisition attempt");
        Ok(acquired.then_some(Lease { token }))
    }

    /// Returns `false` when the lease had already expired (and may now belong to someone else).
    pub async fn release(&self, lease: Lease) -> Result<bool, LeaseError> {
        Ok(self.cache.del_if_equals(&self.key, &lease.token).await?)
    }

    /// Poll until nobody holds the lease. Bounded by `max_wait`.
    pub async fn wait_released(&self) -> Result<(), LeaseError> {
        let started = tokio::time::Instant::now();
        loop {
            if self.cache.get_string(&self.key).await?.is_none() {
                return Ok(());
            }
            if started.elapsed() >= self.max_wait {
                return Err(LeaseError::Timeout(self.max_wait));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
