//! Durable record of which refresh tokens are still usable.
//!
//! A token is alive exactly while its `jti` row exists and has not expired.
//! Rotation consumes the row with one conditional delete, so two concurrent
//! presentations of the same token cannot both succeed.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::repos::error::RepoResult;
use crate::repos::refresh_token_repo::RefreshTokenRepo;

#[async_trait]
pub trait RefreshTokenStore: Send + Sync + 'static {
    async fn insert(&self, jti: &str, expires_at: DateTime<Utc>) -> RepoResult<()>;

    /// Atomically delete an unexpired row. `true` iff a row was deleted.
    async fn take_alive(&self, jti: &str, now: DateTime<Utc>) -> RepoResult<bool>;

    async fn delete(&self, jti: &str) -> RepoResult<u64>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
impl RefreshTokenStore for RefreshTokenRepo {
    async fn insert(&self, jti: &str, expires_at: DateTime<Utc>) -> RepoResult<()> {
        RefreshTokenRepo::insert(self, jti, expires_at).await
    }

    async fn take_alive(&self, jti: &str, now: DateTime<Utc>) -> RepoResult<bool> {
        RefreshTokenRepo::take_alive(self, jti, now).await
    }

    async fn delete(&self, jti: &str) -> RepoResult<u64> {
        RefreshTokenRepo::delete(self, jti).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        RefreshTokenRepo::delete_expired(self, now).await
    }
}

#[derive(Clone)]
pub struct RefreshTokenLedger {
    store: Arc<dyn RefreshTokenStore>,
}

impl RefreshTokenLedger {
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, jti: &str, expires_at: DateTime<Utc>) -> RepoResult<()> {
        self.store.insert(jti, expires_at).await
    }

    /// Alive check and revocation in one step. At most one caller gets `true` per `jti`.
    pub async fn check_alive_and_revoke(&self, jti: &str) -> RepoResult<bool> {
        self.store.take_alive(jti, Utc::now()).await
    }

    /// Idempotent; revoking an unknown or already revoked token is not an error.
    pub async fn revoke(&self, jti: &str) -> RepoResult<()> {
        let removed = self.store.delete(jti).await?;
        debug!(jti, removed, "refresh token revoked");
        Ok(())
    }

    pub async fn sweep_expired(&self) -> RepoResult<u64> {
        self.store.delete_expired(Utc::now()).await
    }

    /// Sweep every `interval` until `shutdown` flips to `true`. Failures are
    /// logged and retried on the next tick.
    pub fn spawn_sweeper(
        self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_expired().await {
                            Ok(0) => {}
                            Ok(removed) => debug!(removed, "swept expired refresh tokens"),
                            Err(e) => error!(error = ?e, "refresh token sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("refresh token sweeper stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}
