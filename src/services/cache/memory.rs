//! Process-local `CacheClient` used by tests to stand in for a shared Valkey.
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::services::cache::client::{CacheClient, CacheResult};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live(entry: Option<&(String, Instant)>) -> Option<String> {
    entry
        .filter(|(_, expires_at)| *expires_at > Instant::now())
        .map(|(value, _)| value.clone())
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(live(entries.get(key)))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        if live(entries.get(key)).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn take_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        Ok(live(entries.remove(key).as_ref()))
    }

    async fn del_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        if live(entries.get(key)).as_deref() == Some(value) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
