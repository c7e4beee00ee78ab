//! The engine registry (spec §4.F): a keyed cache of `(provider,
//! credentials-fingerprint) -> adapter`, with single-flight construction
//! and a short cool-down on construction failure.

use dashmap::DashMap;
use ovp_core::{GatewayError, HealthStatus, ProviderAdapter, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::factory::build_adapter;
use crate::fingerprint::{anonymous_fingerprint, fingerprint};

fn cache_key(provider: &str, fp: &str) -> String {
    format!("{provider}\0{fp}")
}

struct FailedEntry {
    at: Instant,
    message: String,
}

/// Owns every live provider adapter instance and the machinery to build
/// new ones without duplicating work across concurrent first-use
/// requests for the same `(provider, credentials)` pair.
pub struct EngineRegistry {
    adapters: DashMap<String, Arc<dyn ProviderAdapter>>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    failed: DashMap<String, FailedEntry>,
    cooldown: Duration,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            locks: DashMap::new(),
            failed: DashMap::new(),
            cooldown: Duration::from_secs(30),
        }
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            cooldown,
            ..Self::new()
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Returns a cached adapter, or constructs one via the provider
    /// factory and caches it. Concurrent callers for the same key share
    /// one construction: the async mutex per cache key means only the
    /// first caller actually builds anything.
    pub async fn get(
        &self,
        provider: &str,
        credentials: Option<&BTreeMap<String, String>>,
    ) -> Result<Arc<dyn ProviderAdapter>> {
        let fp = credentials.map(fingerprint).unwrap_or_else(anonymous_fingerprint);
        let key = cache_key(provider, &fp);

        if let Some(adapter) = self.adapters.get(&key) {
            return Ok(adapter.clone());
        }

        if let Some(entry) = self.failed.get(&key) {
            if entry.at.elapsed() < self.cooldown {
                return Err(GatewayError::ProviderUnavailable(entry.message.clone()));
            }
        }

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        // Re-check: another task may have finished construction while we
        // waited for the lock.
        if let Some(adapter) = self.adapters.get(&key) {
            return Ok(adapter.clone());
        }
        if let Some(entry) = self.failed.get(&key) {
            if entry.at.elapsed() < self.cooldown {
                return Err(GatewayError::ProviderUnavailable(entry.message.clone()));
            }
        }

        match build_adapter(provider, credentials) {
            Ok(adapter) => {
                info!(provider, "constructed provider adapter");
                let adapter: Arc<dyn ProviderAdapter> = adapter;
                self.adapters.insert(key.clone(), adapter.clone());
                self.failed.remove(&key);
                Ok(adapter)
            }
            Err(e) => {
                warn!(provider, error = %e, "provider adapter construction failed");
                self.failed.insert(
                    key,
                    FailedEntry {
                        at: Instant::now(),
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    pub async fn list_health(&self) -> std::collections::HashMap<String, HealthStatus> {
        let mut out = std::collections::HashMap::new();
        for entry in self.adapters.iter() {
            let adapter = entry.value().clone();
            let status = adapter.health_check().await;
            out.insert(adapter.provider_id().to_string(), status);
        }
        out
    }

    /// Drains every cached adapter. Adapters hold no background tasks of
    /// their own today (each call is a one-shot HTTP request or process
    /// spawn) so this is a cache clear; it exists as the seam future
    /// adapters with persistent connections hook into.
    pub async fn shutdown(&self) {
        self.adapters.clear();
        self.locks.clear();
        self.failed.clear();
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_adapter_constructs_without_credentials() {
        let registry = EngineRegistry::new();
        let adapter = registry.get("mock", None).await.unwrap();
        assert_eq!(adapter.provider_id(), "mock");
    }

    #[tokio::test]
    async fn repeated_get_returns_same_cached_instance() {
        let registry = EngineRegistry::new();
        let a = registry.get("mock", None).await.unwrap();
        let b = registry.get("mock", None).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unknown_provider_fails_and_is_cached_in_cooldown() {
        let registry = EngineRegistry::new();
        let err1 = registry.get("not-a-real-provider", None).await;
        assert!(err1.is_err());
        let err2 = registry.get("not-a-real-provider", None).await;
        assert!(err2.is_err());
    }

    #[tokio::test]
    async fn shutdown_clears_cache() {
        let registry = EngineRegistry::new();
        registry.get("mock", None).await.unwrap();
        registry.shutdown().await;
        assert!(registry.adapters.is_empty());
    }
}
