//! Application state shared across every handler (spec §3, §4).
//!
//! Holds the five leaf components (credential store, key repository,
//! rate limiter, usage tracker) plus the engine registry and static voice
//! map they feed the request pipeline and voice resolver. Settings are
//! wrapped in a `parking_lot::RwLock` for hot-reload, matching the
//! teacher's `AppState::config` convention.

use ovp_config::Settings;
use ovp_core::{GatewayError, Result, UsageRecord, BOOTSTRAP_KEY_ID};
use ovp_keys::{CredentialStore, KeyRepository, RateLimiter, UsageTracker};
use ovp_providers::EngineRegistry;
use ovp_voice::StaticVoiceMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Whether the process is running in production mode. Set once at
/// startup from `Settings::environment`; read by [`crate::error::ApiError`]
/// to decide whether to scrub internal error detail, since that impl has
/// no reference to `AppState` of its own (it runs inside `IntoResponse`,
/// not a handler).
static PRODUCTION: AtomicBool = AtomicBool::new(false);

pub fn set_production(flag: bool) {
    PRODUCTION.store(flag, Ordering::Relaxed);
}

pub fn is_production() -> bool {
    PRODUCTION.load(Ordering::Relaxed)
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RwLock<Settings>>,
    pub key_repository: Arc<dyn KeyRepository>,
    pub credential_store: Arc<CredentialStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub usage_tracker: Arc<UsageTracker>,
    pub registry: Arc<EngineRegistry>,
    pub static_voices: Arc<StaticVoiceMap>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        key_repository: Arc<dyn KeyRepository>,
        credential_store: Arc<CredentialStore>,
        static_voices: StaticVoiceMap,
    ) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            key_repository,
            credential_store,
            rate_limiter: RateLimiter::new(),
            usage_tracker: Arc::new(UsageTracker::default()),
            registry: Arc::new(EngineRegistry::new()),
            static_voices: Arc::new(static_voices),
            started_at: Instant::now(),
        }
    }

    pub fn get_settings(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.settings.read()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// System credentials lookup closure handed to `ovp_voice::VoiceResolver`.
    pub fn system_credentials(&self, provider: &str) -> Option<std::collections::BTreeMap<String, String>> {
        self.credential_store
            .get_raw(provider)
            .map(|m| m.into_iter().collect())
    }

    /// Step 7 of the request pipeline: record a `UsageRecord` and bump the
    /// key's request counter. The bootstrap admin identity is never
    /// persisted, so it is skipped here rather than inside the tracker
    /// alone — `touch` would otherwise try (and fail) to look up a row
    /// that doesn't exist in either backend.
    pub async fn record_usage(
        &self,
        key_id: &str,
        provider: &str,
        path: &str,
        character_count: usize,
        elapsed_ms: u64,
        status: u16,
    ) {
        self.usage_tracker.record(UsageRecord {
            key_id: key_id.to_string(),
            provider: provider.to_string(),
            path: path.to_string(),
            character_count,
            elapsed_ms,
            status,
            timestamp: chrono::Utc::now(),
        });

        if key_id != BOOTSTRAP_KEY_ID {
            if let Err(e) = self.key_repository.touch(key_id).await {
                tracing::warn!(error = %e, key_id, "failed to touch key after request");
            }
        }
    }

    /// Rate-limit a key per spec §4.C, using its own policy.
    pub fn check_rate_limit(&self, key_id: &str, limit: u32, window_ms: i64) -> ovp_keys::RateLimitResult {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.rate_limiter.check(key_id, limit, window_ms, now_ms)
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// Maps an arbitrary `sqlx`/file persistence failure raised while
/// selecting a key backend into the ambient `Config` error kind, since
/// neither sub-crate error can reach `GatewayError` through a blanket
/// `From` without creating a dependency cycle.
pub fn persistence_unavailable(detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::Config(format!("persistence unavailable: {detail}"))
}

pub type StateResult<T> = Result<T>;
