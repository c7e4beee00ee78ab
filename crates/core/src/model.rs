//! The data model shared by the key repository, credential store, usage
//! tracker, voice resolver and streaming session (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The reserved identifier for the master bootstrap admin key. It is never
/// persisted and the usage tracker must filter it out of its write path
/// (spec §9, "Master admin key as a synthetic record").
pub const BOOTSTRAP_KEY_ID: &str = "__bootstrap_admin__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests: u32,
    pub window_ms: i64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests: 60,
            window_ms: 60_000,
        }
    }
}

/// Per-provider configuration attached to an API key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeyPolicy {
    pub enabled: bool,
    pub use_custom_credentials: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_credentials: Option<HashMap<String, String>>,
}

/// A caller credential (spec §3 `ApiKey`).
///
/// The plaintext is never stored — only `key_hash` (SHA-256 of the
/// plaintext, hex-encoded) and `suffix` (its last 8 characters) persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
    pub active: bool,
    pub key_hash: String,
    pub suffix: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub request_count: u64,
    pub rate_limit: RateLimitPolicy,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub engine_config: HashMap<String, ProviderKeyPolicy>,
    #[serde(default)]
    pub allowed_voices: Option<Vec<String>>,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    pub fn provider_enabled(&self, provider: &str) -> bool {
        match self.engine_config.get(provider) {
            Some(policy) => policy.enabled,
            // Absent entries default to enabled — the allowlist is the
            // primary restriction mechanism; engine_config only disables.
            None => true,
        }
    }

    pub fn voice_allowed(&self, facade_voice_id: &str) -> bool {
        match &self.allowed_voices {
            Some(list) => list.iter().any(|v| v == facade_voice_id),
            None => true,
        }
    }
}

/// A projection of `ApiKeyRecord` safe to hand back from `list()` — no
/// hash, no ability to ever reconstruct the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
    pub active: bool,
    pub suffix: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub request_count: u64,
    pub rate_limit: RateLimitPolicy,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&ApiKeyRecord> for ApiKeySummary {
    fn from(r: &ApiKeyRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            is_admin: r.is_admin,
            active: r.active,
            suffix: r.suffix.clone(),
            created_at: r.created_at,
            last_used_at: r.last_used_at,
            request_count: r.request_count,
            rate_limit: r.rate_limit,
            expires_at: r.expires_at,
        }
    }
}

/// Patch applied by `update(id, patch)`; `None` fields are left untouched.
/// Mutating `key_hash` is intentionally not representable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyPatch {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub is_admin: Option<bool>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub expires_at: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

/// System-wide provider credentials (spec §4.A). Raw values are only ever
/// handed to a provider adapter constructor; everything else sees the
/// masked projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCredentials {
    pub providers: HashMap<String, HashMap<String, String>>,
}

const MASK_SENTINEL: &str = "••••••••";

impl SystemCredentials {
    pub fn get_raw(&self, provider: &str) -> Option<&HashMap<String, String>> {
        self.providers.get(provider)
    }

    pub fn set(&mut self, provider: &str, fields: HashMap<String, String>) {
        self.providers.insert(provider.to_string(), fields);
    }

    /// Every field present, value replaced by a fixed-width sentinel.
    pub fn masked(&self) -> HashMap<String, HashMap<String, String>> {
        self.providers
            .iter()
            .map(|(provider, fields)| {
                let masked_fields = fields
                    .keys()
                    .map(|k| (k.clone(), MASK_SENTINEL.to_string()))
                    .collect();
                (provider.clone(), masked_fields)
            })
            .collect()
    }
}

/// An immutable usage event (spec §3 `UsageRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub key_id: String,
    pub provider: String,
    pub path: String,
    pub character_count: usize,
    pub elapsed_ms: u64,
    pub status: u16,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl UsageRecord {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The voice resolver's output (spec §3 `VoiceBinding`); constructed per
/// request and discarded after the response is written.
#[derive(Debug, Clone)]
pub struct VoiceBinding {
    pub provider: String,
    pub native_voice_id: String,
    pub requested_format: crate::audio::AudioFormat,
    pub requested_sample_rate: u32,
}

/// An externally visible voice descriptor (spec §3 `FacadeVoice`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacadeVoice {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub gender: Option<crate::provider::VoiceGender>,
    pub locale: Option<String>,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closing,
}

/// A streaming conversation (spec §3 `Session`, §4.J).
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub key_id: String,
    pub format: crate::audio::AudioFormat,
    pub sample_rate: u32,
    pub state: SessionState,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
}

impl SessionInfo {
    pub fn new(id: String, key_id: String, format: crate::audio::AudioFormat, sample_rate: u32) -> Self {
        Self {
            id,
            key_id,
            format,
            sample_rate,
            state: SessionState::Open,
            bytes_sent: 0,
            chunks_sent: 0,
        }
    }
}
