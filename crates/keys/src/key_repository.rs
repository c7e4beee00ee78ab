//! The key repository contract (spec §4.B) and the shared key-material
//! helpers both backends use.

use async_trait::async_trait;
use ovp_core::{ApiKeyPatch, ApiKeyRecord, ApiKeySummary, ProviderKeyPolicy, RateLimitPolicy, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const KEY_PREFIX: &str = "tts_";
const KEY_RANDOM_BYTES: usize = 32;
const SUFFIX_LEN: usize = 8;

/// Generates `tts_<64-hex>` from 32 bytes of cryptographic randomness.
pub fn generate_plaintext() -> String {
    let mut bytes = [0u8; KEY_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// SHA-256 of the UTF-8 plaintext, hex-encoded. An indexing digest, not a
/// password hash — no salt, because keys are long single-use identifiers
/// rather than user-chosen secrets.
pub fn hash_plaintext(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn suffix_of(plaintext: &str) -> String {
    let len = plaintext.len();
    plaintext[len.saturating_sub(SUFFIX_LEN)..].to_string()
}

#[async_trait]
pub trait KeyRepository: Send + Sync {
    async fn create(
        &self,
        name: String,
        is_admin: bool,
        active: bool,
        rate_limit: RateLimitPolicy,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
        allowed_voices: Option<Vec<String>>,
    ) -> Result<(String, ApiKeyRecord)>;

    async fn lookup_by_plaintext(&self, plaintext: &str) -> Result<Option<ApiKeyRecord>>;

    async fn list(&self) -> Result<Vec<ApiKeySummary>>;

    async fn update(&self, id: &str, patch: ApiKeyPatch) -> Result<ApiKeyRecord>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn get_engine_config(&self, id: &str) -> Result<HashMap<String, ProviderKeyPolicy>>;

    async fn set_engine_config(
        &self,
        id: &str,
        config: HashMap<String, ProviderKeyPolicy>,
        allowed_voices: Option<Vec<String>>,
    ) -> Result<()>;

    async fn touch(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_has_expected_shape() {
        let p = generate_plaintext();
        assert!(p.starts_with(KEY_PREFIX));
        assert_eq!(p.len(), KEY_PREFIX.len() + 64);
    }

    #[test]
    fn suffix_is_last_eight_characters() {
        let p = generate_plaintext();
        let suffix = suffix_of(&p);
        assert_eq!(suffix.len(), 8);
        assert!(p.ends_with(&suffix));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_plaintext("tts_abc"), hash_plaintext("tts_abc"));
        assert_ne!(hash_plaintext("tts_abc"), hash_plaintext("tts_abd"));
    }
}
