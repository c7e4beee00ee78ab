//! The master bootstrap admin key (spec §4.B): supplied via environment,
//! always accepted as an admin identity, never persisted.

use ovp_core::{ApiKeyRecord, RateLimitPolicy, BOOTSTRAP_KEY_ID};

/// Builds the synthetic record for a bootstrap key match. Not stored by
/// any repository; the caller compares the presented plaintext directly
/// against the configured value before calling this.
pub fn synthetic_record() -> ApiKeyRecord {
    ApiKeyRecord {
        id: BOOTSTRAP_KEY_ID.to_string(),
        name: "bootstrap admin".to_string(),
        is_admin: true,
        active: true,
        key_hash: String::new(),
        suffix: String::new(),
        created_at: chrono::Utc::now(),
        last_used_at: None,
        request_count: 0,
        rate_limit: RateLimitPolicy {
            requests: u32::MAX,
            window_ms: 1,
        },
        expires_at: None,
        engine_config: Default::default(),
        allowed_voices: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_record_is_admin_and_uses_reserved_id() {
        let record = synthetic_record();
        assert!(record.is_admin);
        assert_eq!(record.id, BOOTSTRAP_KEY_ID);
    }
}
