//! Credential storage, key management, rate limiting and usage tracking
//! for the TTS gateway (spec §4.A-§4.D).

pub mod bootstrap;
pub mod credential_store;
pub mod file_backend;
pub mod key_repository;
pub mod rate_limiter;
pub mod sql_backend;
pub mod usage_tracker;

pub use bootstrap::synthetic_record as bootstrap_record;
pub use credential_store::CredentialStore;
pub use file_backend::FileKeyRepository;
pub use key_repository::{generate_plaintext, hash_plaintext, suffix_of, KeyRepository};
pub use rate_limiter::{RateLimitResult, RateLimiter};
pub use sql_backend::SqlKeyRepository;
pub use usage_tracker::{UsageStats, UsageTracker};
