//! Core types shared across the TTS gateway crates.
//!
//! - `audio` — output containers and raw PCM conversion helpers.
//! - `error` — the gateway-wide error kind and its HTTP/session mappings.
//! - `provider` — the provider abstraction every adapter implements.
//! - `model` — persisted and per-request data types (keys, credentials,
//!   usage, voices, sessions).

pub mod audio;
pub mod error;
pub mod model;
pub mod provider;

pub use audio::{parse_wav_header, wav_to_pcm16_mono, AudioFormat, SampleRateHz, WavHeader};
pub use error::{GatewayError, Result};
pub use model::{
    ApiKeyPatch, ApiKeyRecord, ApiKeySummary, FacadeVoice, ProviderKeyPolicy, RateLimitPolicy,
    SessionInfo, SessionState, SystemCredentials, UsageRecord, VoiceBinding, BOOTSTRAP_KEY_ID,
};
pub use provider::{
    Alignment, Capabilities, ChunkStream, HealthStatus, ProviderAdapter, StreamMetadata,
    SynthesizeOptions, Voice, VoiceGender,
};
