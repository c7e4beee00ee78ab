//! The provider abstraction layer (spec §4.E).
//!
//! All third-party engines and local synthesizers sit behind one trait so
//! the request pipeline never branches on which provider it is talking to.
//! Capability probing happens once, up front (`capabilities()`), and each
//! synthesis mode is its own method with its own return type rather than
//! something callers infer from which method didn't panic.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::audio::AudioFormat;
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

/// A voice as reported by a provider's own catalog (native id, not a
/// façade id — the resolver is what binds the two together).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub locale: Option<String>,
    pub gender: Option<VoiceGender>,
}

/// Per-call synthesis parameters.
#[derive(Debug, Clone)]
pub struct SynthesizeOptions {
    pub voice_id: String,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub ssml: bool,
}

/// Character-level timing, always three parallel arrays of equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl Alignment {
    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn is_well_formed(&self) -> bool {
        self.characters.len() == self.character_start_times_seconds.len()
            && self.characters.len() == self.character_end_times_seconds.len()
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub total_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub supports_stream: bool,
    pub supports_timestamps: bool,
    pub supports_cancellation: bool,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub ok: bool,
    pub voice_count: usize,
    pub detail: Option<String>,
}

/// The uniform synthesis contract every provider adapter implements.
///
/// Implementations hold their own client state and construction
/// credentials; the engine registry (`ovp_providers::registry`) owns their
/// lifecycle and caches instances by `(provider, credential fingerprint)`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, e.g. `"elevenlabs"`, `"espeak"`, `"mock"`.
    fn provider_id(&self) -> &str;

    async fn list_voices(&self) -> Result<Vec<Voice>>;

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>>;

    /// Streamed synthesis. Adapters without native streaming support may
    /// implement this by chunking a buffered `synthesize()` result.
    async fn synthesize_stream(
        &self,
        _text: &str,
        _options: &SynthesizeOptions,
    ) -> Result<(ChunkStream, StreamMetadata)> {
        Err(GatewayError::Unsupported(format!(
            "{} does not support streaming synthesis",
            self.provider_id()
        )))
    }

    /// Timestamped synthesis. Returns `None` alignment when the provider
    /// has no native character timing (the caller decides whether to
    /// synthesize one — see `ovp_voice::timestamps`).
    async fn synthesize_timestamped(
        &self,
        _text: &str,
        _voice_id: &str,
    ) -> Result<(Vec<u8>, Option<Alignment>)> {
        Err(GatewayError::Unsupported(format!(
            "{} does not support timestamped synthesis",
            self.provider_id()
        )))
    }

    fn capabilities(&self) -> Capabilities;

    async fn health_check(&self) -> HealthStatus;
}
