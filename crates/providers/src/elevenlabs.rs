//! The cloud service with real character-level timings (spec §4.E, §4.I).
//!
//! This is the provider whose own wire shape the gateway's public REST
//! surface mirrors, so its voice catalog fields are carried through
//! mostly verbatim rather than collapsed into [`ovp_core::Voice`]'s
//! smaller shape.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ovp_core::{
    Alignment, Capabilities, GatewayError, HealthStatus, ProviderAdapter, Result,
    SynthesizeOptions, Voice, VoiceGender,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
}

pub struct ElevenLabsAdapter {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabsAdapter {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Config(format!("elevenlabs http client: {e}")))?;
        Ok(Self { config, client })
    }
}

/// Mirrors the provider's own voice resource closely enough for admin
/// tooling and the façade catalog to pass extra fields through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsVoice {
    pub voice_id: String,
    pub name: Option<String>,
    pub labels: Option<HashMap<String, String>>,
    pub category: Option<String>,
    pub fine_tuning: Option<serde_json::Value>,
    pub settings: Option<VoiceSettings>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub style: Option<f32>,
    pub use_speaker_boost: Option<bool>,
}

#[derive(Deserialize)]
struct VoicesListResponse {
    voices: Vec<ElevenLabsVoice>,
}

#[derive(Serialize)]
struct SynthBody<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[derive(Deserialize)]
struct TimestampedResponse {
    audio_base64: String,
    alignment: Option<RawAlignment>,
}

#[derive(Deserialize)]
struct RawAlignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

impl From<RawAlignment> for Alignment {
    fn from(r: RawAlignment) -> Self {
        Alignment {
            characters: r.characters,
            character_start_times_seconds: r.character_start_times_seconds,
            character_end_times_seconds: r.character_end_times_seconds,
        }
    }
}

fn gender_from_labels(labels: &Option<HashMap<String, String>>) -> Option<VoiceGender> {
    labels.as_ref()?.get("gender").map(|g| match g.as_str() {
        "male" => VoiceGender::Male,
        "female" => VoiceGender::Female,
        _ => VoiceGender::Neutral,
    })
}

#[async_trait]
impl ProviderAdapter for ElevenLabsAdapter {
    fn provider_id(&self) -> &str {
        "elevenlabs"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let resp = self
            .client
            .get("https://api.elevenlabs.io/v1/voices")
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderUnavailable(format!(
                "elevenlabs voices list: {}",
                resp.status()
            )));
        }

        let parsed: VoicesListResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        Ok(parsed
            .voices
            .into_iter()
            .map(|v| Voice {
                gender: gender_from_labels(&v.labels),
                locale: v.labels.as_ref().and_then(|l| l.get("language")).cloned(),
                languages: v
                    .labels
                    .as_ref()
                    .and_then(|l| l.get("language"))
                    .map(|l| vec![l.clone()])
                    .unwrap_or_default(),
                name: v.name.unwrap_or_else(|| v.voice_id.clone()),
                id: v.voice_id,
            })
            .collect())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(format!(
                "https://api.elevenlabs.io/v1/text-to-speech/{}",
                options.voice_id
            ))
            .header("xi-api-key", &self.config.api_key)
            .json(&SynthBody {
                text,
                model_id: "eleven_multilingual_v2",
            })
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "elevenlabs synthesize: {}",
                resp.status()
            )));
        }

        Ok(resp
            .bytes()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?
            .to_vec())
    }

    async fn synthesize_timestamped(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<(Vec<u8>, Option<Alignment>)> {
        let resp = self
            .client
            .post(format!(
                "https://api.elevenlabs.io/v1/text-to-speech/{voice_id}/with-timestamps"
            ))
            .header("xi-api-key", &self.config.api_key)
            .json(&SynthBody {
                text,
                model_id: "eleven_multilingual_v2",
            })
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "elevenlabs with-timestamps: {}",
                resp.status()
            )));
        }

        let parsed: TimestampedResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        let audio = STANDARD
            .decode(parsed.audio_base64)
            .map_err(|e| GatewayError::ProviderFailed(format!("invalid base64 audio: {e}")))?;

        Ok((audio, parsed.alignment.map(Into::into)))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stream: false,
            supports_timestamps: true,
            supports_cancellation: false,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.list_voices().await {
            Ok(voices) => HealthStatus { ok: true, voice_count: voices.len(), detail: None },
            Err(e) => HealthStatus { ok: false, voice_count: 0, detail: Some(e.to_string()) },
        }
    }
}
