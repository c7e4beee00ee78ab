//! The major cloud Neural-TTS adapter.
//!
//! A single adapter serves both MP3 and WAV output: the source this
//! gateway descends from registered `azure` and `azure-mp3` as two
//! separate adapter identities purely to pick an output container. Here
//! the container is a `SynthesizeOptions::format` value passed straight
//! into the `X-Microsoft-OutputFormat` header — one adapter, one
//! credential fingerprint, two possible outputs.

use async_trait::async_trait;
use ovp_core::{
    AudioFormat, Capabilities, GatewayError, HealthStatus, ProviderAdapter, Result,
    SynthesizeOptions, Voice, VoiceGender,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub region: String,
    pub api_key: String,
}

pub struct AzureAdapter {
    config: AzureConfig,
    client: Client,
}

impl AzureAdapter {
    pub fn new(config: AzureConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Config(format!("azure http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn synthesize_endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.config.region
        )
    }

    fn voices_endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/voices/list",
            self.config.region
        )
    }

    fn output_format_header(format: AudioFormat, sample_rate: u32) -> &'static str {
        match (format, sample_rate) {
            (AudioFormat::Mp3, _) => "audio-24khz-48kbitrate-mono-mp3",
            (_, r) if r >= 48000 => "riff-48khz-16bit-mono-pcm",
            (_, r) if r >= 24000 => "riff-24khz-16bit-mono-pcm",
            _ => "riff-16khz-16bit-mono-pcm",
        }
    }

    fn ssml(text: &str, voice_id: &str, is_ssml: bool) -> String {
        if is_ssml {
            text.to_string()
        } else {
            format!(
                "<speak version='1.0' xml:lang='en-US'><voice name='{voice_id}'>{}</voice></speak>",
                xml_escape(text)
            )
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Deserialize)]
struct AzureVoiceEntry {
    #[serde(rename = "ShortName")]
    short_name: String,
    #[serde(rename = "LocalName")]
    local_name: String,
    #[serde(rename = "Locale")]
    locale: String,
    #[serde(rename = "Gender")]
    gender: String,
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    fn provider_id(&self) -> &str {
        "azure"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let resp = self
            .client
            .get(self.voices_endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderUnavailable(format!(
                "azure voices list: {}",
                resp.status()
            )));
        }

        let entries: Vec<AzureVoiceEntry> = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|e| Voice {
                id: e.short_name,
                name: e.local_name,
                languages: vec![e.locale.split('-').next().unwrap_or("en").to_string()],
                locale: Some(e.locale),
                gender: match e.gender.as_str() {
                    "Male" => Some(VoiceGender::Male),
                    "Female" => Some(VoiceGender::Female),
                    _ => Some(VoiceGender::Neutral),
                },
            })
            .collect())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let body = Self::ssml(text, &options.voice_id, options.ssml);
        let format_header = Self::output_format_header(options.format, options.sample_rate);

        let resp = self
            .client
            .post(self.synthesize_endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", format_header)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "azure synthesize: {}",
                resp.status()
            )));
        }

        Ok(resp
            .bytes()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?
            .to_vec())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stream: false,
            supports_timestamps: false,
            supports_cancellation: false,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.list_voices().await {
            Ok(voices) => HealthStatus {
                ok: true,
                voice_count: voices.len(),
                detail: None,
            },
            Err(e) => HealthStatus {
                ok: false,
                voice_count: 0,
                detail: Some(e.to_string()),
            },
        }
    }
}
