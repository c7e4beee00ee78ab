//! The low-latency cloud service adapter (MP3 only, native chunked streaming).

use async_trait::async_trait;
use futures::StreamExt;
use ovp_core::{
    Capabilities, ChunkStream, GatewayError, HealthStatus, ProviderAdapter, Result,
    StreamMetadata, SynthesizeOptions, Voice, VoiceGender,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PlayHtConfig {
    pub user_id: String,
    pub api_key: String,
}

pub struct PlayHtAdapter {
    config: PlayHtConfig,
    client: Client,
}

impl PlayHtAdapter {
    pub fn new(config: PlayHtConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Config(format!("playht http client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    text: &'a str,
    voice: &'a str,
    output_format: &'static str,
    sample_rate: u32,
}

#[derive(Deserialize)]
struct VoiceEntry {
    id: String,
    name: String,
    language: String,
    gender: Option<String>,
}

#[async_trait]
impl ProviderAdapter for PlayHtAdapter {
    fn provider_id(&self) -> &str {
        "playht"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let resp = self
            .client
            .get("https://api.play.ht/api/v2/voices")
            .header("X-User-ID", &self.config.user_id)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderUnavailable(format!(
                "playht voices list: {}",
                resp.status()
            )));
        }

        let entries: Vec<VoiceEntry> = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|v| Voice {
                id: v.id,
                name: v.name,
                languages: vec![v.language.clone()],
                locale: Some(v.language),
                gender: match v.gender.as_deref() {
                    Some("male") => Some(VoiceGender::Male),
                    Some("female") => Some(VoiceGender::Female),
                    _ => None,
                },
            })
            .collect())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let (stream, _meta) = self.synthesize_stream(text, options).await?;
        let mut buf = Vec::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }

    async fn synthesize_stream(
        &self,
        text: &str,
        options: &SynthesizeOptions,
    ) -> Result<(ChunkStream, StreamMetadata)> {
        let body = StreamRequest {
            text,
            voice: &options.voice_id,
            output_format: "mp3",
            sample_rate: options.sample_rate,
        };

        let resp = self
            .client
            .post("https://api.play.ht/api/v2/tts/stream")
            .header("X-User-ID", &self.config.user_id)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "playht stream: {}",
                resp.status()
            )));
        }

        let byte_stream = resp
            .bytes_stream()
            .map(|r| r.map(|b| b.to_vec()).map_err(|e| GatewayError::ProviderFailed(e.to_string())));

        Ok((Box::pin(byte_stream), StreamMetadata { total_bytes: None }))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stream: true,
            supports_timestamps: false,
            supports_cancellation: true,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.list_voices().await {
            Ok(voices) => HealthStatus { ok: true, voice_count: voices.len(), detail: None },
            Err(e) => HealthStatus { ok: false, voice_count: 0, detail: Some(e.to_string()) },
        }
    }
}
