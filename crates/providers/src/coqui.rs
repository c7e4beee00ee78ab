//! The on-device model runner adapter.
//!
//! Talks to a local model server (the common Coqui TTS deployment shape:
//! `tts-server --model_name ...` listening on localhost) over plain HTTP.
//! No cloud credentials, so construction never fails for lack of a key —
//! only for the server being unreachable, which `health_check` surfaces.

use async_trait::async_trait;
use ovp_core::{Capabilities, GatewayError, HealthStatus, ProviderAdapter, Result, SynthesizeOptions, Voice, VoiceGender};
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoquiConfig {
    pub base_url: String,
}

impl Default for CoquiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5002".to_string(),
        }
    }
}

pub struct CoquiAdapter {
    config: CoquiConfig,
    client: Client,
}

impl CoquiAdapter {
    pub fn new(config: CoquiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Config(format!("coqui http client: {e}")))?;
        Ok(Self { config, client })
    }
}

fn static_voices() -> Vec<Voice> {
    vec![Voice {
        id: "default".to_string(),
        name: "On-device default".to_string(),
        languages: vec!["en".to_string()],
        locale: None,
        gender: Some(VoiceGender::Neutral),
    }]
}

#[async_trait]
impl ProviderAdapter for CoquiAdapter {
    fn provider_id(&self) -> &str {
        "coqui"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(static_voices())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(format!("{}/api/tts", self.config.base_url))
            .query(&[("text", text), ("speaker_id", options.voice_id.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(format!("coqui server: {e}")))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "coqui synthesize: {}",
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
        match self.client.get(format!("{}/", self.config.base_url)).send().await {
            Ok(resp) if resp.status().is_success() => HealthStatus {
                ok: true,
                voice_count: static_voices().len(),
                detail: None,
            },
            Ok(resp) => HealthStatus {
                ok: false,
                voice_count: 0,
                detail: Some(format!("status {}", resp.status())),
            },
            Err(e) => HealthStatus {
                ok: false,
                voice_count: 0,
                detail: Some(e.to_string()),
            },
        }
    }
}
