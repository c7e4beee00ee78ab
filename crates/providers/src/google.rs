//! The multilingual cloud service adapter.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ovp_core::{
    AudioFormat, Capabilities, GatewayError, HealthStatus, ProviderAdapter, Result,
    SynthesizeOptions, Voice, VoiceGender,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
}

pub struct GoogleAdapter {
    config: GoogleConfig,
    client: Client,
}

impl GoogleAdapter {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Config(format!("google http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn base(&self) -> String {
        format!("https://texttospeech.googleapis.com/v1beta1?key={}", self.config.api_key)
    }
}

#[derive(Serialize)]
struct SynthRequest {
    input: SynthInput,
    voice: SynthVoice,
    #[serde(rename = "audioConfig")]
    audio_config: SynthAudioConfig,
}

#[derive(Serialize)]
struct SynthInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssml: Option<String>,
}

#[derive(Serialize)]
struct SynthVoice {
    #[serde(rename = "languageCode")]
    language_code: String,
    name: String,
}

#[derive(Serialize)]
struct SynthAudioConfig {
    #[serde(rename = "audioEncoding")]
    audio_encoding: &'static str,
    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,
}

#[derive(Deserialize)]
struct SynthResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

#[derive(Deserialize)]
struct ListVoicesResponse {
    voices: Vec<GoogleVoiceEntry>,
}

#[derive(Deserialize)]
struct GoogleVoiceEntry {
    name: String,
    #[serde(rename = "languageCodes")]
    language_codes: Vec<String>,
    #[serde(rename = "ssmlGender")]
    ssml_gender: String,
}

fn language_code_for(voice_id: &str) -> String {
    // Google voice names are `<lang>-<region>-<family>-<letter>`; the
    // first two segments are the language code.
    voice_id
        .split('-')
        .take(2)
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider_id(&self) -> &str {
        "google"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let url = format!(
            "https://texttospeech.googleapis.com/v1beta1/voices?key={}",
            self.config.api_key
        );
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderUnavailable(format!(
                "google voices list: {}",
                resp.status()
            )));
        }

        let parsed: ListVoicesResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        Ok(parsed
            .voices
            .into_iter()
            .map(|v| Voice {
                languages: v.language_codes.clone(),
                locale: v.language_codes.first().cloned(),
                gender: match v.ssml_gender.as_str() {
                    "MALE" => Some(VoiceGender::Male),
                    "FEMALE" => Some(VoiceGender::Female),
                    _ => Some(VoiceGender::Neutral),
                },
                name: v.name.clone(),
                id: v.name,
            })
            .collect())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let encoding = match options.format {
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Wav => "LINEAR16",
            AudioFormat::Pcm16 => "LINEAR16",
        };

        let req = SynthRequest {
            input: if options.ssml {
                SynthInput { text: None, ssml: Some(text.to_string()) }
            } else {
                SynthInput { text: Some(text.to_string()), ssml: None }
            },
            voice: SynthVoice {
                language_code: language_code_for(&options.voice_id),
                name: options.voice_id.clone(),
            },
            audio_config: SynthAudioConfig {
                audio_encoding: encoding,
                sample_rate_hertz: options.sample_rate,
            },
        };

        let resp = self
            .client
            .post(format!(
                "https://texttospeech.googleapis.com/v1beta1/text:synthesize?key={}",
                self.config.api_key
            ))
            .json(&req)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::ProviderFailed(format!(
                "google synthesize: {}",
                resp.status()
            )));
        }

        let parsed: SynthResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::ProviderFailed(e.to_string()))?;

        STANDARD
            .decode(parsed.audio_content)
            .map_err(|e| GatewayError::ProviderFailed(format!("invalid base64 audio: {e}")))
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
            Ok(voices) => HealthStatus { ok: true, voice_count: voices.len(), detail: None },
            Err(e) => HealthStatus { ok: false, voice_count: 0, detail: Some(e.to_string()) },
        }
    }
}
