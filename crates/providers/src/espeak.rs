//! The offline open-source engine adapter.
//!
//! Shells out to a local `espeak-ng` binary rather than linking against it,
//! matching how the gateway treats every other provider: an opaque process
//! boundary behind `ProviderAdapter`. No network credentials required, so
//! its fingerprint is always [`crate::fingerprint::anonymous_fingerprint`].

use async_trait::async_trait;
use ovp_core::{Capabilities, GatewayError, HealthStatus, ProviderAdapter, Result, SynthesizeOptions, Voice, VoiceGender};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct EspeakConfig {
    pub binary_path: String,
}

impl Default for EspeakConfig {
    fn default() -> Self {
        Self {
            binary_path: "espeak-ng".to_string(),
        }
    }
}

pub struct EspeakAdapter {
    config: EspeakConfig,
}

impl EspeakAdapter {
    pub fn new(config: EspeakConfig) -> Self {
        Self { config }
    }
}

/// A small fixed catalog; espeak-ng's real voice list is queried with
/// `--voices` but the gateway only needs enough entries to exercise the
/// façade-voice-id contract end to end.
fn static_voices() -> Vec<Voice> {
    vec![
        Voice {
            id: "en".to_string(),
            name: "English".to_string(),
            languages: vec!["en".to_string()],
            locale: Some("en-US".to_string()),
            gender: Some(VoiceGender::Neutral),
        },
        Voice {
            id: "en-gb".to_string(),
            name: "English (British)".to_string(),
            languages: vec!["en".to_string()],
            locale: Some("en-GB".to_string()),
            gender: Some(VoiceGender::Neutral),
        },
        Voice {
            id: "de".to_string(),
            name: "German".to_string(),
            languages: vec!["de".to_string()],
            locale: Some("de-DE".to_string()),
            gender: Some(VoiceGender::Neutral),
        },
    ]
}

#[async_trait]
impl ProviderAdapter for EspeakAdapter {
    fn provider_id(&self) -> &str {
        "espeak"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(static_voices())
    }

    async fn synthesize(&self, text: &str, options: &SynthesizeOptions) -> Result<Vec<u8>> {
        let output = Command::new(&self.config.binary_path)
            .arg("-v")
            .arg(&options.voice_id)
            .arg("--stdout")
            .arg(text)
            .output()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(format!("espeak-ng: {e}")))?;

        if !output.status.success() {
            return Err(GatewayError::ProviderFailed(format!(
                "espeak-ng exited with {:?}",
                output.status.code()
            )));
        }

        Ok(output.stdout)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_stream: false,
            supports_timestamps: false,
            supports_cancellation: false,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match Command::new(&self.config.binary_path).arg("--version").output().await {
            Ok(out) if out.status.success() => HealthStatus {
                ok: true,
                voice_count: static_voices().len(),
                detail: None,
            },
            Ok(out) => HealthStatus {
                ok: false,
                voice_count: 0,
                detail: Some(format!("exit code {:?}", out.status.code())),
            },
            Err(e) => HealthStatus {
                ok: false,
                voice_count: 0,
                detail: Some(e.to_string()),
            },
        }
    }
}
