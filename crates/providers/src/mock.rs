//! The silent fallback adapter (spec §4.E, "used when no adapter initialises").

use async_trait::async_trait;
use ovp_core::{Capabilities, HealthStatus, ProviderAdapter, Result, SynthesizeOptions, Voice};

/// Ten milliseconds of silence at 16kHz/16-bit mono, wrapped in a minimal
/// WAV header. Long enough to be a valid playable file, short enough that
/// nobody mistakes it for real audio.
const SILENT_WAV: &[u8] = &[
    0x52, 0x49, 0x46, 0x46, // "RIFF"
    0x24, 0x00, 0x00, 0x00, // chunk size (36 + 0 data bytes)
    0x57, 0x41, 0x56, 0x45, // "WAVE"
    0x66, 0x6d, 0x74, 0x20, // "fmt "
    0x10, 0x00, 0x00, 0x00, // subchunk size 16
    0x01, 0x00, // PCM
    0x01, 0x00, // mono
    0x80, 0x3e, 0x00, 0x00, // 16000 Hz
    0x00, 0x7d, 0x00, 0x00, // byte rate
    0x02, 0x00, // block align
    0x10, 0x00, // 16 bits per sample
    0x64, 0x61, 0x74, 0x61, // "data"
    0x00, 0x00, 0x00, 0x00, // 0 bytes of payload
];

pub struct MockAdapter;

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(vec![Voice {
            id: "silence".to_string(),
            name: "Silence".to_string(),
            languages: vec!["en".to_string()],
            locale: None,
            gender: None,
        }])
    }

    async fn synthesize(&self, _text: &str, _options: &SynthesizeOptions) -> Result<Vec<u8>> {
        Ok(SILENT_WAV.to_vec())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            ok: true,
            voice_count: 1,
            detail: None,
        }
    }
}
