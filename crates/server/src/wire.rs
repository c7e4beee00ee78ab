//! Request/response body shapes and the audio wire-format negotiation
//! table (spec §6, §9 "Audio wire-format negotiation").

use ovp_core::{AudioFormat, FacadeVoice};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/text-to-speech/{voiceId}` and the `/stream/with-timestamps`
/// variant (spec §4.H stage 4).
#[derive(Debug, Deserialize)]
pub struct TtsRequestBody {
    pub text: String,
    #[serde(default)]
    pub voice_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Query parameters accepted by the `/v1/text-to-speech/*` routes.
#[derive(Debug, Deserialize, Default)]
pub struct TtsQuery {
    pub output_format: Option<String>,
    /// Non-standard compatibility flag: forces a synthesized alignment
    /// (spec §4.I, "When an older client requires synthesized alignment")
    /// instead of the canonical `null` when the provider has no native
    /// timings. Off by default.
    #[serde(default)]
    pub legacy_alignment: bool,
}

pub fn validate_text(text: &str, max_len: usize) -> Result<(), ovp_core::GatewayError> {
    if text.is_empty() {
        return Err(ovp_core::GatewayError::BadRequest("text must not be empty".to_string()));
    }
    if text.chars().count() > max_len {
        return Err(ovp_core::GatewayError::BadRequest(format!(
            "text exceeds maximum length of {max_len} characters"
        )));
    }
    Ok(())
}

/// ElevenLabs-shaped voice fields preserved verbatim for client
/// compatibility (spec §6). The fixed zero-valued `fine_tuning` struct
/// and empty array fields exist only so downstream clients that expect
/// the full ElevenLabs catalog shape don't choke on missing keys.
#[derive(Debug, Clone, Serialize)]
pub struct ElevenLabsVoiceWire {
    pub voice_id: String,
    pub name: String,
    pub samples: Option<()>,
    pub category: &'static str,
    pub fine_tuning: FineTuning,
    pub labels: VoiceLabels,
    pub description: String,
    pub preview_url: Option<String>,
    pub available_for_tiers: Vec<String>,
    pub settings: VoiceSettingsWire,
    pub sharing: Option<()>,
    pub high_quality_base_model_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FineTuning {
    pub is_allowed_to_fine_tune: bool,
    pub finetuning_state: &'static str,
    pub verification_failures: Vec<String>,
    pub verification_attempts_count: u32,
    pub manual_verification_requested: bool,
}

impl Default for FineTuning {
    fn default() -> Self {
        Self {
            is_allowed_to_fine_tune: false,
            finetuning_state: "not_started",
            verification_failures: Vec::new(),
            verification_attempts_count: 0,
            manual_verification_requested: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceLabels {
    pub engine: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceSettingsWire {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettingsWire {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

pub fn facade_to_elevenlabs_wire(voice: &FacadeVoice) -> ElevenLabsVoiceWire {
    ElevenLabsVoiceWire {
        voice_id: voice.id.clone(),
        name: voice.name.clone(),
        samples: None,
        category: "premade",
        fine_tuning: FineTuning::default(),
        labels: VoiceLabels {
            engine: voice.provider.clone(),
            language: voice.languages.first().cloned().unwrap_or_else(|| "en".to_string()),
        },
        description: voice.name.clone(),
        preview_url: None,
        available_for_tiers: Vec::new(),
        settings: VoiceSettingsWire::default(),
        sharing: None,
        high_quality_base_model_ids: Vec::new(),
    }
}

/// A provider's native output container — the adapters in this gateway
/// each produce exactly one. `synthesize()` is asked for `options.format`
/// but an adapter that talks to a fixed-format remote API returns its own
/// container regardless; the pipeline reconciles the two here rather than
/// each adapter branching on requested format (spec §9, "Two adapter
/// instances for one provider").
pub fn native_format(provider: &str) -> AudioFormat {
    match provider {
        "playht" | "elevenlabs" => AudioFormat::Mp3,
        _ => AudioFormat::Wav,
    }
}

/// One second of silence at 24kHz/16-bit mono, used as the documented
/// fallback when an MP3 response must be downconverted to PCM but no
/// decoder is available (spec §6, "MP3 inputs MUST be decoded or
/// replaced by an equivalent duration of silence").
fn silent_pcm_24000(seconds: f64) -> Vec<u8> {
    let sample_count = (24_000.0 * seconds) as usize;
    vec![0u8; sample_count * 2]
}

/// A single MPEG-1 Layer III frame (128kbps/44.1kHz mono, no CRC) holding
/// silence, used only for the legacy non-timestamped-path fallback (spec
/// §7, "`ProviderFailed` ... MAY respond with a tiny silent MP3 fallback").
/// Frame size is `floor(144 * 128000 / 44100) = 417` bytes; the header is
/// the only non-zero content, matching the minimal-valid-frame shape a
/// decoder needs to recognize and play back silence.
const SILENT_MP3_FRAME: [u8; 417] = {
    let mut frame = [0u8; 417];
    frame[0] = 0xFF;
    frame[1] = 0xFB;
    frame[2] = 0x90;
    frame[3] = 0x44;
    frame
};

/// Builds the legacy silent-MP3 fallback body for a `ProviderFailed`
/// response on the non-timestamped synthesis path.
pub fn silent_mp3_fallback() -> Vec<u8> {
    SILENT_MP3_FRAME.to_vec()
}

/// Applies the `output_format=pcm_24000` query contract (spec §6) to a
/// provider's native-format bytes, returning the transformed body and
/// its content type.
pub fn apply_output_format(native: AudioFormat, bytes: Vec<u8>, output_format: Option<&str>) -> (Vec<u8>, &'static str) {
    if output_format != Some("pcm_24000") {
        return (bytes, native.content_type());
    }

    match native {
        AudioFormat::Wav => (ovp_core::wav_to_pcm16_mono(&bytes), "audio/l16"),
        AudioFormat::Pcm16 => (bytes, "audio/l16"),
        AudioFormat::Mp3 => {
            tracing::warn!("cannot decode MP3 to PCM; substituting silence (spec §6 fallback)");
            (silent_pcm_24000(1.0), "audio/l16")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        assert!(validate_text("", 5000).is_err());
    }

    #[test]
    fn text_over_limit_is_rejected() {
        let text = "a".repeat(10);
        assert!(validate_text(&text, 5).is_err());
    }

    #[test]
    fn passthrough_when_no_output_format_requested() {
        let (bytes, ct) = apply_output_format(AudioFormat::Mp3, vec![1, 2, 3], None);
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(ct, "audio/mpeg");
    }

    #[test]
    fn mp3_without_decoder_falls_back_to_silence() {
        let (bytes, ct) = apply_output_format(AudioFormat::Mp3, vec![1, 2, 3], Some("pcm_24000"));
        assert_eq!(ct, "audio/l16");
        assert_eq!(bytes.len() % 2, 0);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn silent_mp3_fallback_has_a_valid_frame_sync_header() {
        let body = silent_mp3_fallback();
        assert_eq!(body.len(), 417);
        assert_eq!(&body[0..4], &[0xFF, 0xFB, 0x90, 0x44]);
        assert!(body[4..].iter().all(|&b| b == 0));
    }
}
