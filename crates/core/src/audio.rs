//! Audio container/format types and raw PCM conversion helpers.
//!
//! The gateway never decodes or encodes audio itself beyond what the wire
//! contract requires: stripping a WAV header and down-converting sample
//! width when a caller asks for `output_format=pcm_24000`.

use serde::{Deserialize, Serialize};

/// Output container a provider adapter can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Pcm16,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Pcm16 => "audio/l16",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wav" | "audio/wav" => Some(AudioFormat::Wav),
            "mp3" | "audio/mpeg" => Some(AudioFormat::Mp3),
            "pcm16" | "pcm_16" | "audio/l16" => Some(AudioFormat::Pcm16),
            _ => None,
        }
    }
}

/// Sample rate in Hz, as requested by a caller.
pub type SampleRateHz = u32;

/// Locate the `data` sub-chunk of a RIFF/WAVE file and return
/// `(bits_per_sample, channels, sample_rate, data_offset, data_len)`.
///
/// Scans only the first `SCAN_WINDOW` bytes, per the wire contract: WAV
/// headers in practice are a handful of chunks and never need more.
const SCAN_WINDOW: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct WavHeader {
    pub bits_per_sample: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub data_offset: usize,
    pub data_len: usize,
}

pub fn parse_wav_header(bytes: &[u8]) -> Option<WavHeader> {
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let scan_end = bytes.len().min(SCAN_WINDOW);
    let mut fmt: Option<(u16, u16, u32)> = None;
    let mut data: Option<(usize, usize)> = None;

    let mut pos = 12;
    while pos + 8 <= scan_end {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let body_start = pos + 8;

        if chunk_id == b"fmt " && body_start + 16 <= bytes.len() {
            let channels = u16::from_le_bytes(bytes[body_start + 2..body_start + 4].try_into().ok()?);
            let sample_rate = u32::from_le_bytes(bytes[body_start + 4..body_start + 8].try_into().ok()?);
            let bits_per_sample =
                u16::from_le_bytes(bytes[body_start + 14..body_start + 16].try_into().ok()?);
            fmt = Some((bits_per_sample, channels, sample_rate));
        } else if chunk_id == b"data" {
            let len = chunk_len.min(bytes.len().saturating_sub(body_start));
            data = Some((body_start, len));
            break;
        }

        pos = body_start + chunk_len + (chunk_len % 2);
    }

    let (bits_per_sample, channels, sample_rate) = fmt?;
    let (data_offset, data_len) = data?;

    Some(WavHeader {
        bits_per_sample,
        channels,
        sample_rate,
        data_offset,
        data_len,
    })
}

/// Strip the RIFF header from a WAV buffer and return the raw 16-bit PCM
/// payload, down-converting 24-/32-bit samples by arithmetic shift with
/// saturation and collapsing to mono if the source is stereo.
pub fn wav_to_pcm16_mono(bytes: &[u8]) -> Vec<u8> {
    let Some(header) = parse_wav_header(bytes) else {
        return Vec::new();
    };

    let data = &bytes[header.data_offset..header.data_offset + header.data_len];

    let samples_i32: Vec<i32> = match header.bits_per_sample {
        16 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect(),
        24 => data
            .chunks_exact(3)
            .map(|c| {
                let raw = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
                // sign-extend 24-bit, then shift down to 16-bit range.
                let signed = (raw << 8) >> 8;
                signed >> 8
            })
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|c| {
                let raw = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                raw >> 16
            })
            .collect(),
        _ => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect(),
    };

    let saturated: Vec<i16> = samples_i32
        .iter()
        .map(|&s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect();

    let mono: Vec<i16> = if header.channels == 2 {
        saturated
            .chunks_exact(2)
            .map(|c| (((c[0] as i32) + (c[1] as i32)) / 2) as i16)
            .collect()
    } else {
        saturated
    };

    mono.into_iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav(bits: u16, channels: u16, rate: u32, samples: &[i32]) -> Vec<u8> {
        let bytes_per_sample = (bits / 8) as usize;
        let data_len = samples.len() * bytes_per_sample;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&rate.to_le_bytes());
        buf.extend_from_slice(&(rate * channels as u32 * bytes_per_sample as u32).to_le_bytes());
        buf.extend_from_slice(&((channels as usize * bytes_per_sample) as u16).to_le_bytes());
        buf.extend_from_slice(&bits.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        for &s in samples {
            match bits {
                16 => buf.extend_from_slice(&(s as i16).to_le_bytes()),
                32 => buf.extend_from_slice(&s.to_le_bytes()),
                _ => unreachable!(),
            }
        }
        buf
    }

    #[test]
    fn parses_16_bit_mono_header() {
        let wav = make_wav(16, 1, 22050, &[100, -100, 200]);
        let header = parse_wav_header(&wav).unwrap();
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.channels, 1);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.data_len, 6);
    }

    #[test]
    fn strips_header_and_keeps_sample_count() {
        let wav = make_wav(16, 1, 16000, &[1000, -1000, 2000, -2000]);
        let pcm = wav_to_pcm16_mono(&wav);
        assert_eq!(pcm.len(), 8);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 1000);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let wav = make_wav(16, 2, 16000, &[1000, 3000, -1000, -3000]);
        let pcm = wav_to_pcm16_mono(&wav);
        // two stereo frames -> two mono samples
        assert_eq!(pcm.len(), 4);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 2000);
    }

    #[test]
    fn downconverts_32_bit_with_saturation() {
        let wav = make_wav(32, 1, 44100, &[i32::MAX, i32::MIN]);
        let pcm = wav_to_pcm16_mono(&wav);
        let s0 = i16::from_le_bytes([pcm[0], pcm[1]]);
        let s1 = i16::from_le_bytes([pcm[2], pcm[3]]);
        assert_eq!(s0, i16::MAX);
        assert_eq!(s1, i16::MIN);
    }
}
