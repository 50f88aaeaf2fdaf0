use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;

use crate::types::AudioFormat;

/// Size of a canonical RIFF/WAVE header
const CANONICAL_HEADER_LEN: usize = 44;

/// First offset at which a `data` chunk id may appear
const FIRST_CHUNK_OFFSET: usize = 36;

/// Audio ready for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAudio {
    pub pcm: Bytes,
    /// Format after normalization
    pub format: AudioFormat,
    /// Bytes stripped from the front of the upload
    pub data_offset: usize,
}

/// Strip a WAV header when the upload looks like a WAV file
///
/// Detection is heuristic: a declared `wav` format or a `.wav` file name
/// together with a `RIFF` magic. The `data` chunk is searched from byte 36;
/// if it cannot be found the canonical 44 byte header is assumed. Anything
/// else is passed to the engine unchanged.
pub fn normalize(raw: Bytes, declared: AudioFormat, file_name: &str) -> NormalizedAudio {
    if declared != AudioFormat::Pcm && (declared == AudioFormat::Wav || has_wav_extension(file_name)) {
        if raw.len() > CANONICAL_HEADER_LEN && raw.starts_with(b"RIFF") {
            let data_offset = find_data_chunk(&raw).unwrap_or(CANONICAL_HEADER_LEN);

            return NormalizedAudio {
                pcm: raw.slice(data_offset..),
                format: AudioFormat::Pcm,
                data_offset,
            };
        }

        tracing::debug!(bytes = raw.len(), "declared wav upload has no RIFF header, passing through");
    }

    NormalizedAudio {
        pcm: raw,
        format: declared,
        data_offset: 0,
    }
}

fn has_wav_extension(file_name: &str) -> bool {
    file_name.len() >= 4
        && file_name
            .get(file_name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".wav"))
}

/// Offset of the first sample after the `data` chunk header
fn find_data_chunk(raw: &[u8]) -> Option<usize> {
    raw.get(FIRST_CHUNK_OFFSET..raw.len().saturating_sub(5))?
        .windows(4)
        .position(|window| window == b"data")
        .map(|position| FIRST_CHUNK_OFFSET + position + 8)
}

static LENIENT: LazyLock<GeneralPurpose> = LazyLock::new(|| {
    GeneralPurpose::new(
        &base64::alphabet::STANDARD,
        GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_decode_allow_trailing_bits(true),
    )
});

/// Decode a base64 audio payload
///
/// A `data:<mime>;base64,` prefix is removed first. Strict decoding is tried
/// before a lenient pass that skips characters outside the alphabet, accepts
/// the URL-safe alphabet and ignores padding. Text that still cannot be
/// decoded yields an empty buffer, which callers reject as empty audio.
pub fn decode_base64(text: &str) -> Bytes {
    let payload = strip_data_url(text.trim());

    if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(payload) {
        return Bytes::from(decoded);
    }

    let mut cleaned: String = payload
        .chars()
        .filter_map(|c| match c {
            '-' => Some('+'),
            '_' => Some('/'),
            c if c.is_ascii_alphanumeric() || c == '+' || c == '/' => Some(c),
            _ => None,
        })
        .collect();

    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }

    match LENIENT.decode(&cleaned) {
        Ok(decoded) => Bytes::from(decoded),
        Err(e) => {
            tracing::warn!("failed to decode base64 audio: {e}");
            Bytes::new()
        }
    }
}

fn strip_data_url(text: &str) -> &str {
    if text.starts_with("data:")
        && let Some(index) = text.find(";base64,")
    {
        return &text[index + ";base64,".len()..];
    }

    text
}
