use bytes::Bytes;

/// Sample rate assumed when a request does not declare one
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Highest sample rate a request may declare
pub const MAX_SAMPLE_RATE_HZ: u32 = 192_000;

/// Post-processing language used when a request does not name one
pub const DEFAULT_POST_PROCESS_LANGUAGE: &str = "auto";

/// Display name used when neither a `wav_name` nor an upload file name is given
pub const DEFAULT_DISPLAY_NAME: &str = "audio";

/// Audio container declared by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Raw 16-bit little-endian samples
    Pcm,
    /// RIFF/WAVE container
    Wav,
    /// Anything else, including no declaration at all
    Unknown,
}

impl AudioFormat {
    /// Interpret a `wav_format` option value
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "pcm" => Self::Pcm,
            "wav" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Wav => "wav",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the audio reached the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `multipart/form-data` upload with sidecar form fields
    Multipart,
    /// Audio bytes as the request body, options in the query string
    Raw,
    /// JSON object carrying base64 audio
    Json,
}

impl Transport {
    /// Pick the transport from a `Content-Type` header value
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type.split(';').next().unwrap_or_default().trim();

        if essence.eq_ignore_ascii_case("multipart/form-data") {
            Self::Multipart
        } else if essence.eq_ignore_ascii_case("application/json") {
            Self::Json
        } else {
            Self::Raw
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Multipart => "multipart",
            Self::Raw => "raw",
            Self::Json => "json",
        }
    }
}

/// A fully resolved recognition request
///
/// Identical option values produce identical requests regardless of the
/// transport they arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    /// Audio exactly as received, never empty
    pub audio: Bytes,
    /// Container declared through `wav_format`
    pub declared_format: AudioFormat,
    /// File name used to recognise container extensions
    pub file_name: String,
    pub sample_rate_hz: u32,
    /// Inverse text normalization of the transcript
    pub apply_itn: bool,
    /// Free-text hotword list, possibly empty
    pub hotwords: String,
    /// Language hint for the post-processing model (`svs_lang`)
    pub post_process_language: String,
    /// Inverse text normalization inside the post-processing model (`svs_itn`)
    pub post_process_itn: bool,
    /// Name echoed back as `wav_name`
    pub display_name: String,
}
