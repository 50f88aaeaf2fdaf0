use bytes::Bytes;
use serde_json::Value;

use crate::error::{AsrError, Result};
use crate::types::{
    AudioFormat, DEFAULT_DISPLAY_NAME, DEFAULT_POST_PROCESS_LANGUAGE, DEFAULT_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ, RecognitionRequest,
};

/// Option values as received, before coercion
///
/// Every transport fills the same fields, so identical values resolve to
/// identical requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    pub wav_format: Option<String>,
    pub wav_name: Option<String>,
    pub itn: Option<String>,
    pub audio_fs: Option<String>,
    pub hotwords: Option<String>,
    pub svs_lang: Option<String>,
    pub svs_itn: Option<String>,
}

impl RawOptions {
    const NAMES: [&'static str; 7] = [
        "wav_format",
        "wav_name",
        "itn",
        "audio_fs",
        "hotwords",
        "svs_lang",
        "svs_itn",
    ];

    /// Whether `key` is a recognised option name
    pub fn accepts(key: &str) -> bool {
        Self::NAMES.contains(&key)
    }

    /// Set an option by its wire name; returns `false` for unknown names
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let slot = match key {
            "wav_format" => &mut self.wav_format,
            "wav_name" => &mut self.wav_name,
            "itn" => &mut self.itn,
            "audio_fs" => &mut self.audio_fs,
            "hotwords" => &mut self.hotwords,
            "svs_lang" => &mut self.svs_lang,
            "svs_itn" => &mut self.svs_itn,
            _ => return false,
        };

        *slot = Some(value.into());
        true
    }

    /// Options carried in a URL query string
    pub fn from_query(query: &str) -> Self {
        let mut options = Self::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            options.set(&key, value);
        }

        options
    }

    /// Overlay `other` on top of `self`; values present in `other` win
    #[must_use]
    pub fn merged_with(self, other: Self) -> Self {
        Self {
            wav_format: other.wav_format.or(self.wav_format),
            wav_name: other.wav_name.or(self.wav_name),
            itn: other.itn.or(self.itn),
            audio_fs: other.audio_fs.or(self.audio_fs),
            hotwords: other.hotwords.or(self.hotwords),
            svs_lang: other.svs_lang.or(self.svs_lang),
            svs_itn: other.svs_itn.or(self.svs_itn),
        }
    }
}

/// Audio bytes as received, with the upload file name when there is one
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Bytes,
    pub file_name: Option<String>,
}

/// Fields of a JSON request body
#[derive(Debug, Default)]
pub struct JsonBody {
    /// Base64 text of the `audio` field
    pub audio: Option<String>,
    pub options: RawOptions,
}

impl JsonBody {
    /// Parse a JSON object body
    ///
    /// Option values may be strings, booleans or numbers; `null` counts as
    /// absent. Unknown keys are ignored.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AsrError::InvalidBody("request body is empty".to_string()));
        }

        let value: Value = serde_json::from_slice(body).map_err(|e| AsrError::InvalidBody(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(AsrError::InvalidBody("expected a JSON object".to_string()));
        };

        let mut parsed = Self::default();

        for (key, value) in fields {
            if key == "audio" {
                parsed.audio = match value {
                    Value::Null => None,
                    Value::String(text) => Some(text),
                    _ => return Err(AsrError::InvalidBody("'audio' must be a base64 string".to_string())),
                };
                continue;
            }

            let text = match value {
                Value::Null => continue,
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                Value::Array(_) | Value::Object(_) if RawOptions::accepts(&key) => {
                    return Err(AsrError::InvalidBody(format!("'{key}' must be a string, boolean or number")));
                }
                Value::Array(_) | Value::Object(_) => continue,
            };

            parsed.options.set(&key, text);
        }

        Ok(parsed)
    }
}

fn flag(value: Option<&str>) -> bool {
    value.is_none_or(|value| value == "true")
}

fn sample_rate(value: Option<&str>) -> Result<u32> {
    let Some(value) = value else {
        return Ok(DEFAULT_SAMPLE_RATE_HZ);
    };

    match value.trim().parse::<u32>() {
        Ok(rate) if (1..=MAX_SAMPLE_RATE_HZ).contains(&rate) => Ok(rate),
        _ => Err(AsrError::InvalidParameter {
            name: "audio_fs",
            value: value.to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Resolve a payload and its options into a recognition request
///
/// # Errors
///
/// Fails with `MissingAudio` when there is no payload, `EmptyAudio` when it
/// has no bytes, and `InvalidParameter` when `audio_fs` is not an integer
/// between 1 and [`MAX_SAMPLE_RATE_HZ`]
pub fn resolve(payload: Option<AudioPayload>, options: RawOptions) -> Result<RecognitionRequest> {
    let payload = payload.ok_or(AsrError::MissingAudio)?;

    if payload.bytes.is_empty() {
        return Err(AsrError::EmptyAudio);
    }

    let sample_rate_hz = sample_rate(options.audio_fs.as_deref())?;
    let apply_itn = flag(options.itn.as_deref());
    let post_process_itn = flag(options.svs_itn.as_deref());

    let declared_format = options
        .wav_format
        .as_deref()
        .map_or(AudioFormat::Unknown, AudioFormat::from_hint);

    let upload_name = non_empty(payload.file_name);
    let wav_name = non_empty(options.wav_name);

    let display_name = wav_name
        .clone()
        .or_else(|| upload_name.clone())
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

    let file_name = upload_name.or(wav_name).unwrap_or_default();

    Ok(RecognitionRequest {
        audio: payload.bytes,
        declared_format,
        file_name,
        sample_rate_hz,
        apply_itn,
        hotwords: options.hotwords.unwrap_or_default(),
        post_process_language: non_empty(options.svs_lang)
            .unwrap_or_else(|| DEFAULT_POST_PROCESS_LANGUAGE.to_string()),
        post_process_itn,
        display_name,
    })
}
