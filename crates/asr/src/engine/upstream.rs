use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use hark_config::UpstreamConfig;
use indexmap::IndexMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{
    DecoderParams, DecoderResource, EngineError, HotwordEmbedding, InferenceInput, OfflineEngine, RecognitionOutput,
    hotword_list,
};
use crate::types::DEFAULT_POST_PROCESS_LANGUAGE;

/// Engine backed by a remote OpenAI-compatible transcription service
///
/// The configured model directory is sent as the `model` field so a single
/// upstream can host several models. Local model options other than
/// `model-dir` have no effect on a remote engine.
pub struct UpstreamEngine {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl UpstreamEngine {
    pub fn connect(options: &IndexMap<&'static str, String>, config: &UpstreamConfig) -> Result<Self, EngineError> {
        let timeout = config
            .timeout_duration()
            .map_err(|e| EngineError::Startup(e.to_string()))?;

        let client = http_client(timeout)?;
        let endpoint = format!("{}/audio/transcriptions", config.base_url.as_str().trim_end_matches('/'));

        let model = options
            .get("model-dir")
            .cloned()
            .ok_or_else(|| EngineError::Startup("model-dir option is required".to_string()))?;

        let ignored: Vec<&str> = options
            .keys()
            .copied()
            .filter(|key| !matches!(*key, "model-dir" | "quantize" | "thread-num"))
            .collect();

        if !ignored.is_empty() {
            tracing::warn!(options = ?ignored, "model options are not used by the upstream engine");
        }

        tracing::debug!(%endpoint, %model, "upstream engine configured");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model,
        })
    }
}

fn http_client(timeout: Duration) -> Result<Client, EngineError> {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
        .build()
        .map_err(|e| EngineError::Startup(format!("failed to build HTTP client: {e}")))
}

/// Wrap 16-bit little-endian mono samples in a WAV container
///
/// A trailing odd byte is not a whole sample and is dropped.
fn wrap_wav(pcm: &[u8], sample_rate_hz: u32) -> Result<Vec<u8>, EngineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // The header stores the byte rate as a u32
    let block_align = u32::from(spec.channels) * u32::from(spec.bits_per_sample / 8);
    if sample_rate_hz == 0 || sample_rate_hz.checked_mul(block_align).is_none() {
        return Err(EngineError::InvalidAudio(format!("unsupported sample rate {sample_rate_hz} Hz")));
    }

    let wav_error = |e: hound::Error| EngineError::InvalidAudio(e.to_string());

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;

    for sample in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .map_err(wav_error)?;
    }

    writer.finalize().map_err(wav_error)?;

    Ok(cursor.into_inner())
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
struct Word {
    start: f64,
    end: f64,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn within(segment: &Segment, word: &Word) -> bool {
    word.start >= segment.start && word.end <= segment.end
}

/// Result of one upstream call
struct UpstreamOutput {
    transcription: VerboseTranscription,
}

impl RecognitionOutput for UpstreamOutput {
    fn text(&self) -> Result<String, EngineError> {
        Ok(self.transcription.text.trim().to_string())
    }

    fn timestamp(&self) -> Option<String> {
        let words = &self.transcription.words;
        if words.is_empty() {
            return None;
        }

        let pairs: Vec<[u64; 2]> = words.iter().map(|w| [millis(w.start), millis(w.end)]).collect();
        serde_json::to_string(&pairs).ok()
    }

    fn stamp_sents(&self) -> Option<String> {
        let segments = &self.transcription.segments;
        if segments.is_empty() {
            return None;
        }

        let sentences: Vec<serde_json::Value> = segments
            .iter()
            .map(|segment| {
                let ts_list: Vec<[u64; 2]> = self
                    .transcription
                    .words
                    .iter()
                    .filter(|word| within(segment, word))
                    .map(|word| [millis(word.start), millis(word.end)])
                    .collect();

                serde_json::json!({
                    "text_seg": segment.text.trim(),
                    "punc": "",
                    "start": millis(segment.start),
                    "end": millis(segment.end),
                    "ts_list": ts_list,
                })
            })
            .collect();

        serde_json::to_string(&sentences).ok()
    }
}

#[async_trait]
impl OfflineEngine for UpstreamEngine {
    fn name(&self) -> &str {
        "upstream"
    }

    fn compile_hotwords(&self, hotwords: &str) -> Result<HotwordEmbedding, EngineError> {
        hotword_list::parse(hotwords)
    }

    fn create_decoder(&self, _params: &DecoderParams) -> Option<Box<dyn DecoderResource>> {
        None
    }

    async fn infer(&self, input: InferenceInput<'_>) -> Result<Option<Box<dyn RecognitionOutput>>, EngineError> {
        let wav = wrap_wav(&input.pcm, input.sample_rate_hz)?;

        tracing::debug!(
            bytes = wav.len(),
            sample_rate_hz = input.sample_rate_hz,
            hotwords = input.hotwords.len(),
            "upstream transcription request"
        );

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::Unavailable(format!("invalid content type: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment")
            .text("itn", input.apply_itn.to_string())
            .text("svs_lang", input.post_process_language.to_string())
            .text("svs_itn", input.post_process_itn.to_string());

        if input.post_process_language != DEFAULT_POST_PROCESS_LANGUAGE {
            form = form.text("language", input.post_process_language.to_string());
        }

        if !input.hotwords.is_empty() {
            let phrases: Vec<&str> = input.hotwords.iter().map(|entry| entry.phrase.as_str()).collect();
            let weights: IndexMap<&str, f32> = input
                .hotwords
                .iter()
                .map(|entry| (entry.phrase.as_str(), entry.vector.first().copied().unwrap_or(hotword_list::DEFAULT_WEIGHT)))
                .collect();

            let weights = serde_json::to_string(&weights)
                .map_err(|e| EngineError::Hotwords(format!("failed to encode hotwords: {e}")))?;

            form = form.text("prompt", phrases.join(" ")).text("hotwords", weights);
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("upstream request failed: {e}");
            EngineError::Unavailable(format!("failed to reach upstream engine: {e}"))
        })?;

        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

            tracing::error!("upstream engine error ({status}): {message}");

            return Err(EngineError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let transcription: VerboseTranscription = response.json().await.map_err(|e| {
            tracing::error!("failed to parse upstream response: {e}");
            EngineError::InvalidOutput(e.to_string())
        })?;

        Ok(Some(Box::new(UpstreamOutput { transcription })))
    }

    fn shutdown(&self) {
        tracing::debug!(endpoint = %self.endpoint, "upstream engine shut down");
    }
}
