use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Recognition engine session configuration
///
/// Resolved once at startup. The model directories and thread count are
/// handed to the engine when the process-wide session is created.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// ASR model directory (required)
    #[serde(default)]
    pub model_dir: String,
    /// Load quantized model variants
    #[serde(default = "default_true")]
    pub quantize: bool,
    /// Voice activity detection model directory
    #[serde(default)]
    pub vad_dir: Option<String>,
    /// Quantized VAD model
    #[serde(default)]
    pub vad_quant: Option<String>,
    /// Punctuation model directory
    #[serde(default)]
    pub punc_dir: Option<String>,
    /// Quantized punctuation model
    #[serde(default)]
    pub punc_quant: Option<String>,
    /// Inverse text normalization tagger FST
    #[serde(default)]
    pub itn_tagger: Option<String>,
    /// Inverse text normalization verbalizer FST
    #[serde(default)]
    pub itn_verbalizer: Option<String>,
    /// Inference threads used by the engine session
    #[serde(default = "default_thread_num")]
    pub thread_num: usize,
    /// Per-request lattice decoder settings
    #[serde(default)]
    pub decoder: DecoderConfig,
    /// Engine implementation the session is created with
    #[serde(default)]
    pub backend: Option<EngineBackendConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: String::new(),
            quantize: true,
            vad_dir: None,
            vad_quant: None,
            punc_dir: None,
            punc_quant: None,
            itn_tagger: None,
            itn_verbalizer: None,
            thread_num: default_thread_num(),
            decoder: DecoderConfig::default(),
            backend: None,
        }
    }
}

impl EngineConfig {
    /// Model options in the key/value form engine sessions are created from
    ///
    /// Optional directories are only present when configured and non-empty.
    pub fn model_options(&self) -> IndexMap<&'static str, String> {
        let mut options = IndexMap::new();
        options.insert("model-dir", self.model_dir.clone());
        options.insert("quantize", self.quantize.to_string());
        options.insert("thread-num", self.thread_num.to_string());

        let optional = [
            ("vad-dir", &self.vad_dir),
            ("vad-quant", &self.vad_quant),
            ("punc-dir", &self.punc_dir),
            ("punc-quant", &self.punc_quant),
            ("itn-tagger", &self.itn_tagger),
            ("itn-verbalizer", &self.itn_verbalizer),
        ];

        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                options.insert(key, value.to_string());
            }
        }

        options
    }
}

/// Tuning constants for the optional per-request lattice decoder
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    /// Acquire a decoder resource for every request
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_beam")]
    pub global_beam: f32,
    #[serde(default = "default_beam")]
    pub lattice_beam: f32,
    /// Acoustic model scale
    #[serde(default = "default_am_scale")]
    pub am_scale: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            global_beam: default_beam(),
            lattice_beam: default_beam(),
            am_scale: default_am_scale(),
        }
    }
}

/// Supported engine backends
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineBackendConfig {
    /// Remote OpenAI-compatible transcription service
    Upstream(UpstreamConfig),
}

/// Remote transcription service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the service, e.g. `http://asr.internal:8000/v1`
    pub base_url: Url,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Request timeout, e.g. `120s` or `2m`
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl UpstreamConfig {
    /// Create an upstream configuration with the default timeout
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: default_timeout(),
        }
    }

    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if `timeout` is not a valid duration string
    pub fn timeout_duration(&self) -> anyhow::Result<Duration> {
        duration_str::parse(&self.timeout)
            .map_err(|e| anyhow::anyhow!("invalid upstream timeout '{}': {e}", self.timeout))
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_thread_num() -> usize {
    8
}

#[allow(clippy::missing_const_for_fn)]
fn default_beam() -> f32 {
    3.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_am_scale() -> f32 {
    10.0
}

fn default_timeout() -> String {
    "120s".to_string()
}
