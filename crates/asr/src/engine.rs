//! Boundary to the offline recognition engine
//!
//! Engines hand out opaque resources (decoders, results) that must be
//! released through the resource itself. The pipeline never releases them
//! directly; see [`crate::decoder::DecoderGuard`] and
//! [`crate::inference::InferenceResult`].

mod hotword_list;
pub(crate) mod upstream;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use hark_config::{EngineBackendConfig, EngineConfig};

pub use crate::error::EngineError;
pub use upstream::UpstreamEngine;

/// Compiled hotword biasing data
///
/// Holds one vector per phrase; every vector has the same width. An empty
/// embedding means "no hotwords".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotwordEmbedding {
    entries: Vec<CompiledHotword>,
}

/// A single biasing phrase and its engine representation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledHotword {
    pub phrase: String,
    pub vector: Vec<f32>,
}

impl HotwordEmbedding {
    /// Build an embedding from compiled phrases
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Hotwords` when vectors differ in width
    pub fn new(entries: Vec<CompiledHotword>) -> Result<Self, EngineError> {
        if let Some(first) = entries.first()
            && let Some(mismatch) = entries.iter().find(|entry| entry.vector.len() != first.vector.len())
        {
            return Err(EngineError::Hotwords(format!(
                "phrase '{}' has width {}, expected {}",
                mismatch.phrase,
                mismatch.vector.len(),
                first.vector.len()
            )));
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Width shared by every vector, `None` when empty
    pub fn width(&self) -> Option<usize> {
        self.entries.first().map(|entry| entry.vector.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledHotword> {
        self.entries.iter()
    }
}

/// Tuning constants for lattice decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderParams {
    pub global_beam: f32,
    pub lattice_beam: f32,
    pub am_scale: f32,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            global_beam: 3.0,
            lattice_beam: 3.0,
            am_scale: 10.0,
        }
    }
}

impl From<&hark_config::DecoderConfig> for DecoderParams {
    fn from(config: &hark_config::DecoderConfig) -> Self {
        Self {
            global_beam: config.global_beam,
            lattice_beam: config.lattice_beam,
            am_scale: config.am_scale,
        }
    }
}

/// Per-request decoding resource issued by an engine
///
/// Handed back to the issuing engine through [`InferenceInput::decoder`].
pub trait DecoderResource: Send + Sync {
    /// Return the resource to the engine
    fn release(self: Box<Self>) {}
}

/// Result of one inference call
///
/// Owned by whoever received it from [`OfflineEngine::infer`] until
/// [`RecognitionOutput::release`] is called.
pub trait RecognitionOutput: Send + Sync {
    /// Primary transcript
    fn text(&self) -> Result<String, EngineError>;

    /// Flat per-token timestamp string
    fn timestamp(&self) -> Option<String>;

    /// Sentence-level timestamps, as JSON text
    fn stamp_sents(&self) -> Option<String>;

    /// Free the result
    fn release(self: Box<Self>) {}
}

/// Input of one inference call
///
/// `pcm` is always raw 16-bit little-endian samples; container framing has
/// been stripped before the engine sees it.
pub struct InferenceInput<'a> {
    pub pcm: Bytes,
    pub sample_rate_hz: u32,
    pub hotwords: &'a HotwordEmbedding,
    pub apply_itn: bool,
    pub decoder: Option<&'a dyn DecoderResource>,
    pub post_process_language: &'a str,
    pub post_process_itn: bool,
}

/// Offline speech recognition engine
///
/// One instance serves every request of the process. Implementations must
/// tolerate concurrent calls.
#[async_trait]
pub trait OfflineEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Compile a free-text hotword list into the engine representation
    fn compile_hotwords(&self, hotwords: &str) -> Result<HotwordEmbedding, EngineError>;

    /// Acquire a lattice decoder; `None` when the engine has none to offer
    fn create_decoder(&self, params: &DecoderParams) -> Option<Box<dyn DecoderResource>>;

    /// Run recognition over a complete utterance
    ///
    /// `Ok(None)` means the engine ran but produced no result.
    async fn infer(&self, input: InferenceInput<'_>) -> Result<Option<Box<dyn RecognitionOutput>>, EngineError>;

    /// Tear down the session
    fn shutdown(&self);
}

/// The process-wide engine session
///
/// Cheap to clone. The engine is shut down exactly once, by the first
/// [`EngineSession::release`] or when the last clone is dropped.
#[derive(Clone)]
pub struct EngineSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    engine: Arc<dyn OfflineEngine>,
    released: AtomicBool,
}

impl SessionInner {
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.engine.shutdown();
        tracing::info!(engine = self.engine.name(), "engine session released");
        true
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.release();
    }
}

impl EngineSession {
    pub fn new(engine: Arc<dyn OfflineEngine>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                engine,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// The live engine
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Released` once the session has been released
    pub fn engine(&self) -> Result<&dyn OfflineEngine, EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }

        Ok(self.inner.engine.as_ref())
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Shut the engine down; returns `false` if it already was
    pub fn release(&self) -> bool {
        self.inner.release()
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("engine", &self.inner.engine.name())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Create the engine session described by the configuration
///
/// # Errors
///
/// Returns `EngineError::Startup` if no backend is configured or the backend
/// cannot be initialised
pub fn connect(config: &EngineConfig) -> Result<EngineSession, EngineError> {
    let options = config.model_options();

    let engine: Arc<dyn OfflineEngine> = match &config.backend {
        Some(EngineBackendConfig::Upstream(upstream)) => Arc::new(UpstreamEngine::connect(&options, upstream)?),
        None => return Err(EngineError::Startup("no engine backend configured".to_string())),
    };

    tracing::info!(
        engine = engine.name(),
        model_dir = %config.model_dir,
        thread_num = config.thread_num,
        "engine session created"
    );

    Ok(EngineSession::new(engine))
}
