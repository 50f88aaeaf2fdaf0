use crate::engine::{HotwordEmbedding, OfflineEngine};

/// Compile a request's hotword list
///
/// Blank lists skip the engine entirely. Compilation failures are logged and
/// degrade to recognition without hotwords.
pub fn compile(engine: &dyn OfflineEngine, hotwords: &str) -> HotwordEmbedding {
    if hotwords.trim().is_empty() {
        return HotwordEmbedding::default();
    }

    match engine.compile_hotwords(hotwords) {
        Ok(embedding) => {
            tracing::debug!(phrases = embedding.len(), "hotwords compiled");
            embedding
        }
        Err(e) => {
            tracing::warn!(error = %e, "hotword compilation failed, continuing without hotwords");
            HotwordEmbedding::default()
        }
    }
}
