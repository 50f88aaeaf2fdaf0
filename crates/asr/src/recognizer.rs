use std::time::Instant;

use hark_config::DEFAULT_BODY_LIMIT;

use crate::{
    audio,
    decoder::DecoderGuard,
    engine::{DecoderParams, EngineSession, InferenceInput},
    error::{AsrError, Result},
    hotwords, inference,
    response::{RecognitionResponse, assemble},
    types::RecognitionRequest,
};

/// Runs recognition requests against the shared engine session
pub struct Recognizer {
    session: EngineSession,
    decoder: Option<DecoderParams>,
    body_limit: usize,
}

impl Recognizer {
    pub fn new(session: EngineSession) -> Self {
        Self {
            session,
            decoder: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Acquire a lattice decoder with these constants for every request
    #[must_use]
    pub fn with_decoder(mut self, params: DecoderParams) -> Self {
        self.decoder = Some(params);
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Recognize one utterance
    ///
    /// A null or unreadable engine result still succeeds with a degraded
    /// response. Only a failing inference call is an error, and the decoder
    /// resource is released before it is returned.
    pub async fn recognize(&self, request: RecognitionRequest, started: Instant) -> Result<RecognitionResponse> {
        let engine = self.session.engine().map_err(|e| {
            tracing::error!(error = %e, "recognition attempted without an engine session");
            AsrError::Internal(None)
        })?;

        let audio = audio::normalize(request.audio, request.declared_format, &request.file_name);

        tracing::info!(
            wav_name = %request.display_name,
            bytes = audio.pcm.len(),
            header_bytes = audio.data_offset,
            format = %audio.format,
            sample_rate_hz = request.sample_rate_hz,
            "processing audio"
        );

        let hotwords = hotwords::compile(engine, &request.hotwords);
        let decoder = DecoderGuard::acquire(engine, self.decoder.as_ref());

        let input = InferenceInput {
            pcm: audio.pcm,
            sample_rate_hz: request.sample_rate_hz,
            hotwords: &hotwords,
            apply_itn: request.apply_itn,
            decoder: decoder.resource(),
            post_process_language: &request.post_process_language,
            post_process_itn: request.post_process_itn,
        };

        let result = inference::infer(engine, input).await.map_err(AsrError::EngineInvocation)?;

        let response = assemble(result, &request.display_name, started);
        decoder.release();

        if response.is_degraded() {
            tracing::warn!(
                wav_name = %response.wav_name,
                processing_time_ms = response.processing_time_ms,
                "recognition degraded"
            );
        } else {
            tracing::info!(
                wav_name = %response.wav_name,
                chars = response.text.chars().count(),
                processing_time_ms = response.processing_time_ms,
                "recognition complete"
            );
        }

        Ok(response)
    }
}
