#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod audio;
mod decoder;
mod engine;
mod error;
mod hotwords;
mod inference;
mod params;
mod recognizer;
mod request;
mod response;
mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::post,
};
use http::{HeaderValue, StatusCode, header};
use tower_http::set_header::SetResponseHeaderLayer;

pub use audio::{NormalizedAudio, decode_base64, normalize};
pub use decoder::DecoderGuard;
pub use engine::{
    CompiledHotword, DecoderParams, DecoderResource, EngineSession, HotwordEmbedding, InferenceInput, OfflineEngine,
    RecognitionOutput, UpstreamEngine, connect,
};
pub use error::{AsrError, EngineError, Result};
pub use inference::InferenceResult;
pub use params::{AudioPayload, JsonBody, RawOptions, resolve};
pub use recognizer::Recognizer;
pub use request::ExtractRecognition;
pub use response::{MODE_OFFLINE, RecognitionResponse, assemble};
pub use types::{AudioFormat, RecognitionRequest, Transport};

/// Paths the recognition handler is mounted on
pub const RECOGNITION_PATHS: [&str; 2] = ["/recognize", "/transcribe/normal"];

/// Build the recognizer from configuration
///
/// Creates the process-wide engine session. Failing here must keep the
/// server from listening.
pub fn build_recognizer(config: &hark_config::Config) -> anyhow::Result<Arc<Recognizer>> {
    let session = engine::connect(&config.engine).map_err(|e| anyhow::anyhow!("Failed to initialize ASR engine: {e}"))?;

    Ok(Arc::new(recognizer_for(session, config)))
}

/// Wrap an existing engine session with the configured request settings
pub fn recognizer_for(session: EngineSession, config: &hark_config::Config) -> Recognizer {
    let mut recognizer = Recognizer::new(session).with_body_limit(config.server.body_limit);

    if config.engine.decoder.enabled {
        recognizer = recognizer.with_decoder(DecoderParams::from(&config.engine.decoder));
    }

    recognizer
}

/// Create the endpoint router for recognition
///
/// Every response from these paths, errors included, carries the CORS
/// headers browsers need to call the service directly.
pub fn endpoint_router(recognizer: Arc<Recognizer>) -> Router {
    let body_limit = recognizer.body_limit();

    let mut router = Router::new();
    for path in RECOGNITION_PATHS {
        router = router.route(path, post(recognize).options(preflight));
    }

    let cors = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ));

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(recognizer)
}

/// Handle recognition requests
async fn recognize(
    State(recognizer): State<Arc<Recognizer>>,
    ExtractRecognition { request, started }: ExtractRecognition,
) -> Result<Json<RecognitionResponse>> {
    let response = recognizer.recognize(request, started).await?;

    Ok(Json(response))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}
