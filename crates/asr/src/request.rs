use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, multipart::MultipartError};
use http::StatusCode;

use crate::{
    audio,
    error::{AsrError, Result},
    params::{self, AudioPayload, JsonBody, RawOptions},
    recognizer::Recognizer,
    types::{RecognitionRequest, Transport},
};

/// Multipart field names that carry the audio upload
const AUDIO_FIELD: &str = "file";
const AUDIO_FIELD_ALIAS: &str = "audio";

/// Extractor for recognition requests on any transport
///
/// Records the arrival time before the body is read so the reported
/// processing time covers upload parsing too.
pub struct ExtractRecognition {
    pub request: RecognitionRequest,
    pub started: Instant,
}

impl FromRequest<Arc<Recognizer>> for ExtractRecognition {
    type Rejection = AsrError;

    async fn from_request(request: http::Request<Body>, state: &Arc<Recognizer>) -> Result<Self> {
        let started = Instant::now();
        let (parts, body) = request.into_parts();

        let query = RawOptions::from_query(parts.uri.query().unwrap_or_default());

        let transport = Transport::from_content_type(
            parts
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default(),
        );

        tracing::debug!(transport = transport.as_str(), "recognition request received");

        let limit = state.body_limit();

        let (payload, options) = match transport {
            Transport::Multipart => {
                let request = http::Request::from_parts(parts, body);
                read_multipart(request, state).await?
            }
            Transport::Json => {
                let body = JsonBody::parse(&read_body(body, limit).await?)?;
                let payload = body.audio.map(|text| AudioPayload {
                    bytes: audio::decode_base64(&text),
                    file_name: None,
                });
                (payload, body.options)
            }
            Transport::Raw => {
                let bytes = read_body(body, limit).await?;
                let payload = (!bytes.is_empty()).then_some(AudioPayload {
                    bytes,
                    file_name: None,
                });
                (payload, RawOptions::default())
            }
        };

        let request = params::resolve(payload, query.merged_with(options))?;

        Ok(Self { request, started })
    }
}

async fn read_body(body: Body, limit: usize) -> Result<bytes::Bytes> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        if std::error::Error::source(&err).is_some_and(|source| source.is::<http_body_util::LengthLimitError>()) {
            AsrError::PayloadTooLarge(limit)
        } else {
            AsrError::InvalidBody(format!("Failed to read request body: {err}"))
        }
    })
}

async fn read_multipart(
    request: http::Request<Body>,
    state: &Arc<Recognizer>,
) -> Result<(Option<AudioPayload>, RawOptions)> {
    let limit = state.body_limit();

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AsrError::InvalidBody(format!("Failed to parse multipart form: {e}")))?;

    let field_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AsrError::PayloadTooLarge(limit)
        } else {
            AsrError::InvalidBody(format!("Failed to read multipart field: {e}"))
        }
    };

    let mut payload: Option<AudioPayload> = None;
    let mut options = RawOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            AUDIO_FIELD | AUDIO_FIELD_ALIAS => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(field_error)?;

                if payload.is_none() || name == AUDIO_FIELD {
                    payload = Some(AudioPayload { bytes, file_name });
                }
            }
            _ if RawOptions::accepts(&name) => {
                let value = field.text().await.map_err(field_error)?;
                options.set(&name, value);
            }
            _ => {
                tracing::debug!(field = %name, "ignoring unknown multipart field");
            }
        }
    }

    Ok((payload, options))
}
