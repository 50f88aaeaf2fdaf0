use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AsrError>;

/// Failure reported by a recognition engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The process-wide session could not be created
    #[error("engine session could not be created: {0}")]
    Startup(String),

    /// The engine could not be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The audio handed to the engine cannot be encoded
    #[error("audio cannot be encoded: {0}")]
    InvalidAudio(String),

    /// The engine refused the input
    #[error("engine rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The engine answered with something that is not a recognition result
    #[error("engine returned malformed output: {0}")]
    InvalidOutput(String),

    /// The hotword list could not be compiled
    #[error("hotword compilation failed: {0}")]
    Hotwords(String),

    /// The session has already been shut down
    #[error("engine session has been released")]
    Released,
}

/// Recognition service errors with their HTTP status codes
#[derive(Debug, Error)]
pub enum AsrError {
    /// No audio payload was sent
    #[error("Missing audio file")]
    MissingAudio,

    /// The audio payload decoded to zero bytes
    #[error("Empty audio file")]
    EmptyAudio,

    /// The request body could not be read as the declared transport
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// An option value could not be coerced to its type
    #[error("Invalid value for '{name}': {value:?}")]
    InvalidParameter { name: &'static str, value: String },

    /// The body exceeded the configured limit
    #[error("Request body is too large, limit is {0} bytes")]
    PayloadTooLarge(usize),

    /// The inference call itself failed
    #[error("ASR inference failed")]
    EngineInvocation(#[source] EngineError),

    /// Internal server error
    /// If Some(message), the message is safe to show
    /// If None, details must not leak
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl AsrError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAudio | Self::EmptyAudio | Self::InvalidBody(_) | Self::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::EngineInvocation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to expose to API consumers
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(message)) => message.clone(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AsrError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "recognition request failed");
        } else {
            tracing::debug!(error = %self, "recognition request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.client_message(),
            }),
        )
            .into_response()
    }
}
