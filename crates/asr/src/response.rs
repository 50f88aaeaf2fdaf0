use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::inference::InferenceResult;

/// Recognition mode reported on every response
pub const MODE_OFFLINE: &str = "offline";

const NULL_RESULT_ERROR: &str = "Recognition failed";
const RESULT_PROCESSING_ERROR: &str = "Result processing failed";

/// Body of a completed recognition request
///
/// The schema is the same for degraded results: `error` is set and `text`
/// is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub text: String,
    pub mode: String,
    pub is_final: bool,
    pub wav_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp_sents: Option<serde_json::Value>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognitionResponse {
    fn new(display_name: &str) -> Self {
        Self {
            text: String::new(),
            mode: MODE_OFFLINE.to_string(),
            is_final: true,
            wav_name: display_name.to_string(),
            timestamp: None,
            stamp_sents: None,
            processing_time_ms: 0,
            error: None,
        }
    }

    fn degraded(display_name: &str, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(display_name)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Build the response for an inference outcome
///
/// Consumes and frees the engine result. A null result or an unreadable
/// transcript produce a degraded response; a malformed sentence timestamp
/// list is replaced by an empty string.
pub fn assemble(result: Option<InferenceResult>, display_name: &str, started: Instant) -> RecognitionResponse {
    let mut response = match result {
        None => {
            tracing::warn!(wav_name = display_name, "engine returned no result");
            RecognitionResponse::degraded(display_name, NULL_RESULT_ERROR)
        }
        Some(result) => {
            let response = from_output(&result, display_name);
            result.release();
            response
        }
    };

    response.processing_time_ms = elapsed_ms(started);
    response
}

fn from_output(result: &InferenceResult, display_name: &str) -> RecognitionResponse {
    let output = result.output();

    let text = match output.text() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(wav_name = display_name, error = %e, "result processing failed");
            return RecognitionResponse::degraded(display_name, RESULT_PROCESSING_ERROR);
        }
    };

    let timestamp = output.timestamp().filter(|timestamp| !timestamp.is_empty());

    let stamp_sents = output
        .stamp_sents()
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to parse sentence timestamps");
                serde_json::Value::String(String::new())
            })
        });

    RecognitionResponse {
        text,
        timestamp,
        stamp_sents,
        ..RecognitionResponse::new(display_name)
    }
}
