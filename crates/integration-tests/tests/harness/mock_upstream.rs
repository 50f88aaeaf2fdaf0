//! Mock OpenAI-compatible transcription service for integration tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// How the mock answers transcription requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    /// `verbose_json` with segments and words
    Verbose,
    /// `204 No Content`
    Empty,
    /// `500` with an error body
    Failing,
}

/// One request as the mock received it
#[derive(Debug, Clone, Default)]
pub struct ReceivedRequest {
    pub fields: HashMap<String, Vec<String>>,
    pub file_name: Option<String>,
    pub file: Vec<u8>,
    pub authorization: Option<String>,
}

impl ReceivedRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|values| values.first()).map(String::as_str)
    }
}

struct MockState {
    mode: UpstreamMode,
    received: Mutex<Vec<ReceivedRequest>>,
}

/// Mock upstream that returns canned transcriptions
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start the mock server, returning immediately
    pub async fn start(mode: UpstreamMode) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            mode,
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/audio/transcriptions", routing::post(handle_transcription))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including the `/v1` prefix
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_transcription(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut received = ReceivedRequest {
        authorization: headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        ..ReceivedRequest::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_owned();

        if name == "file" {
            received.file_name = field.file_name().map(str::to_owned);
            received.file = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        } else {
            let value = field.text().await.unwrap_or_default();
            received.fields.entry(name).or_default().push(value);
        }
    }

    state.received.lock().unwrap().push(received);

    match state.mode {
        UpstreamMode::Verbose => Json(serde_json::json!({
            "task": "transcribe",
            "language": "zh",
            "duration": 1.5,
            "text": "欢迎使用语音识别",
            "segments": [
                {"id": 0, "text": "欢迎使用", "start": 0.0, "end": 0.8},
                {"id": 1, "text": "语音识别", "start": 0.8, "end": 1.5}
            ],
            "words": [
                {"word": "欢迎", "start": 0.0, "end": 0.4},
                {"word": "使用", "start": 0.4, "end": 0.8},
                {"word": "语音", "start": 0.8, "end": 1.1},
                {"word": "识别", "start": 1.1, "end": 1.5}
            ]
        }))
        .into_response(),
        UpstreamMode::Empty => StatusCode::NO_CONTENT.into_response(),
        UpstreamMode::Failing => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": {"message": "model not loaded"}})),
        )
            .into_response(),
    }
}
