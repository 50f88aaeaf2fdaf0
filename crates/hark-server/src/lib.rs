#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod health;
mod lifecycle;

use std::net::SocketAddr;
use std::sync::Arc;

use asr::{EngineSession, OfflineEngine, Recognizer};
use axum::Router;
use hark_config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use lifecycle::{LifecycleState, ServerHandle};
use lifecycle::Lifecycle;

/// Assembled server with all routes and middleware
///
/// Owns the process-wide engine session; stopping or dropping the server
/// releases it exactly once.
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    lifecycle: Arc<Lifecycle>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the engine session cannot be created; the server
    /// never reaches the listening state in that case
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let recognizer = asr::build_recognizer(config)?;
        Self::from_recognizer(config, recognizer)
    }

    /// Build the server around an already constructed engine
    ///
    /// # Errors
    ///
    /// Returns an error if the lifecycle cannot be initialised
    pub fn with_engine(config: &Config, engine: Arc<dyn OfflineEngine>) -> anyhow::Result<Self> {
        let recognizer = asr::recognizer_for(EngineSession::new(engine), config);
        Self::from_recognizer(config, Arc::new(recognizer))
    }

    fn from_recognizer(config: &Config, recognizer: Arc<Recognizer>) -> anyhow::Result<Self> {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.initialize(recognizer.session().clone())?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.merge(health::health_router(
                &config.server.health.path,
                ServerHandle::new(Arc::clone(&lifecycle)),
            ));
        }

        // Recognition routes
        app = app.merge(asr::endpoint_router(recognizer));

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address: config.server.listen_address,
            lifecycle,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Handle that can observe and stop the server after `serve` consumed it
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(Arc::clone(&self.lifecycle))
    }

    /// Stop the server
    ///
    /// Before `serve` this releases the engine session at once; while serving
    /// the session is released after in-flight requests complete.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop()
    }

    /// Start serving requests on the configured address
    ///
    /// Blocks until the cancellation token is triggered or the server is
    /// stopped through a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_address)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", self.listen_address))?;

        self.serve_with_listener(listener, shutdown).await
    }

    /// Start serving requests on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not in the initialized state or
    /// serving fails
    pub async fn serve_with_listener(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.lifecycle.begin_listening()?;

        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let stop = self.lifecycle.stop_token();

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    () = stop.cancelled() => {}
                }
                tracing::info!("graceful shutdown initiated");
            })
            .await;

        self.lifecycle.finish();

        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use asr::{
        DecoderParams, DecoderResource, EngineError, HotwordEmbedding, InferenceInput, RecognitionOutput,
    };
    use async_trait::async_trait;
    use hark_config::{EngineBackendConfig, UpstreamConfig};

    use super::*;

    struct SilentEngine {
        shutdowns: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl OfflineEngine for SilentEngine {
        fn name(&self) -> &str {
            "silent"
        }

        fn compile_hotwords(&self, _hotwords: &str) -> Result<HotwordEmbedding, EngineError> {
            Ok(HotwordEmbedding::default())
        }

        fn create_decoder(&self, _params: &DecoderParams) -> Option<Box<dyn DecoderResource>> {
            None
        }

        async fn infer(&self, _input: InferenceInput<'_>) -> Result<Option<Box<dyn RecognitionOutput>>, EngineError> {
            Ok(None)
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn engine() -> Arc<SilentEngine> {
        Arc::new(SilentEngine {
            shutdowns: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    fn shutdowns(engine: &SilentEngine) -> usize {
        engine.shutdowns.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[test]
    fn stop_is_idempotent() {
        let engine = engine();
        let server = Server::with_engine(&Config::default(), Arc::clone(&engine) as _).unwrap();
        let handle = server.handle();

        assert_eq!(handle.state(), LifecycleState::Initialized);
        assert!(handle.stop());
        assert!(!server.stop());
        assert_eq!(server.state(), LifecycleState::Stopped);

        drop(server);
        assert_eq!(shutdowns(&engine), 1);
    }

    #[test]
    fn dropping_unstarted_server_releases_engine() {
        let engine = engine();
        drop(Server::with_engine(&Config::default(), Arc::clone(&engine) as _).unwrap());

        assert_eq!(shutdowns(&engine), 1);
    }

    #[test]
    fn engine_startup_failure_is_fatal() {
        let mut config = Config::default();
        config.engine.model_dir = "/models/asr".to_string();
        assert!(Server::new(&config).is_err());

        let mut upstream = UpstreamConfig::new("http://127.0.0.1:9/v1".parse().unwrap());
        upstream.timeout = "never".to_string();
        config.engine.backend = Some(EngineBackendConfig::Upstream(upstream));
        assert!(Server::new(&config).is_err());
    }

    #[test]
    fn stopping_a_listening_server_defers_release() {
        let engine = engine();
        let lifecycle = Lifecycle::new();
        lifecycle.initialize(EngineSession::new(Arc::clone(&engine) as _)).unwrap();
        lifecycle.begin_listening().unwrap();

        assert!(lifecycle.stop());
        assert!(!lifecycle.stop());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.stop_token().is_cancelled());
        assert_eq!(shutdowns(&engine), 0);

        lifecycle.finish();
        lifecycle.finish();
        assert_eq!(shutdowns(&engine), 1);
    }

    #[tokio::test]
    async fn stopped_server_cannot_listen() {
        let server = Server::with_engine(&Config::default(), engine() as _).unwrap();
        server.stop();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = server
            .serve_with_listener(listener, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cannot move server"));
    }

    #[tokio::test]
    async fn handle_stop_ends_serving() {
        let engine = engine();
        let server = Server::with_engine(&Config::default(), Arc::clone(&engine) as _).unwrap();
        let handle = server.handle();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let task = tokio::spawn(server.serve_with_listener(listener, CancellationToken::new()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.state() != LifecycleState::Listening {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(handle.stop());
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(handle.state(), LifecycleState::Stopped);
        assert_eq!(shutdowns(&engine), 1);
    }
}
