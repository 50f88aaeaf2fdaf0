//! Test server wrapper that starts Hark on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use asr::OfflineEngine;
use hark_config::Config;
use hark_server::{Server, ServerHandle};
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: ServerHandle,
    task: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server whose engine comes from the configuration
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        Self::launch(Server::new(&config)?).await
    }

    /// Start a test server around a stub engine
    pub async fn with_engine(config: Config, engine: Arc<dyn OfflineEngine>) -> anyhow::Result<Self> {
        Self::launch(Server::with_engine(&config, engine)?).await
    }

    async fn launch(server: Server) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let handle = server.handle();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let task = tokio::spawn(server.serve_with_listener(listener, shutdown.clone()));

        let client = reqwest::Client::new();

        Ok(Self {
            addr,
            shutdown,
            handle,
            task: Some(task),
            client,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Trigger graceful shutdown and wait for the server task to finish
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
