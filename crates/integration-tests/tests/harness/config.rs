//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use hark_config::{Config, EngineBackendConfig, EngineConfig, ServerConfig, UpstreamConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: SocketAddr::from(([127, 0, 0, 1], 0)),
                    worker_threads: 2,
                    ..ServerConfig::default()
                },
                engine: EngineConfig {
                    model_dir: "paraformer-test".to_owned(),
                    ..EngineConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Forward inference to a mock upstream service
    pub fn with_upstream(mut self, base_url: &str) -> Self {
        let mut upstream = UpstreamConfig::new(base_url.parse().expect("valid URL"));
        upstream.timeout = "5s".to_owned();
        self.config.engine.backend = Some(EngineBackendConfig::Upstream(upstream));
        self
    }

    /// Acquire a lattice decoder for every request
    pub fn with_decoder(mut self) -> Self {
        self.config.engine.decoder.enabled = true;
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.config.server.body_limit = bytes;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
