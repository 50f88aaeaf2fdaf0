use std::net::SocketAddr;

use serde::Deserialize;

use crate::health::HealthConfig;

/// Port FunASR runtime servers listen on by default
pub const DEFAULT_PORT: u16 = 10095;

/// Default upper bound for an uploaded request body (32 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 32 << 20;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Size of the worker pool serving connections
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            worker_threads: default_worker_threads(),
            body_limit: DEFAULT_BODY_LIMIT,
            health: HealthConfig::default(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

#[allow(clippy::missing_const_for_fn)]
fn default_worker_threads() -> usize {
    8
}

#[allow(clippy::missing_const_for_fn)]
fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT
}
