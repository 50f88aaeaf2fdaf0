use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use hark_config::{Config, EngineBackendConfig, UpstreamConfig};
use url::Url;

/// Configuration file looked up in the working directory when `--config` is not given
const DEFAULT_CONFIG_FILE: &str = "hark.toml";

/// Hark offline speech recognition server
#[derive(Debug, Parser)]
#[command(name = "hark", about = "HTTP front end for offline speech recognition")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "HARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, env = "HARK_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Override the ASR model directory
    #[arg(long, env = "HARK_MODEL_DIR")]
    pub model_dir: Option<String>,

    /// Override the engine inference thread count
    #[arg(long, env = "HARK_THREAD_NUM")]
    pub thread_num: Option<usize>,

    /// Use an upstream transcription service at this URL
    #[arg(long, env = "HARK_UPSTREAM_URL")]
    pub upstream_url: Option<Url>,
}

impl Args {
    /// Configuration file to load, if any
    ///
    /// An explicit `--config` must exist; the default file is optional.
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => Path::new(DEFAULT_CONFIG_FILE)
                .is_file()
                .then(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        }
    }

    /// Load the configuration and apply command line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded or the
    /// resulting configuration is invalid
    pub fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match self.config_path() {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        };

        self.apply_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen_address = listen;
        }

        if let Some(model_dir) = &self.model_dir {
            config.engine.model_dir.clone_from(model_dir);
        }

        if let Some(thread_num) = self.thread_num {
            config.engine.thread_num = thread_num;
        }

        if let Some(url) = &self.upstream_url {
            match &mut config.engine.backend {
                Some(EngineBackendConfig::Upstream(upstream)) => upstream.base_url = url.clone(),
                None => config.engine.backend = Some(EngineBackendConfig::Upstream(UpstreamConfig::new(url.clone()))),
            }
        }
    }
}
