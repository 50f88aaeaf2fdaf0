use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Expands `{{ env.VAR }}` placeholders before parsing. The result is not
    /// validated so command line overrides can still be applied; call
    /// [`Config::validate`] once the configuration is final.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, or the TOML does not match the configuration schema
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if placeholder expansion or TOML parsing fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))
    }

    /// Validate that the configuration can start an engine session
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_engine()?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        if self.server.worker_threads == 0 {
            anyhow::bail!("server.worker_threads must be greater than 0");
        }

        if self.server.body_limit == 0 {
            anyhow::bail!("server.body_limit must be greater than 0");
        }

        if self.server.health.enabled && !self.server.health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/'");
        }

        Ok(())
    }

    fn validate_engine(&self) -> anyhow::Result<()> {
        let engine = &self.engine;

        if engine.model_dir.trim().is_empty() {
            anyhow::bail!("engine.model_dir is required");
        }

        if engine.thread_num == 0 {
            anyhow::bail!("engine.thread_num must be greater than 0");
        }

        let decoder = &engine.decoder;
        for (name, value) in [
            ("global_beam", decoder.global_beam),
            ("lattice_beam", decoder.lattice_beam),
            ("am_scale", decoder.am_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("engine.decoder.{name} must be a positive number");
            }
        }

        match &engine.backend {
            None => anyhow::bail!("engine.backend must be configured"),
            Some(crate::EngineBackendConfig::Upstream(upstream)) => {
                upstream.timeout_duration()?;
            }
        }

        Ok(())
    }
}
