//! Startup configuration assembly.
//!
//! Order: config file (or defaults) → servers file → CLI overrides → validation.
//! Any error here is fatal.

use std::path::PathBuf;

use crate::config::{self, ConfigError, ProxyConfig};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Main config file (TOML, or JSON by extension).
    pub config_path: Option<PathBuf>,
    /// Servers file in `{"Servers": [...]}` form.
    pub servers_path: Option<PathBuf>,
    /// Seconds between health check cycles.
    pub health_interval_secs: Option<u64>,
    /// Listener bind address.
    pub bind_address: Option<String>,
    /// Serve plain HTTP.
    pub no_tls: bool,
}

/// Load, merge and validate the startup configuration.
pub fn prepare_config(overrides: &Overrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &overrides.config_path {
        Some(path) => config::load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(path) = &overrides.servers_path {
        config.servers = config::load_servers(path)?;
    }
    apply_overrides(&mut config, overrides);

    config::validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply the non-file overrides.
pub fn apply_overrides(config: &mut ProxyConfig, overrides: &Overrides) {
    if let Some(secs) = overrides.health_interval_secs {
        config.health_check.interval_secs = secs;
    }
    if let Some(bind) = &overrides.bind_address {
        config.listener.bind_address = bind.clone();
    }
    if overrides.no_tls {
        config.listener.tls.enabled = false;
    }
}
