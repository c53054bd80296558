//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::schema::{BackendConfig, ProxyConfig};
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// On-disk format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension. Anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Servers file wrapper: `{"Servers": [...]}`.
#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(alias = "Servers")]
    servers: Vec<BackendConfig>,
}

/// Parse a proxy configuration from a string.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<ProxyConfig, ConfigError> {
    let config = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    Ok(config)
}

/// Parse a servers list (`{"Servers": [...]}`) from a JSON string.
pub fn parse_servers(content: &str) -> Result<Vec<BackendConfig>, ConfigError> {
    let list: ServerList = serde_json::from_str(content)?;
    Ok(list.servers)
}

/// Load a proxy configuration file. Validation happens once all overrides are applied.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = read(path)?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Load the servers file.
pub fn load_servers(path: &Path) -> Result<Vec<BackendConfig>, ConfigError> {
    let content = read(path)?;
    parse_servers(&content)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
