//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject an empty backend list, non-positive capacities and bad addresses
//! - Validate value ranges (interval and timeout > 0, bind address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BackendConfig, ProxyConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no backend servers configured")]
    NoBackends,

    #[error("backend {id}: capacity must be greater than zero (got {capacity})")]
    NonPositiveCapacity { id: u64, capacity: i64 },

    #[error("backend {id}: invalid address '{url}': {reason}")]
    InvalidAddress { id: u64, url: String, reason: String },

    #[error("duplicate backend id {0}")]
    DuplicateId(u64),

    #[error("health check interval must be greater than zero")]
    ZeroInterval,

    #[error("health check timeout must be greater than zero")]
    ZeroTimeout,

    #[error("health check path must start with '/' (got '{0}')")]
    InvalidHealthPath(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Validate the whole configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_servers(&config.servers) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.admin.bind_address.clone()));
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::ZeroInterval);
    }
    if health.timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if !health.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(health.path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the backend list on its own.
pub fn validate_servers(servers: &[BackendConfig]) -> Result<(), Vec<ValidationError>> {
    if servers.is_empty() {
        return Err(vec![ValidationError::NoBackends]);
    }

    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for server in servers {
        if !seen.insert(server.id) {
            errors.push(ValidationError::DuplicateId(server.id));
        }
        if server.capacity <= 0 {
            errors.push(ValidationError::NonPositiveCapacity {
                id: server.id,
                capacity: server.capacity,
            });
        }
        if let Err(reason) = parse_backend_url(&server.url) {
            errors.push(ValidationError::InvalidAddress {
                id: server.id,
                url: server.url.clone(),
                reason,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a backend base URL. Only plain `http` upstreams with a host are accepted.
pub fn parse_backend_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}
