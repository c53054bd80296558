//! Backend registry.
//!
//! # Responsibilities
//! - Own the ordered, fixed set of backends for the process lifetime
//! - Provide read access for selection, health checking and reporting

use std::sync::Arc;

use crate::config::{BackendConfig, ConfigError};
use crate::config::validation::validate_servers;
use crate::load_balancer::backend::Backend;

/// The fixed, ordered collection of backends.
///
/// There is no way to add or remove a backend after construction.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Build the registry from configuration, preserving order.
    ///
    /// Fails if the list is empty, any capacity is not positive, any address
    /// does not parse, or an id repeats.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, ConfigError> {
        validate_servers(configs).map_err(ConfigError::Validation)?;

        let backends = configs
            .iter()
            .map(|config| Backend::from_config(config).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Validation(vec![e]))?;

        for backend in &backends {
            tracing::info!(
                id = backend.id,
                url = %backend.base_url,
                capacity = backend.capacity,
                healthy = backend.is_healthy(),
                "Backend registered"
            );
        }

        Ok(Self { backends })
    }

    /// All backends in registry order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Look a backend up by id.
    pub fn get(&self, id: u64) -> Option<&Arc<Backend>> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
