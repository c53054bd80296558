//! Read-only status snapshot for dashboards.

use serde::{Deserialize, Serialize};

use crate::load_balancer::Backend;

/// One backend as seen by a reporting surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub id: u64,
    pub url: String,
    pub healthy: bool,
    pub active_connections: usize,
    pub capacity: usize,
    /// `active_connections / capacity * 100`.
    pub load_percent: f64,
}

impl BackendStatus {
    pub fn from_backend(backend: &Backend) -> Self {
        let active_connections = backend.active_connections();
        Self {
            id: backend.id,
            url: backend.base_url.to_string(),
            healthy: backend.is_healthy(),
            active_connections,
            capacity: backend.capacity,
            load_percent: active_connections as f64 / backend.capacity as f64 * 100.0,
        }
    }
}

/// Totals plus every backend, in registry order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub total_active_connections: usize,
    pub total_requests: u64,
    pub backends: Vec<BackendStatus>,
}
