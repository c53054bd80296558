//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Track active connections against the declared capacity
//! - Track liveness as written by the health monitor

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use url::Url;

use crate::config::BackendConfig;
use crate::config::validation::{parse_backend_url, ValidationError};

/// A single backend server.
///
/// Identity and capacity are fixed at construction. The two mutable fields are
/// independent single-word atomics; nothing ever updates them together.
#[derive(Debug)]
pub struct Backend {
    /// Stable identifier from configuration.
    pub id: u64,
    /// Base URL requests are forwarded to.
    pub base_url: Url,
    /// Maximum concurrent in-flight requests.
    pub capacity: usize,

    active_connections: AtomicUsize,
    healthy: AtomicBool,
}

impl Backend {
    /// Create a new backend. `capacity` must be non-zero.
    pub fn new(id: u64, base_url: Url, capacity: usize, healthy: bool) -> Self {
        debug_assert!(capacity > 0, "backend capacity must be positive");
        Self {
            id,
            base_url,
            capacity,
            active_connections: AtomicUsize::new(0),
            healthy: AtomicBool::new(healthy),
        }
    }

    /// Build a backend from its configuration entry.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ValidationError> {
        let capacity = usize::try_from(config.capacity)
            .ok()
            .filter(|c| *c > 0)
            .ok_or(ValidationError::NonPositiveCapacity {
                id: config.id,
                capacity: config.capacity,
            })?;
        let base_url = parse_backend_url(&config.url).map_err(|reason| ValidationError::InvalidAddress {
            id: config.id,
            url: config.url.clone(),
            reason,
        })?;
        Ok(Self::new(config.id, base_url, capacity, config.active))
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Increment active connection count.
    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count. Saturates at zero.
    pub fn dec_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Take a connection slot only if one is free.
    pub fn try_reserve(&self) -> bool {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.capacity {
                return false;
            }
            match self.active_connections.compare_exchange_weak(
                prev, prev + 1, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => return true,
                Err(x) => prev = x,
            }
        }
    }

    /// Normalized load: active connections divided by capacity.
    pub fn load(&self) -> f64 {
        self.active_connections() as f64 / self.capacity as f64
    }

    /// Current liveness flag.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Store a new liveness flag, returning the previous one.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::Relaxed)
    }
}
