//! Backend health state machine.
//!
//! # States
//! - Healthy: backend receives traffic
//! - Unhealthy: backend excluded from load balancing
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: latest probe failed
//! Unhealthy → Healthy: latest probe succeeded
//! ```

use std::fmt;

use axum::http::StatusCode;

use crate::load_balancer::Backend;
use crate::observability::metrics;

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Success status within the timeout.
    Healthy,
    /// Backend answered with a non-success status.
    BadStatus(StatusCode),
    /// Connection or protocol error.
    Failed(String),
    /// No answer within the timeout.
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Healthy => write!(f, "healthy"),
            ProbeOutcome::BadStatus(status) => write!(f, "non-success status {}", status),
            ProbeOutcome::Failed(e) => write!(f, "connection error: {}", e),
            ProbeOutcome::TimedOut => write!(f, "timeout"),
        }
    }
}

/// What applying an outcome did to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    MarkedUp,
    MarkedDown,
}

/// Store the outcome in the backend and log any state change.
pub fn apply(backend: &Backend, outcome: &ProbeOutcome) -> Transition {
    let healthy = outcome.is_healthy();
    let was_healthy = backend.set_healthy(healthy);
    metrics::record_backend_health(backend.id, healthy);

    match (was_healthy, healthy) {
        (false, true) => {
            tracing::info!(id = backend.id, url = %backend.base_url, "Backend marked healthy");
            Transition::MarkedUp
        }
        (true, false) => {
            tracing::warn!(
                id = backend.id,
                url = %backend.base_url,
                reason = %outcome,
                "Backend marked unhealthy"
            );
            Transition::MarkedDown
        }
        _ => {
            if !healthy {
                tracing::debug!(id = backend.id, reason = %outcome, "Backend still unhealthy");
            }
            Transition::Unchanged
        }
    }
}
