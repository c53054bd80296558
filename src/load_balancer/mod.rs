//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → dispatcher.rs (count request, ask strategy)
//!     → least_load.rs (lowest active/capacity among healthy, non-full backends)
//!     → backend.rs (increment active connections)
//!     → DispatchGuard handed to the forwarder
//!     → guard dropped → counts decremented
//! ```
//!
//! # Design Decisions
//! - Registry is fixed at startup; no registration at runtime
//! - Per-backend state is single-word atomics, no cross-backend lock
//! - Selection reads a best-effort, not point-in-time, view of the registry
//! - Unhealthy and full backends are excluded from selection

use std::sync::Arc;

use thiserror::Error;

pub mod backend;
pub mod counters;
pub mod dispatcher;
pub mod least_load;
pub mod registry;

pub use backend::Backend;
pub use counters::{CountersSnapshot, ProcessCounters};
pub use dispatcher::{DispatchGuard, Dispatcher};
pub use least_load::LeastLoad;
pub use registry::BackendRegistry;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick a backend, or `None` when nothing qualifies.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// Per-request dispatch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Every backend is unhealthy or at capacity.
    #[error("No available servers")]
    NoBackendAvailable,
}
