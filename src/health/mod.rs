//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → one probe task per backend, all concurrent
//!     → join every probe
//!     → state.rs applies each outcome
//!     → wait for next tick
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     Driven by the latest probe only
//! ```
//!
//! # Design Decisions
//! - Every probe is timeout-bounded; a slow backend delays only itself
//! - A failing or panicking probe never stops the others in its cycle
//! - No hysteresis: one failure marks down, one success marks up
//! - Health state is per-backend

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{ProbeOutcome, Transition};
