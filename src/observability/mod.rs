//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Dispatcher produces:
//!     → status.rs (JSON snapshot of counters and backends)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Status API / proxy-cli dashboard
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows from the listener to the backend
//! - Metrics are cheap (no-ops until a recorder is installed)
//! - Reporting only reads state; it never influences selection

pub mod logging;
pub mod metrics;
pub mod status;
