//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request id, tracing)
//!     → load_balancer::Dispatcher (select backend, take slot)
//!     → forward.rs (rewrite URI and headers, send upstream)
//!     → response body streamed back; slot released when it ends
//! ```

pub mod forward;
pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, ProxyServer};
