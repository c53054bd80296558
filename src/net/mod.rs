//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (rustls handshake via axum-server)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is on by default and can be disabled for local testing
//! - Certificate material is read once at startup; missing files are fatal

pub mod tls;
