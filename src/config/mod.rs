//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML or JSON) + servers file (JSON) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → BackendRegistry built once, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend set never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_servers, ConfigError};
pub use schema::{
    AdminConfig, BackendConfig, DispatchConfig, HealthCheckConfig, ListenerConfig,
    ObservabilityConfig, ProxyConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
