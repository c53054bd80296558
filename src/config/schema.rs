//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Ordered backend definitions. Order is the selection tie-break.
    #[serde(alias = "Servers")]
    pub servers: Vec<BackendConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Dispatch accounting settings.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Status API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// TLS termination settings.
    pub tls: TlsConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve HTTPS. When false the listener speaks plain HTTP.
    pub enabled: bool,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_path: "creds/cert.pem".to_string(),
            key_path: "creds/key.pem".to_string(),
        }
    }
}

/// Backend server configuration.
///
/// Accepts both snake_case keys and the PascalCase keys of the
/// `{"Servers": [...]}` servers file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Stable backend identifier.
    #[serde(alias = "Id")]
    pub id: u64,

    /// Maximum concurrent in-flight requests. Must be positive.
    #[serde(alias = "MaximumActiveConnections", alias = "max_connections")]
    pub capacity: i64,

    /// Initial health state before the first probe completes.
    #[serde(alias = "Status", default = "default_active")]
    pub active: bool,

    /// Base URL of the backend (e.g., "http://127.0.0.1:3000").
    #[serde(alias = "URL")]
    pub url: String,
}

fn default_active() -> bool {
    true
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Pause between probe cycles in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 120,
            timeout_ms: 5_000,
            path: "/health".to_string(),
        }
    }
}

/// Dispatch accounting configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Reserve a capacity slot with compare-and-swap before forwarding.
    ///
    /// Off by default: selection and increment are separate steps, so two
    /// concurrent requests may both take the last slot of a backend.
    pub strict_capacity: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Status API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the status API.
    pub enabled: bool,

    /// Optional API key (Bearer token). No auth when unset.
    pub api_key: Option<String>,

    /// Status API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
