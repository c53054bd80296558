//! Capacity-aware dispatch proxy.
//!
//! Terminates TLS, picks the healthy backend with the lowest
//! `active / capacity` for each request and forwards it there.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────┐
//!                        │                DISPATCH PROXY                 │
//!   Client Request       │  ┌─────────┐   ┌───────────┐   ┌───────────┐  │
//!   ─────────────────────┼─▶│   net   │──▶│   http    │──▶│dispatcher │  │
//!                        │  │  (TLS)  │   │  server   │   │+least_load│  │
//!                        │  └─────────┘   └───────────┘   └─────┬─────┘  │
//!                        │                                      │        │
//!   Client Response      │                ┌───────────┐   ┌─────▼─────┐  │
//!   ◀────────────────────┼────────────────│  forward  │◀──│ registry  │  │
//!                        │                └─────▲─────┘   └─────▲─────┘  │
//!                        │                      │               │        │
//!                        │                      │         ┌─────┴─────┐  │
//!                        │                      │         │  health   │──┼──▶ Backends
//!                        │                      │         │  monitor  │  │    /health
//!                        │                      │         └───────────┘  │
//!                        └──────────────────────┼────────────────────────┘
//!                                               └──────────────────────────▶ Backend
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dispatch_proxy::admin::{self, AdminState};
use dispatch_proxy::http::ProxyServer;
use dispatch_proxy::lifecycle::signals::wait_for_signal;
use dispatch_proxy::lifecycle::startup::{prepare_config, Overrides};
use dispatch_proxy::lifecycle::Shutdown;
use dispatch_proxy::net::tls::load_tls_config;
use dispatch_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "dispatch-proxy")]
#[command(about = "Reverse proxy that dispatches to the least-loaded healthy backend", long_about = None)]
struct Cli {
    /// Proxy configuration file (TOML, or JSON by extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Servers file: {"Servers": [{"Id", "MaximumActiveConnections", "Status", "URL"}]}.
    #[arg(short, long)]
    servers: Option<PathBuf>,

    /// Seconds between health check cycles.
    #[arg(long = "health-interval", alias = "health-timeout")]
    health_interval: Option<u64>,

    /// Listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Serve plain HTTP instead of HTTPS.
    #[arg(long)]
    no_tls: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = Overrides {
        config_path: cli.config,
        servers_path: cli.servers,
        health_interval_secs: cli.health_interval,
        bind_address: cli.bind,
        no_tls: cli.no_tls,
    };

    // Logging first with the default level so config errors are visible.
    let config = match prepare_config(&overrides) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    logging::init(&config.observability.log_level);

    tracing::info!("dispatch-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.enabled,
        backends = config.servers.len(),
        health_interval_secs = config.health_check.interval_secs,
        strict_capacity = config.dispatch.strict_capacity,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let server = ProxyServer::new(config.clone())?;

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            dispatcher: server.dispatcher().clone(),
            api_key: config.admin.api_key.clone(),
        };
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Status API failed");
            }
        });
    }

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server_shutdown = shutdown.subscribe();
    if config.listener.tls.enabled {
        let tls = load_tls_config(
            Path::new(&config.listener.tls.cert_path),
            Path::new(&config.listener.tls.key_path),
        )
        .await?;
        let addr: SocketAddr = config.listener.bind_address.parse()?;
        server.run_tls(addr, tls, server_shutdown).await?;
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        server.run(listener, server_shutdown).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
