//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to a plain or TLS listener
//! - Dispatch each request to the least-loaded backend
//! - Forward requests to the selected backend
//! - Run the active health monitor alongside the listener

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig};
use crate::health::HealthMonitor;
use crate::http::forward;
use crate::http::request::{request_id, UuidRequestId};
use crate::load_balancer::{BackendRegistry, DispatchError, Dispatcher, ProcessCounters};
use crate::observability::metrics;

/// How long in-flight requests get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the dispatch proxy.
pub struct ProxyServer {
    router: Router,
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
}

impl ProxyServer {
    /// Build the registry, counters and dispatcher from configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let registry = Arc::new(BackendRegistry::from_config(&config.servers)?);
        let counters = Arc::new(ProcessCounters::new());
        let dispatcher = Arc::new(Dispatcher::new(registry, counters, &config.dispatch));
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Build a server around an existing dispatcher.
    pub fn with_dispatcher(config: ProxyConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());

        let state = AppState {
            dispatcher: dispatcher.clone(),
            client,
        };

        let router = Self::build_router(state);
        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Run over plain HTTP on the given listener until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_health_monitor(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run over HTTPS on `addr` until shutdown.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_health_monitor(shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_health_monitor(&self, shutdown: broadcast::Receiver<()>) {
        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.dispatcher.registry().clone(),
                self.config.health_check.clone(),
            );
            tokio::spawn(async move {
                monitor.run(shutdown).await;
            });
        }
    }

    /// Shared dispatcher, for status reporting.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The router, for driving the proxy without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::NoBackendAvailable => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
            }
        }
    }
}

/// Main proxy handler.
/// Selects a backend and forwards the request to it.
async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let guard = match state.dispatcher.dispatch() {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %request.uri().path(), "No available servers");
            metrics::record_rejected();
            return e.into_response();
        }
    };

    let backend_id = guard.id;
    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        backend = backend_id,
        active = guard.active_connections(),
        "Proxying request"
    );

    let upstream = match forward::upstream_request(request, &guard.base_url, peer) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            metrics::record_request(500, backend_id, start_time);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream request").into_response();
        }
    };

    match state.client.request(upstream).await {
        Ok(response) => {
            metrics::record_request(response.status().as_u16(), backend_id, start_time);
            forward::into_client_response(response, guard)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, backend = backend_id, error = %e, "Upstream error");
            metrics::record_request(502, backend_id, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
