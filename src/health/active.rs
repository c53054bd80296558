//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend, all at once
//! - Update backend health state from the latest result

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, header};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::state::{self, ProbeOutcome};
use crate::load_balancer::{Backend, BackendRegistry};

pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendRegistry>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());

        Self {
            registry,
            config,
            client,
        }
    }

    /// Probe on every tick until shutdown. The first cycle runs immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_ms = self.config.timeout_ms,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe cycle: probe every backend concurrently and wait for all.
    /// Each outcome is applied as soon as its own probe finishes. Results are
    /// in registry order.
    pub async fn check_all(&self) -> Vec<(u64, ProbeOutcome)> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let probes = self.registry.backends().iter().map(|backend| {
            let client = self.client.clone();
            let uri = health_uri(backend, &self.config.path);
            let backend = backend.clone();
            tokio::spawn(async move {
                let outcome = probe(client, uri, timeout).await;
                state::apply(&backend, &outcome);
                outcome
            })
        });
        let results = join_all(probes).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (backend, result) in self.registry.backends().iter().zip(results) {
            let outcome = result.unwrap_or_else(|e| {
                tracing::error!(id = backend.id, error = %e, "Health probe task failed");
                let outcome = ProbeOutcome::Failed(format!("probe task failed: {}", e));
                state::apply(backend, &outcome);
                outcome
            });
            outcomes.push((backend.id, outcome));
        }

        tracing::debug!(
            healthy = outcomes.iter().filter(|(_, o)| o.is_healthy()).count(),
            total = outcomes.len(),
            "Health check cycle complete"
        );
        outcomes
    }
}

/// Health endpoint for a backend: base URL with the probe path appended.
pub fn health_uri(backend: &Backend, path: &str) -> String {
    format!("{}{}", backend.base_url.as_str().trim_end_matches('/'), path)
}

/// Issue one bounded GET and classify the result.
pub async fn probe(client: Client<HttpConnector, Body>, uri: String, timeout: Duration) -> ProbeOutcome {
    let request = match Request::builder()
        .method("GET")
        .uri(&uri)
        .header(header::USER_AGENT, "dispatch-proxy-health-check")
        .body(Body::empty()) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "Failed to build health check request");
                return ProbeOutcome::Failed(e.to_string());
            }
        };

    match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let status = response.status();
            if status.is_success() {
                ProbeOutcome::Healthy
            } else {
                tracing::warn!(uri = %uri, status = %status, "Health check failed: non-success status");
                ProbeOutcome::BadStatus(status)
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(uri = %uri, error = %e, "Health check failed: connection error");
            ProbeOutcome::Failed(e.to_string())
        }
        Err(_) => {
            tracing::warn!(uri = %uri, timeout_ms = timeout.as_millis() as u64, "Health check failed: timeout");
            ProbeOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn registry(urls: &[&str]) -> Arc<BackendRegistry> {
        let configs: Vec<BackendConfig> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| BackendConfig {
                id: i as u64 + 1,
                capacity: 1,
                active: true,
                url: url.to_string(),
            })
            .collect();
        Arc::new(BackendRegistry::from_config(&configs).unwrap())
    }

    #[test]
    fn health_uri_appends_path() {
        let r = registry(&["http://127.0.0.1:8080", "http://127.0.0.1:8081/api/"]);
        assert_eq!(health_uri(&r.backends()[0], "/health"), "http://127.0.0.1:8080/health");
        assert_eq!(health_uri(&r.backends()[1], "/health"), "http://127.0.0.1:8081/api/health");
    }

    #[tokio::test]
    async fn unreachable_backend_is_marked_down() {
        // Port 1 on localhost refuses connections.
        let r = registry(&["http://127.0.0.1:1"]);
        let monitor = HealthMonitor::new(r.clone(), HealthCheckConfig {
            timeout_ms: 500,
            ..HealthCheckConfig::default()
        });

        let outcomes = monitor.check_all().await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].1.is_healthy());
        assert!(!r.backends()[0].is_healthy());
    }

    #[tokio::test]
    async fn disabled_monitor_returns_immediately() {
        let r = registry(&["http://127.0.0.1:1"]);
        let monitor = HealthMonitor::new(r.clone(), HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        });
        let (_tx, rx) = broadcast::channel(1);
        monitor.run(rx).await;
        assert!(r.backends()[0].is_healthy());
    }
}
