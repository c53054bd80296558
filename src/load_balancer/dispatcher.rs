//! Dispatch coordination and connection accounting.
//!
//! # Responsibilities
//! - Count every inbound request
//! - Select a backend via the configured strategy
//! - Account the in-flight request on the backend and globally
//! - Release both counts exactly once, whatever happens to the request
//!
//! # Design Decisions
//! - Accounting is tied to a guard's lifetime (`Drop`), so errors, client
//!   disconnects (future dropped) and panics all release the slot
//! - Default mode increments after selection; two concurrent requests can
//!   both take a backend's last slot, which corrects itself on completion
//! - Strict mode reserves the slot with compare-and-swap and reselects on
//!   contention instead

use std::ops::Deref;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::load_balancer::{
    DispatchError, LoadBalancer,
    backend::Backend,
    counters::ProcessCounters,
    least_load::LeastLoad,
    registry::BackendRegistry,
};
use crate::observability::metrics;
use crate::observability::status::{BackendStatus, StatusSnapshot};

/// Per-request entry point into the dispatch engine.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    counters: Arc<ProcessCounters>,
    balancer: Box<dyn LoadBalancer>,
    strict_capacity: bool,
}

impl Dispatcher {
    /// Create a dispatcher using least-load selection.
    pub fn new(
        registry: Arc<BackendRegistry>,
        counters: Arc<ProcessCounters>,
        config: &DispatchConfig,
    ) -> Self {
        Self::with_balancer(registry, counters, config, Box::new(LeastLoad::new()))
    }

    /// Create a dispatcher with an explicit selection strategy.
    pub fn with_balancer(
        registry: Arc<BackendRegistry>,
        counters: Arc<ProcessCounters>,
        config: &DispatchConfig,
        balancer: Box<dyn LoadBalancer>,
    ) -> Self {
        tracing::debug!(
            strategy = balancer.name(),
            strict_capacity = config.strict_capacity,
            backends = registry.len(),
            "Dispatcher created"
        );
        Self {
            registry,
            counters,
            balancer,
            strict_capacity: config.strict_capacity,
        }
    }

    /// Select a backend for one request.
    ///
    /// The returned guard holds the request's slot on the backend and in the
    /// global active count until it is dropped.
    pub fn dispatch(&self) -> Result<DispatchGuard, DispatchError> {
        self.counters.record_request();

        let backend = if self.strict_capacity {
            self.select_reserved()
        } else {
            self.balancer.next_server(self.registry.backends()).map(|backend| {
                backend.inc_connections();
                backend
            })
        };

        match backend {
            Some(backend) => Ok(DispatchGuard::new(backend, self.counters.clone())),
            None => {
                tracing::debug!(backend_count = self.registry.len(), "No healthy backend with free capacity");
                for b in self.registry.backends() {
                    tracing::trace!(
                        id = b.id,
                        healthy = b.is_healthy(),
                        active = b.active_connections(),
                        capacity = b.capacity,
                        "Backend status"
                    );
                }
                Err(DispatchError::NoBackendAvailable)
            }
        }
    }

    /// Select and reserve with compare-and-swap, reselecting at most once per backend.
    fn select_reserved(&self) -> Option<Arc<Backend>> {
        for _ in 0..self.registry.len() {
            let backend = self.balancer.next_server(self.registry.backends())?;
            if backend.try_reserve() {
                return Some(backend);
            }
            tracing::trace!(id = backend.id, "Lost capacity race, reselecting");
        }
        None
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn counters(&self) -> &Arc<ProcessCounters> {
        &self.counters
    }

    /// Read-only view of totals and per-backend state for reporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        let totals = self.counters.snapshot();
        StatusSnapshot {
            total_active_connections: totals.total_active_connections,
            total_requests: totals.total_requests,
            backends: self
                .registry
                .backends()
                .iter()
                .map(|b| BackendStatus::from_backend(b))
                .collect(),
        }
    }
}

/// A RAII guard for one dispatched request.
///
/// Created with the backend's and the global active counts already
/// incremented; decrements both when dropped.
#[derive(Debug)]
pub struct DispatchGuard {
    backend: Arc<Backend>,
    counters: Arc<ProcessCounters>,
}

impl DispatchGuard {
    fn new(backend: Arc<Backend>, counters: Arc<ProcessCounters>) -> Self {
        counters.inc_active();
        metrics::record_active_connections(
            backend.id,
            backend.active_connections(),
            counters.total_active_connections(),
        );
        Self { backend, counters }
    }
}

impl Deref for DispatchGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
        self.counters.dec_active();
        metrics::record_active_connections(
            self.backend.id,
            self.backend.active_connections(),
            self.counters.total_active_connections(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn registry(specs: &[(u64, i64, bool)]) -> Arc<BackendRegistry> {
        let configs: Vec<BackendConfig> = specs
            .iter()
            .map(|&(id, capacity, active)| BackendConfig {
                id,
                capacity,
                active,
                url: format!("http://127.0.0.1:{}", 9000 + id),
            })
            .collect();
        Arc::new(BackendRegistry::from_config(&configs).unwrap())
    }

    fn dispatcher(specs: &[(u64, i64, bool)], strict: bool) -> Dispatcher {
        Dispatcher::new(
            registry(specs),
            Arc::new(ProcessCounters::new()),
            &DispatchConfig { strict_capacity: strict },
        )
    }

    #[test]
    fn first_request_picks_lowest_index_on_tie() {
        let d = dispatcher(&[(1, 5, true), (2, 3, true)], false);
        let guard = d.dispatch().unwrap();
        assert_eq!(guard.id, 1);
    }

    #[test]
    fn guard_accounts_symmetrically() {
        let d = dispatcher(&[(1, 5, true), (2, 3, true)], false);
        {
            let guard = d.dispatch().unwrap();
            assert_eq!(guard.active_connections(), 1);
            assert_eq!(d.counters().total_active_connections(), 1);
            assert_eq!(d.counters().total_requests(), 1);
        }
        assert_eq!(d.registry().get(1).unwrap().active_connections(), 0);
        assert_eq!(d.counters().total_active_connections(), 0);
        assert_eq!(d.counters().total_requests(), 1);
    }

    #[test]
    fn spreads_by_normalized_load() {
        let d = dispatcher(&[(1, 2, true), (2, 4, true)], false);
        let g1 = d.dispatch().unwrap(); // 0/2 vs 0/4 → 1
        let g2 = d.dispatch().unwrap(); // 1/2 vs 0/4 → 2
        let g3 = d.dispatch().unwrap(); // 0.5 vs 0.25 → 2
        let g4 = d.dispatch().unwrap(); // 0.5 vs 0.5 → 1
        assert_eq!([g1.id, g2.id, g3.id, g4.id], [1, 2, 2, 1]);
        let g5 = d.dispatch().unwrap(); // full vs 0.5 → 2
        assert_eq!(g5.id, 2);
    }

    #[test]
    fn exhaustion_leaves_active_counts_unchanged() {
        let d = dispatcher(&[(1, 5, false), (2, 3, false)], false);
        assert!(matches!(d.dispatch(), Err(DispatchError::NoBackendAvailable)));
        assert_eq!(d.counters().total_active_connections(), 0);
        assert_eq!(d.counters().total_requests(), 1);
        for b in d.registry().backends() {
            assert_eq!(b.active_connections(), 0);
        }
    }

    #[test]
    fn full_capacity_rejects_until_release() {
        let d = dispatcher(&[(1, 1, true)], false);
        let guard = d.dispatch().unwrap();
        assert!(d.dispatch().is_err());
        drop(guard);
        assert!(d.dispatch().is_ok());
    }

    #[test]
    fn guard_released_on_panic() {
        let d = Arc::new(dispatcher(&[(1, 2, true)], false));
        let d2 = d.clone();
        let result = std::thread::spawn(move || {
            let _guard = d2.dispatch().unwrap();
            panic!("forwarder blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(d.registry().get(1).unwrap().active_connections(), 0);
        assert_eq!(d.counters().total_active_connections(), 0);
    }

    #[test]
    fn strict_mode_respects_capacity() {
        let d = dispatcher(&[(1, 1, true), (2, 1, true)], true);
        let g1 = d.dispatch().unwrap();
        let g2 = d.dispatch().unwrap();
        assert_ne!(g1.id, g2.id);
        assert!(d.dispatch().is_err());
        assert_eq!(d.counters().total_active_connections(), 2);
    }

    #[test]
    fn strict_mode_never_exceeds_capacity_under_contention() {
        let d = Arc::new(dispatcher(&[(1, 3, true), (2, 2, true)], true));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let d = d.clone();
                std::thread::spawn(move || d.dispatch().ok())
            })
            .collect();
        let guards: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();

        assert_eq!(guards.len(), 5);
        for b in d.registry().backends() {
            assert!(b.active_connections() <= b.capacity);
        }
        drop(guards);
        assert_eq!(d.counters().total_active_connections(), 0);
    }

    #[test]
    fn snapshot_reports_backends_in_order() {
        let d = dispatcher(&[(4, 4, true), (2, 2, false)], false);
        let _guard = d.dispatch().unwrap();
        let snapshot = d.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.total_active_connections, 1);
        assert_eq!(snapshot.backends[0].id, 4);
        assert_eq!(snapshot.backends[0].active_connections, 1);
        assert_eq!(snapshot.backends[0].load_percent, 25.0);
        assert!(!snapshot.backends[1].healthy);
    }
}
