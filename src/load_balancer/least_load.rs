//! Least-load selection strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Least normalized load selector.
///
/// Picks the healthy backend with the smallest `active / capacity`, skipping
/// anything at or over capacity. Ties keep the earliest backend in registry
/// order. Each backend's atomics are read independently, so the view across
/// backends is not a single point in time.
#[derive(Debug, Default)]
pub struct LeastLoad;

impl LeastLoad {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastLoad {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let mut best: Option<(&Arc<Backend>, f64)> = None;

        for backend in backends {
            if !backend.is_healthy() {
                continue;
            }
            let load = backend.load();
            if load >= 1.0 {
                continue;
            }
            match best {
                Some((_, best_load)) if load >= best_load => {}
                _ => best = Some((backend, load)),
            }
        }

        best.map(|(backend, _)| backend.clone())
    }

    fn name(&self) -> &'static str {
        "least_load"
    }
}
