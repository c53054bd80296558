//! Health monitor tests against live mock backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dispatch_proxy::config::{DispatchConfig, HealthCheckConfig};
use dispatch_proxy::health::{HealthMonitor, ProbeOutcome};
use dispatch_proxy::lifecycle::Shutdown;
use dispatch_proxy::load_balancer::{BackendRegistry, Dispatcher, ProcessCounters};

mod common;

use common::{backend, start_mock_backend, start_programmable_backend};

fn monitor(registry: &Arc<BackendRegistry>, timeout_ms: u64) -> HealthMonitor {
    HealthMonitor::new(registry.clone(), HealthCheckConfig {
        timeout_ms,
        ..HealthCheckConfig::default()
    })
}

#[tokio::test]
async fn liveness_follows_latest_probe() {
    let up = Arc::new(AtomicBool::new(false));
    let flag = up.clone();
    let addr = start_programmable_backend(move |_| {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) { (200, "ok".into()) } else { (500, "down".into()) }
        }
    })
    .await;
    let registry = Arc::new(BackendRegistry::from_config(&[backend(1, 2, true, addr)]).unwrap());
    let monitor = monitor(&registry, 1_000);

    let outcomes = monitor.check_all().await;
    assert!(matches!(outcomes[0].1, ProbeOutcome::BadStatus(s) if s.as_u16() == 500));
    assert!(!registry.backends()[0].is_healthy());

    up.store(true, Ordering::SeqCst);
    let outcomes = monitor.check_all().await;
    assert_eq!(outcomes[0], (1, ProbeOutcome::Healthy));
    assert!(registry.backends()[0].is_healthy());
}

#[tokio::test]
async fn timed_out_backend_is_skipped_by_selection() {
    let slow = start_programmable_backend(|_| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, "slow".into())
    })
    .await;
    let fast = start_mock_backend("fast").await;

    let registry = Arc::new(
        BackendRegistry::from_config(&[backend(1, 5, true, slow), backend(2, 3, true, fast)]).unwrap(),
    );
    let dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::new(ProcessCounters::new()),
        &DispatchConfig::default(),
    );

    // Before any probe the slow backend wins the tie.
    assert_eq!(dispatcher.dispatch().unwrap().id, 1);

    let outcomes = monitor(&registry, 200).check_all().await;
    assert_eq!(outcomes[0], (1, ProbeOutcome::TimedOut));
    assert_eq!(outcomes[1], (2, ProbeOutcome::Healthy));

    for _ in 0..3 {
        assert_eq!(dispatcher.dispatch().unwrap().id, 2);
    }
}

#[tokio::test]
async fn probes_run_concurrently() {
    let slow = |_path: String| async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        (200, "ok".to_string())
    };
    let mut configs = Vec::new();
    for id in 1..=4 {
        configs.push(backend(id, 1, false, start_programmable_backend(slow).await));
    }
    let registry = Arc::new(BackendRegistry::from_config(&configs).unwrap());

    let start = Instant::now();
    let outcomes = monitor(&registry, 2_000).check_all().await;
    let elapsed = start.elapsed();

    assert!(outcomes.iter().all(|(_, o)| o.is_healthy()));
    assert!(registry.backends().iter().all(|b| b.is_healthy()));
    assert!(elapsed < Duration::from_millis(1_200), "probes ran sequentially: {:?}", elapsed);
}

#[tokio::test]
async fn one_dead_backend_does_not_stop_others() {
    let alive = start_mock_backend("ok").await;
    let dead = common::unused_addr();
    let registry = Arc::new(
        BackendRegistry::from_config(&[
            backend(1, 1, true, dead),
            backend(2, 1, false, alive),
        ])
        .unwrap(),
    );

    let outcomes = monitor(&registry, 1_000).check_all().await;
    assert!(matches!(outcomes[0].1, ProbeOutcome::Failed(_)));
    assert_eq!(outcomes[1].1, ProbeOutcome::Healthy);
    assert!(!registry.backends()[0].is_healthy());
    assert!(registry.backends()[1].is_healthy());
}

#[tokio::test]
async fn refused_backend_marked_down_before_slow_peer_finishes() {
    let dead = common::unused_addr();
    let slow = start_programmable_backend(|_| async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "slow".into())
    })
    .await;
    let registry = Arc::new(
        BackendRegistry::from_config(&[backend(1, 1, true, dead), backend(2, 1, true, slow)]).unwrap(),
    );

    let monitor = monitor(&registry, 5_000);
    let cycle = tokio::spawn(async move { monitor.check_all().await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!registry.backends()[0].is_healthy(), "refused backend still selectable mid-cycle");
    assert!(registry.backends()[1].is_healthy());
    assert!(!cycle.is_finished());

    let outcomes = cycle.await.unwrap();
    assert!(matches!(outcomes[0].1, ProbeOutcome::Failed(_)));
    assert_eq!(outcomes[1], (2, ProbeOutcome::Healthy));
}

#[tokio::test]
async fn monitor_loop_probes_immediately_and_stops_on_shutdown() {
    let alive = start_mock_backend("ok").await;
    let registry = Arc::new(BackendRegistry::from_config(&[backend(1, 1, false, alive)]).unwrap());
    let shutdown = Shutdown::new();

    let task = tokio::spawn(monitor(&registry, 1_000).run(shutdown.subscribe()));

    let deadline = Instant::now() + Duration::from_secs(2);
    while !registry.backends()[0].is_healthy() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registry.backends()[0].is_healthy());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("monitor did not stop")
        .unwrap();
}
