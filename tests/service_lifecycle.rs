mod common;

use std::future::pending;
use std::time::{Duration, Instant};

use simexec::service::{ServiceRunner, StopReason};

use crate::common::{
    HookCounts, RecordingService, ServiceConfigBuilder, capture_logs, init_tracing, with_timeout,
};

#[tokio::test]
async fn one_shot_runs_exactly_one_iteration() {
    init_tracing();
    let service = RecordingService::new();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(false).build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 1);
    assert_eq!(HookCounts::get(&counts.on_iteration_complete), 1);
    assert_eq!(HookCounts::get(&counts.on_start), 1);
    assert_eq!(counts.shutdowns(), 1);
    // One-shot runs never consult the service's predicate.
    assert_eq!(HookCounts::get(&counts.can_shutdown), 0);
    assert_eq!(runner.iterations(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::Completed));
}

#[tokio::test]
async fn one_shot_ignores_a_false_shutdown_predicate() {
    init_tracing();
    // Never willing to shut down on its own.
    let service = RecordingService::new();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(false).loop_delay(0.01).build();

    let mut runner = ServiceRunner::new(service, cfg);
    assert!(runner.can_shutdown());
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 1);
    assert_eq!(HookCounts::get(&counts.on_delay), 0);
}

#[tokio::test]
async fn service_stops_once_predicate_holds() {
    init_tracing();
    let n = 5;
    let service = RecordingService::new().shutdown_after(n);
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(true).build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    let iterations = counts.iterations();
    assert!(
        (n - 1..=n).contains(&iterations),
        "expected {} or {n} iterations, got {iterations}",
        n - 1
    );
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ten_delayed_iterations_finish_in_time() {
    init_tracing();
    let service = RecordingService::new().shutdown_after(10);
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.05)
        .health_check_frequency(0.0)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    let started = Instant::now();
    with_timeout(runner.execute_until(pending())).await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs_f64(10.0 * 0.05 * 1.4),
        "took {elapsed:?}"
    );
    assert_eq!(counts.iterations(), 10);
    assert_eq!(counts.shutdowns(), 1);
    // A delay (and on_delay) happens between iterations, not after the last.
    assert_eq!(HookCounts::get(&counts.on_delay), 9);
}

#[tokio::test]
async fn failing_shutdown_predicate_fails_open() {
    init_tracing();
    let service = RecordingService::new().fail_can_shutdown();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(true).build();

    let mut runner = ServiceRunner::new(service, cfg);
    assert!(runner.can_shutdown(), "an erroring predicate must read as true");

    with_timeout(runner.execute_until(pending())).await;
    assert_eq!(counts.iterations(), 1);
    assert_eq!(counts.shutdowns(), 1);
}

#[tokio::test]
async fn start_failure_skips_iterations_but_still_shuts_down() {
    init_tracing();
    let service = RecordingService::new().fail_on_start();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .health_check_frequency(0.05)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 0);
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::StartFailed));
    assert!(!runner.is_healthcheck_running());
}

#[tokio::test]
async fn iteration_error_breaks_the_loop() {
    init_tracing();
    let service = RecordingService::new().fail_iteration_at(2);
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(true).build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 3);
    assert_eq!(HookCounts::get(&counts.on_iteration_complete), 2);
    assert_eq!(runner.iterations(), 2);
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::HookFailed));
}

#[tokio::test]
async fn iteration_panic_is_contained() {
    init_tracing();
    let service = RecordingService::new().panic_iteration_at(0);
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new().as_service(true).build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(runner.iterations(), 0);
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::HookFailed));
}

#[tokio::test]
async fn delay_hook_failure_ends_the_loop() {
    init_tracing();
    let service = RecordingService::new().fail_on_delay();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.01)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(tokio::time::sleep(Duration::from_millis(300)))).await;

    assert_eq!(counts.iterations(), 1);
    assert_eq!(HookCounts::get(&counts.on_delay), 1);
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::HookFailed));
}

#[tokio::test]
async fn shutdown_hook_failures_do_not_escape() {
    init_tracing();
    for service in [
        RecordingService::new().fail_on_shutdown(),
        RecordingService::new().panic_on_shutdown(),
    ] {
        let counts = service.counts();
        let cfg = ServiceConfigBuilder::new().build();

        let mut runner = ServiceRunner::new(service, cfg);
        with_timeout(runner.execute_until(pending())).await;

        assert_eq!(counts.shutdowns(), 1);
    }
}

#[tokio::test]
async fn shutdown_runs_once_even_if_executed_again() {
    init_tracing();
    let service = RecordingService::new();
    let counts = service.counts();
    let mut runner = ServiceRunner::new(service, ServiceConfigBuilder::new().build());

    with_timeout(runner.execute_until(pending())).await;
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 1);
    assert_eq!(counts.shutdowns(), 1);
}

#[tokio::test]
async fn shutdown_request_interrupts_the_delay() {
    init_tracing();
    let service = RecordingService::new();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(30.0)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    let started = Instant::now();
    with_timeout(runner.execute_until(tokio::time::sleep(Duration::from_millis(100)))).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(counts.iterations(), 1);
    assert_eq!(counts.shutdowns(), 1);
    assert_eq!(runner.stop_reason(), Some(StopReason::ShutdownRequested));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_check_count_tracks_frequency() {
    init_tracing();
    let frequency = 0.05;
    let service = RecordingService::new();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.01)
        .health_check_frequency(frequency)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    let started = Instant::now();
    with_timeout(runner.execute_until(tokio::time::sleep(Duration::from_secs(1)))).await;
    let duration = started.elapsed().as_secs_f64();

    let checks = counts.checks() as f64;
    let expected = duration / frequency;
    assert!(
        checks >= 0.9 * expected && checks <= expected,
        "{checks} health checks over {duration:.3}s (expected within [{:.1}, {expected:.1}])",
        0.9 * expected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocked_iteration_is_reported_but_not_checked() {
    let (subscriber, logs) = capture_logs();
    let _guard = tracing::subscriber::set_default(subscriber);

    let service = RecordingService::new().iteration_sleep(Duration::from_millis(1500));
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .health_check_frequency(0.1)
        .health_check_log_threshold(3)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    assert_eq!(counts.iterations(), 1);
    assert_eq!(counts.checks(), 0);
    assert!(logs.contains("missed health check"), "logs:\n{}", logs.contents());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_worker_is_stopped_after_execute() {
    init_tracing();
    let service = RecordingService::new().shutdown_after(3);
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.01)
        .health_check_frequency(0.02)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    assert!(!runner.is_healthcheck_running());

    with_timeout(runner.execute_until(pending())).await;

    assert!(!runner.is_healthcheck_running());
    assert!(!runner.is_healthcheck_queue_ready());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_health_check_only_stops_the_worker() {
    init_tracing();
    let service = RecordingService::new().fail_health_check_after(2);
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.01)
        .health_check_frequency(0.02)
        .build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(tokio::time::sleep(Duration::from_millis(400)))).await;

    // Two successful checks, then the failing one ends the worker.
    assert_eq!(counts.checks(), 3);
    assert!(counts.iterations() > 3, "main loop kept running");
    assert_eq!(counts.shutdowns(), 1);
}

#[tokio::test]
async fn runner_gives_the_service_back() {
    init_tracing();
    let service = RecordingService::new().shutdown_after(2);
    let cfg = ServiceConfigBuilder::new().as_service(true).build();

    let mut runner = ServiceRunner::new(service, cfg);
    with_timeout(runner.execute_until(pending())).await;

    let counts = runner.service_mut().counts();
    let service = runner.into_inner();
    assert_eq!(counts.iterations(), 2);
    assert_eq!(service.counts().shutdowns(), 1);
}
