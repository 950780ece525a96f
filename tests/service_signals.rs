// Signals are process-wide, so this file holds a single test.
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use simexec::service::{ServiceRunner, StopReason};

use crate::common::{RecordingService, ServiceConfigBuilder, init_tracing, within};

fn send_to_self_after(signal: Signal, delay: Duration) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        kill(Pid::this(), signal).unwrap();
    })
}

fn looping_runner() -> (ServiceRunner<RecordingService>, std::sync::Arc<common::HookCounts>) {
    let service = RecordingService::new().fail_on_shutdown();
    let counts = service.counts();
    let cfg = ServiceConfigBuilder::new()
        .as_service(true)
        .loop_delay(0.05)
        .health_check_frequency(0.1)
        .build();
    (ServiceRunner::new(service, cfg), counts)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signals_stop_a_running_service_even_when_on_shutdown_fails() {
    init_tracing();

    for (signal, name) in [(Signal::SIGTERM, "SIGTERM"), (Signal::SIGINT, "SIGINT")] {
        let (mut runner, counts) = looping_runner();

        let sender = send_to_self_after(signal, Duration::from_millis(200));
        let started = Instant::now();
        within(Duration::from_secs(2), runner.execute()).await;
        sender.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2), "{name}");
        assert_eq!(runner.stop_reason(), Some(StopReason::ShutdownRequested), "{name}");
        assert_eq!(counts.shutdowns(), 1, "{name}");
        assert!(counts.iterations() >= 1, "{name}");
        assert!(!runner.is_healthcheck_running(), "{name}");
    }

    // Handlers are in place from construction: a signal that arrives before
    // execute() still stops the loop once it starts.
    let (mut runner, counts) = looping_runner();
    kill(Pid::this(), Signal::SIGTERM).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    within(Duration::from_secs(2), runner.execute()).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(runner.stop_reason(), Some(StopReason::ShutdownRequested));
    assert!(counts.iterations() <= 1);
    assert_eq!(counts.shutdowns(), 1);
}
