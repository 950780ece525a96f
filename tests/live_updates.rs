mod common;

use std::future::pending;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use simexec::errors::SimexecError;
use simexec::exec::{ExecutionHandler, ExecutionStatus, UpdateOptions, stream_updates};

use crate::common::{FakeHandler, init_tracing, with_timeout};

fn options(duration: Duration, confirm_indefinite: bool) -> UpdateOptions {
    UpdateOptions {
        duration,
        confirm_indefinite,
        poll_interval: Duration::from_millis(10),
    }
}

fn append(path: &Path, line: &str) {
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    writeln!(file, "{line}").unwrap();
}

#[tokio::test]
async fn finished_handlers_point_at_the_output_without_opening_it() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // The file does not exist: opening it would fail the call.
    let missing = dir.path().join("never-created.out");

    for status in [ExecutionStatus::Completed, ExecutionStatus::Failed] {
        let (mut handler, _control) = FakeHandler::new(status, &missing);
        let mut out = Vec::new();
        let mut input: &[u8] = b"";

        stream_updates(&mut handler, options(Duration::from_secs(1), true), &mut out, &mut input, pending())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("currently not running ({status})")), "{text}");
        assert!(text.contains("never-created.out for job output"), "{text}");
    }
}

#[tokio::test]
async fn cancelled_handlers_mention_output_only_if_it_exists() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("exists.out");
    std::fs::write(&existing, "partial\n").unwrap();
    let missing = dir.path().join("missing.out");

    let (mut with_file, _c1) = FakeHandler::new(ExecutionStatus::Cancelled, &existing);
    let mut out = Vec::new();
    stream_updates(&mut with_file, options(Duration::from_secs(1), true), &mut out, &mut &b""[..], pending())
        .await
        .unwrap();
    assert!(String::from_utf8(out).unwrap().contains("for job output"));

    let (mut without_file, _c2) = FakeHandler::new(ExecutionStatus::Cancelled, &missing);
    let mut out = Vec::new();
    stream_updates(&mut without_file, options(Duration::from_secs(1), true), &mut out, &mut &b""[..], pending())
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("not running (cancelled)"));
    assert!(!text.contains("for job output"));
}

#[tokio::test]
async fn pending_handlers_get_only_the_notice() {
    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Pending, "/nonexistent/out");
    let mut out = Vec::new();

    stream_updates(&mut handler, options(Duration::ZERO, true), &mut out, &mut &b"y\n"[..], pending())
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "This job is currently not running (pending). Live updates cannot be provided.\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_handlers_stream_only_new_lines() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.out");
    std::fs::write(&path, "old line\n").unwrap();

    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Running, &path);

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&writer_path, "step 1");
        append(&writer_path, "step 2");
    });

    let mut out = Vec::new();
    with_timeout(stream_updates(
        &mut handler,
        options(Duration::from_millis(600), true),
        &mut out,
        &mut &b""[..],
        pending(),
    ))
    .await
    .unwrap();
    writer.await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "step 1\nstep 2\n");
}

#[tokio::test]
async fn declining_indefinite_updates_returns_without_opening() {
    let dir = tempfile::tempdir().unwrap();
    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Running, dir.path().join("absent.out"));
    let mut out = Vec::new();

    stream_updates(&mut handler, options(Duration::ZERO, true), &mut out, &mut &b"n\n"[..], pending())
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Do you want to continue? (y/n)"), "{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn indefinite_updates_stop_when_work_leaves_running() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("indef.out");
    std::fs::write(&path, "").unwrap();

    let (mut handler, control) = FakeHandler::new(ExecutionStatus::Running, &path);

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&writer_path, "last words");
        tokio::time::sleep(Duration::from_millis(100)).await;
        control.set(ExecutionStatus::Completed);
    });

    let mut out = Vec::new();
    with_timeout(stream_updates(
        &mut handler,
        options(Duration::ZERO, true),
        &mut out,
        &mut &b"Yes\n"[..],
        pending(),
    ))
    .await
    .unwrap();
    writer.await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("last words\n"), "{text}");
}

#[tokio::test]
async fn missing_output_file_while_running_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.out");
    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Running, &path);
    let mut out = Vec::new();

    let err = stream_updates(&mut handler, options(Duration::from_millis(100), true), &mut out, &mut &b""[..], pending())
        .await
        .unwrap_err();

    match err {
        SimexecError::OutputFile { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected OutputFile error, got {other:?}"),
    }
}

#[tokio::test]
async fn interrupt_stops_streaming_with_a_notice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.out");
    std::fs::write(&path, "").unwrap();
    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Running, &path);
    let mut out = Vec::new();

    with_timeout(stream_updates(
        &mut handler,
        options(Duration::ZERO, false),
        &mut out,
        &mut &b""[..],
        tokio::time::sleep(Duration::from_millis(100)),
    ))
    .await
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "\nLive status updates stopped by user.\n");
}

#[tokio::test]
async fn updates_on_a_finished_handler_returns_immediately() {
    let (mut handler, _control) = FakeHandler::new(ExecutionStatus::Completed, "/nonexistent/out");
    with_timeout(handler.updates(Duration::ZERO, true)).await.unwrap();
}
