use chrono::{DateTime, Utc};

use simexec::service::HealthMessage;
use simexec::service::message::{CONTROL_KEY, HEARTBEAT, QUIT, REASON_KEY, TIMESTAMP_KEY};

#[test]
fn every_message_starts_with_a_utc_timestamp() {
    let msg = HealthMessage::new([("progress", "42%")]);

    let (first_key, ts) = msg.iter().next().unwrap();
    assert_eq!(first_key, TIMESTAMP_KEY);
    let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
    assert_eq!(parsed.offset().local_minus_utc(), 0);
    assert!(parsed.with_timezone(&Utc) <= Utc::now());
    assert_eq!(msg.get("progress"), Some("42%"));
}

#[test]
fn content_keeps_insertion_order() {
    let msg = HealthMessage::new([("b", "2"), ("a", "1"), ("c", "3")]);
    let keys: Vec<&str> = msg.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![TIMESTAMP_KEY, "b", "a", "c"]);
    assert_eq!(msg.len(), 4);
}

#[test]
fn supplied_timestamp_overrides_in_place() {
    let msg = HealthMessage::new([("x", "1"), (TIMESTAMP_KEY, "2024-01-01T00:00:00Z")]);
    let entries: Vec<(&str, &str)> = msg.iter().collect();
    assert_eq!(
        entries,
        vec![(TIMESTAMP_KEY, "2024-01-01T00:00:00Z"), ("x", "1")]
    );
    assert_eq!(msg.timestamp(), "2024-01-01T00:00:00Z");
}

#[test]
fn quit_message_carries_command_and_reason() {
    let msg = HealthMessage::quit("shutting down");
    assert!(msg.is_quit());
    assert!(!msg.is_heartbeat());
    assert_eq!(msg.command(), Some(QUIT));
    assert_eq!(msg.get(CONTROL_KEY), Some("quit"));
    assert_eq!(msg.get(REASON_KEY), Some("shutting down"));
}

#[test]
fn heartbeat_is_a_control_message() {
    let msg = HealthMessage::heartbeat();
    assert!(msg.is_heartbeat());
    assert_eq!(msg.command(), Some(HEARTBEAT));
    assert!(!msg.is_quit());
}

#[test]
fn domain_messages_have_no_command() {
    let msg = HealthMessage::new([("status", "running")]);
    assert_eq!(msg.command(), None);
    assert!(msg.to_string().contains("status=\"running\""));
}
