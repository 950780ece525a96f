use std::collections::HashSet;

use simexec::exec::ExecutionStatus;

#[test]
fn terminal_statuses_are_exactly_completed_failed_cancelled() {
    let terminal: HashSet<ExecutionStatus> = ExecutionStatus::ALL
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();

    let expected: HashSet<ExecutionStatus> = [
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ]
    .into_iter()
    .collect();

    assert_eq!(terminal, expected);
}

#[test]
fn display_and_parse_agree() {
    for status in ExecutionStatus::ALL {
        let text = status.to_string();
        assert_eq!(text, text.to_lowercase());
        assert_eq!(text.parse::<ExecutionStatus>().unwrap(), status);
    }
}

#[test]
fn parse_is_case_insensitive() {
    assert_eq!(
        "RUNNING".parse::<ExecutionStatus>().unwrap(),
        ExecutionStatus::Running
    );
    assert_eq!(
        " Completed ".parse::<ExecutionStatus>().unwrap(),
        ExecutionStatus::Completed
    );
}

#[test]
fn unknown_names_fail_to_parse() {
    let err = "finished".parse::<ExecutionStatus>().unwrap_err();
    assert!(err.contains("finished"));
}

#[test]
fn the_set_is_closed_at_nine_values() {
    let unique: HashSet<ExecutionStatus> = ExecutionStatus::ALL.into_iter().collect();
    assert_eq!(unique.len(), 9);
}
