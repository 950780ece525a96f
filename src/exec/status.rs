// src/exec/status.rs

use std::fmt;
use std::str::FromStr;

/// Observed state of a unit of submitted work.
///
/// This is a best-effort projection of whatever the underlying process or
/// scheduler reports, re-derived on every observation. No transition table is
/// enforced: a handler may report any value after any other if the system it
/// watches does so. The usual progression is
/// `Unsubmitted -> {Pending, Held, Running} -> Running -> {Completed, Failed, Cancelled}`,
/// with `Unknown` as the fallback for indeterminate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    /// Not yet started or submitted.
    Unsubmitted,
    /// Submitted to a scheduler and waiting to start.
    Pending,
    /// Submitted to a scheduler and on hold pending release.
    Held,
    Running,
    /// In the process of ending but not fully finished.
    Ending,
    Completed,
    Cancelled,
    Failed,
    Unknown,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 9] = [
        ExecutionStatus::Unsubmitted,
        ExecutionStatus::Pending,
        ExecutionStatus::Held,
        ExecutionStatus::Running,
        ExecutionStatus::Ending,
        ExecutionStatus::Completed,
        ExecutionStatus::Cancelled,
        ExecutionStatus::Failed,
        ExecutionStatus::Unknown,
    ];

    /// `Completed`, `Failed` or `Cancelled`: no further progress will happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Unsubmitted => "unsubmitted",
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Held => "held",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Ending => "ending",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("invalid execution status: {wanted}"))
    }
}
