//! Work state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a work record.
///
/// State transitions:
/// - Enqueued -> Running -> Succeeded (one-shot success)
/// - Enqueued -> Running -> Enqueued (retry, or any periodic completion)
/// - Enqueued -> Running -> Failed (one-shot failure, cascades to dependents)
/// - Blocked -> Enqueued (all prerequisites succeeded)
/// - Blocked -> Failed (a prerequisite failed)
/// - any non-finished -> Cancelled (external cancel API)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkState {
    /// Eligible to be claimed.
    Enqueued,

    /// Claimed by exactly one runner.
    Running,

    Succeeded,

    Failed,

    /// Waiting for prerequisites.
    Blocked,

    Cancelled,
}

impl WorkState {
    /// Is this a finished state (no further transitions)?
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled
        )
    }

    /// Is this record eligible for a claim?
    pub fn is_runnable(self) -> bool {
        matches!(self, WorkState::Enqueued)
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkState::Enqueued => "ENQUEUED",
            WorkState::Running => "RUNNING",
            WorkState::Succeeded => "SUCCEEDED",
            WorkState::Failed => "FAILED",
            WorkState::Blocked => "BLOCKED",
            WorkState::Cancelled => "CANCELLED",
        };
        f.pad(s)
    }
}
