//! What a run reported, and where it stopped.

use crate::domain::{WorkResultKind, WorkState};

/// Phase that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The record did not exist (or vanished mid-run).
    Absent,

    /// The record was not claimable; nothing was changed.
    NotEnqueued(WorkState),

    /// Stopped by `interrupt`; carries the state observed afterwards.
    Interrupted(WorkState),

    /// Input or worker could not be prepared; the record failed without
    /// running.
    PermanentFailure,

    /// The claim was taken away while the worker ran (e.g. an external
    /// cancel); the result was discarded.
    NotRunning(WorkState),

    Completed(WorkResultKind),
}

/// Outcome of `WorkRunner::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReport {
    /// The listener was told `(successful, needs_reschedule)`.
    Reported {
        successful: bool,
        needs_reschedule: bool,
        end: RunEnd,
    },

    /// `run` was called on a runner that had already run.
    AlreadyStarted,
}

impl RunReport {
    pub(crate) fn new(successful: bool, needs_reschedule: bool, end: RunEnd) -> Self {
        Self::Reported {
            successful,
            needs_reschedule,
            end,
        }
    }

    /// The `(successful, needs_reschedule)` pair handed to the listener.
    pub fn reported(&self) -> Option<(bool, bool)> {
        match *self {
            RunReport::Reported {
                successful,
                needs_reschedule,
                ..
            } => Some((successful, needs_reschedule)),
            RunReport::AlreadyStarted => None,
        }
    }

    pub fn end(&self) -> Option<RunEnd> {
        match *self {
            RunReport::Reported { end, .. } => Some(end),
            RunReport::AlreadyStarted => None,
        }
    }
}
