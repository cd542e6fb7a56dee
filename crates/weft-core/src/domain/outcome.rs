//! Outcome model: what a worker reports when it finishes.
//!
//! The result is a closed tri-state. Unexpected faults (a worker returning
//! `Err`, or panicking) travel on a separate channel and are folded into
//! `Failure` by the runner.

use serde::{Deserialize, Serialize};

use super::Data;

/// Classification of a finished run, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkResultKind {
    Success,
    Retry,
    Failure,
}

/// Result of one worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "output", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkResult {
    /// Work is done; the output is persisted for dependents.
    Success(Data),

    /// Try again later; the external scheduler decides when.
    Retry,

    /// Permanent failure; dependents fail with it.
    Failure(Option<Data>),
}

impl WorkResult {
    pub fn success() -> Self {
        Self::Success(Data::new())
    }

    pub fn failure() -> Self {
        Self::Failure(None)
    }

    pub fn kind(&self) -> WorkResultKind {
        match self {
            WorkResult::Success(_) => WorkResultKind::Success,
            WorkResult::Retry => WorkResultKind::Retry,
            WorkResult::Failure(_) => WorkResultKind::Failure,
        }
    }

    /// Output to persist, if the worker produced one.
    pub fn output(&self) -> Option<&Data> {
        match self {
            WorkResult::Success(data) => Some(data),
            WorkResult::Failure(data) => data.as_ref(),
            WorkResult::Retry => None,
        }
    }
}
