//! Errors and their operational classification.

use thiserror::Error;

use super::WorkId;

/// How an error is handled operationally.
///
/// - Transient: handled by re-enqueueing, no escalation
/// - Permanent: the record fails (and its dependents with it), never retried
///   by the runner
/// - Infrastructure: the store or runtime itself is broken; the run aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Errors raised by a `WorkStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("work record not found: {0}")]
    NotFound(WorkId),

    #[error("work record already exists: {0}")]
    Duplicate(WorkId),

    #[error("dependency edge would create a cycle: {0:?}")]
    Cycle(Vec<WorkId>),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised while assembling the input of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("no input merger registered under '{0}'")]
    UnresolvableMerger(String),

    #[error("conflicting values for input key '{key}'")]
    Conflict { key: String },
}

/// Errors on the worker fault channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("no worker registered for worker_type={0}")]
    UnknownWorkerType(String),

    #[error("worker construction failed: {0}")]
    Construction(String),

    #[error("worker input could not be decoded: {0}")]
    Input(String),

    #[error("worker fault: {0}")]
    Fault(String),
}

impl WorkerError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

/// Errors raised when registering workers or mergers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Errors raised while building a configuration or a runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("missing required dependency: {0}")]
    MissingDependency(&'static str),

    #[error("missing worker types: {0:?}. These workers were expected but not registered.")]
    MissingWorkerTypes(Vec<String>),
}

/// Umbrella error for the crate.
#[derive(Debug, Error)]
pub enum WeftError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl WeftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WeftError::Store(_) => ErrorKind::Infrastructure,
            WeftError::Merge(_) | WeftError::Worker(_) => ErrorKind::Permanent,
            WeftError::Registry(_) | WeftError::Build(_) => ErrorKind::Permanent,
        }
    }
}
