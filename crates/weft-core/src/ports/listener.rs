//! ExecutionListener port - 実行完了の通知先

use crate::domain::WorkId;

/// Receives the outcome of a run.
///
/// Called at most once per run, after the run's last transaction has
/// committed, on the delivery executor (never on the runner's own task).
pub trait ExecutionListener: Send + Sync {
    fn on_executed(&self, id: WorkId, successful: bool, needs_reschedule: bool);
}
