//! Worker trait - runner から呼び出される object-safe な payload
//!
//! # 学習ポイント
//! - `async_trait` による object-safe な非同期 trait
//! - CancellationToken による協調的な停止

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{Data, RuntimeExtras, WorkId, WorkResult, WorkerError};

/// The payload of a work record.
///
/// Returns one of the three results, or `Err` on the fault channel. A panic
/// inside `start_work` is treated like `Err` by the runner.
///
/// # 使用例
/// ```ignore
/// struct Upload;
///
/// #[async_trait]
/// impl Worker for Upload {
///     async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
///         Ok(WorkResult::success())
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError>;
}

/// Everything a worker gets for one run.
#[derive(Debug, Clone)]
pub struct WorkerParameters {
    pub id: WorkId,

    /// Merged input (own input plus prerequisite outputs).
    pub input: Data,

    pub tags: Vec<String>,

    /// Number of claims so far, this run included.
    pub run_attempt_count: u32,

    pub extras: RuntimeExtras,

    pub stop: StopHandle,
}

/// Cooperative stop signal for a running worker.
///
/// Cloning shares the signal. Once stopped it stays stopped.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
    cancelled: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. `cancelled` is sticky: once set it is never cleared.
    pub(crate) fn stop(&self, cancelled: bool) {
        if cancelled {
            self.cancelled.store(true, Ordering::SeqCst);
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// True when the stop came from a cancellation rather than a preemption
    /// that will be rescheduled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
