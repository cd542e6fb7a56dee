//! WorkStore port - 作業レコードの正本（source of truth）
//!
//! WorkStore は以下を管理します：
//! - 状態（WorkState, run_attempt_count, period_start_time）
//! - 入出力（input / output）
//! - 依存関係（prerequisite -> dependent）
//! - タグ（診断用）
//!
//! # 設計原則
//! - 状態遷移と依存解放・連鎖失敗は同一トランザクション内
//! - commit しないまま drop されたトランザクションは rollback される

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Data, StoreError, WorkId, WorkState};
use crate::store::WorkRecord;

/// Transactional, durable store of work records and dependency edges.
///
/// Implementations must serialise transactions that touch the same record:
/// two concurrent claims on one id can never both observe `Enqueued`.
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Begin a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// One atomic unit of reads and writes.
///
/// Write methods return the number of records they touched (0 when the id is
/// unknown), like an `UPDATE` statement would.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_record(&self, id: WorkId) -> Result<Option<WorkRecord>, StoreError>;

    async fn get_state(&self, id: WorkId) -> Result<Option<WorkState>, StoreError>;

    async fn set_state(&mut self, state: WorkState, id: WorkId) -> Result<usize, StoreError>;

    async fn increment_run_attempt_count(&mut self, id: WorkId) -> Result<usize, StoreError>;

    async fn reset_run_attempt_count(&mut self, id: WorkId) -> Result<usize, StoreError>;

    async fn set_output(&mut self, id: WorkId, output: Data) -> Result<usize, StoreError>;

    async fn set_period_start_time(
        &mut self,
        id: WorkId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Set or clear (`None`) the platform scheduling marker.
    async fn mark_schedule_state(
        &mut self,
        id: WorkId,
        requested_at: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError>;

    async fn tags_for(&self, id: WorkId) -> Result<Vec<String>, StoreError>;

    /// Records that list `id` as a prerequisite.
    async fn dependent_ids(&self, id: WorkId) -> Result<Vec<WorkId>, StoreError>;

    /// Records `id` depends on.
    async fn prerequisite_ids(&self, id: WorkId) -> Result<Vec<WorkId>, StoreError>;

    /// True when every prerequisite of `id` is `Succeeded` (vacuously true
    /// without prerequisites).
    async fn has_completed_all_prerequisites(&self, id: WorkId) -> Result<bool, StoreError>;

    /// Ids of all records that are not in a finished state.
    async fn unfinished_work_ids(&self) -> Result<Vec<WorkId>, StoreError>;

    /// Outputs of the finished prerequisites of `id`.
    ///
    /// The order is stable for a given store but not part of the contract.
    async fn prerequisite_outputs(&self, id: WorkId) -> Result<Vec<Data>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
