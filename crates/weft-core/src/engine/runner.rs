//! WorkRunner - 1 件の作業レコードを最後まで実行する
//!
//! # フェーズ
//! 1. Claim check (tx A): レコードが ENQUEUED か確認
//! 2. Input assembly: merger で入力を合成、Worker を生成
//! 3. Claim (tx B): ENQUEUED -> RUNNING, run_attempt_count + 1
//! 4. Execute: Worker を別タスクで実行（停止シグナル付き）
//! 5. Result interpretation (tx C): 結果に応じて状態遷移、依存解放・連鎖失敗
//!
//! listener と scheduler への通知は必ずコミット後に行います。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, instrument, warn};

use super::builder::WorkRunnerBuilder;
use super::report::{RunEnd, RunReport};
use super::resolver::{cascade_failure, unblock_ready};
use crate::app::Configuration;
use crate::domain::{
    Data, RuntimeExtras, StoreError, WeftError, WorkId, WorkResult, WorkResultKind, WorkState,
};
use crate::ports::{ExecutionListener, Scheduler, StoreTransaction, WorkStore};
use crate::store::WorkRecord;
use crate::typed::{StopHandle, Worker, WorkerParameters};

/// Runs one work record through claim, execution and result handling.
///
/// A runner runs at most once. `interrupt` may be called from any task at
/// any time.
pub struct WorkRunner {
    pub(super) id: WorkId,
    pub(super) config: Configuration,
    pub(super) store: Arc<dyn WorkStore>,
    pub(super) listener: Option<Arc<dyn ExecutionListener>>,
    pub(super) schedulers: Vec<Arc<dyn Scheduler>>,
    pub(super) extras: RuntimeExtras,
    pub(super) worker: Option<Arc<dyn Worker>>,
    pub(super) stop: StopHandle,
    pub(super) interrupted: AtomicBool,
    pub(super) started: AtomicBool,

    /// First-completion latch: the listener hears about a run once.
    pub(super) resolved: AtomicBool,
}

/// Either keep going with a phase's product, or stop with a report.
enum Step<T> {
    Continue(T),
    Done(RunReport),
}

impl WorkRunner {
    pub fn builder() -> WorkRunnerBuilder {
        WorkRunnerBuilder::new()
    }

    pub fn work_id(&self) -> WorkId {
        self.id
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Ask the run to stop. `cancelled` tells the worker the work was
    /// cancelled rather than preempted. Never touches the store.
    pub fn interrupt(&self, cancelled: bool) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.stop.stop(cancelled);
        debug!(work_id = %self.id, cancelled, "interrupt requested");
    }

    /// Run the record once.
    ///
    /// Returns `Err` only for store failures; the listener is still told
    /// `(false, true)` in that case.
    #[instrument(name = "work_run", skip(self), fields(work_id = %self.id))]
    pub async fn run(&self) -> Result<RunReport, WeftError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("runner already started; ignoring second run");
            return Ok(RunReport::AlreadyStarted);
        }

        match self.execute().await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(error = %err, "store failure, aborting run");
                self.notify_listener(false, true).await;
                Err(err.into())
            }
        }
    }

    async fn execute(&self) -> Result<RunReport, StoreError> {
        let (record, tags) = match self.check_claimable().await? {
            Step::Continue(found) => found,
            Step::Done(report) => return Ok(report),
        };

        let (input, worker) = match self.assemble(&record).await? {
            Step::Continue(assembled) => assembled,
            Step::Done(report) => return Ok(report),
        };

        let run_attempt_count = match self.claim().await? {
            Step::Continue(count) => count,
            Step::Done(report) => return Ok(report),
        };

        let description = describe_work(self.id, &tags);
        info!(work = %description, attempt = run_attempt_count, "starting work");

        let params = WorkerParameters {
            id: self.id,
            input,
            tags,
            run_attempt_count,
            extras: self.extras.clone(),
            stop: self.stop.clone(),
        };

        let result = self.execute_worker(worker, params).await;
        let report = if self.is_interrupted() {
            self.resolve_interrupted().await?
        } else {
            self.interpret(result).await?
        };
        self.notify_schedulers();
        Ok(report)
    }

    /// Phase 1: the record must exist and be ENQUEUED.
    async fn check_claimable(&self) -> Result<Step<(WorkRecord, Vec<String>)>, StoreError> {
        if self.is_interrupted() {
            return self.resolve_interrupted().await.map(Step::Done);
        }

        let tx = self.store.begin().await?;
        let Some(record) = tx.get_record(self.id).await? else {
            tx.commit().await?;
            warn!("work record not found, nothing to run");
            return Ok(Step::Done(self.resolve(false, false, RunEnd::Absent).await));
        };
        if record.state != WorkState::Enqueued {
            tx.commit().await?;
            debug!(state = %record.state, "record is not enqueued, skipping");
            let state = record.state;
            return Ok(Step::Done(
                self.resolve_observed(state, RunEnd::NotEnqueued(state)).await,
            ));
        }
        let tags = tx.tags_for(self.id).await?;
        tx.commit().await?;
        Ok(Step::Continue((record, tags)))
    }

    /// Phase 2: merge the input and construct the worker, outside any
    /// transaction except a short read of prerequisite outputs.
    async fn assemble(&self, record: &WorkRecord) -> Result<Step<(Data, Arc<dyn Worker>)>, StoreError> {
        let input = if record.is_periodic() {
            record.input.clone()
        } else {
            let merger = match self.config.mergers().resolve(&record.input_merger) {
                Ok(merger) => merger,
                Err(err) => return self.fail_permanently(err.into()).await.map(Step::Done),
            };

            let tx = self.store.begin().await?;
            let mut inputs = vec![record.input.clone()];
            inputs.extend(tx.prerequisite_outputs(self.id).await?);
            tx.commit().await?;

            match merger.merge(&inputs) {
                Ok(merged) => merged,
                Err(err) => return self.fail_permanently(err.into()).await.map(Step::Done),
            }
        };

        let worker = match &self.worker {
            Some(worker) => Arc::clone(worker),
            None => match self.config.workers().create(&record.worker_type) {
                Ok(worker) => worker,
                Err(err) => return self.fail_permanently(err.into()).await.map(Step::Done),
            },
        };
        Ok(Step::Continue((input, worker)))
    }

    /// Phase 3: ENQUEUED -> RUNNING. Returns the new attempt count.
    async fn claim(&self) -> Result<Step<u32>, StoreError> {
        if self.is_interrupted() {
            return self.resolve_interrupted().await.map(Step::Done);
        }

        let mut tx = self.store.begin().await?;
        match tx.get_state(self.id).await? {
            Some(WorkState::Enqueued) => {}
            Some(state) => {
                tx.commit().await?;
                debug!(%state, "claim lost to another runner");
                return Ok(Step::Done(
                    self.resolve_observed(state, RunEnd::NotEnqueued(state)).await,
                ));
            }
            None => {
                tx.commit().await?;
                return Ok(Step::Done(self.resolve(false, false, RunEnd::Absent).await));
            }
        }
        tx.set_state(WorkState::Running, self.id).await?;
        tx.increment_run_attempt_count(self.id).await?;
        let attempt = tx
            .get_record(self.id)
            .await?
            .map(|r| r.run_attempt_count)
            .unwrap_or_default();
        tx.commit().await?;

        if self.is_interrupted() {
            return self.resolve_interrupted().await.map(Step::Done);
        }
        Ok(Step::Continue(attempt))
    }

    /// Phase 4. Returns only once the worker task has ended, even when a
    /// stop was requested while it ran.
    async fn execute_worker(&self, worker: Arc<dyn Worker>, params: WorkerParameters) -> WorkResult {
        let mut handle = tokio::spawn(async move { worker.start_work(params).await });

        let joined = tokio::select! {
            joined = &mut handle => joined,
            _ = self.stop.stopped() => {
                debug!("stop requested, waiting for the worker to return");
                handle.await
            }
        };
        match joined {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(error = %err, "worker returned a fault, treating as failure");
                WorkResult::failure()
            }
            Err(err) => {
                error!(error = %err, "worker task did not complete, treating as failure");
                WorkResult::failure()
            }
        }
    }

    /// Phase 5: apply the result in one transaction.
    async fn interpret(&self, result: WorkResult) -> Result<RunReport, StoreError> {
        let kind = result.kind();
        let mut tx = self.store.begin().await?;

        let record = match tx.get_record(self.id).await? {
            Some(record) if record.state == WorkState::Running => record,
            Some(record) => {
                tx.commit().await?;
                warn!(state = %record.state, "record left RUNNING while the worker ran, dropping result");
                let state = record.state;
                return Ok(self.resolve_observed(state, RunEnd::NotRunning(state)).await);
            }
            None => {
                tx.commit().await?;
                warn!("record vanished while the worker ran");
                return Ok(self.resolve(false, false, RunEnd::Absent).await);
            }
        };
        let now = self.config.clock().now();
        let (successful, needs_reschedule) = match result {
            WorkResult::Success(_) | WorkResult::Failure(_) if record.is_periodic() => {
                reset_periodic(&mut *tx, &record).await?;
                (kind == WorkResultKind::Success, false)
            }
            WorkResult::Success(output) => {
                tx.set_state(WorkState::Succeeded, self.id).await?;
                tx.set_output(self.id, output).await?;
                let unblocked = unblock_ready(&mut *tx, self.id, now).await?;
                debug!(unblocked = unblocked.len(), "dependents released");
                (true, false)
            }
            WorkResult::Retry => {
                tx.set_state(WorkState::Enqueued, self.id).await?;
                tx.set_period_start_time(self.id, now).await?;
                (false, true)
            }
            WorkResult::Failure(output) => {
                let failed = cascade_failure(&mut *tx, self.id).await?;
                if let Some(output) = output {
                    tx.set_output(self.id, output).await?;
                }
                debug!(failed = failed.len(), "failure cascaded");
                (false, false)
            }
        };
        tx.commit().await?;

        info!(result = ?kind, periodic = record.is_periodic(), "work finished");
        Ok(self
            .resolve(successful, needs_reschedule, RunEnd::Completed(kind))
            .await)
    }

    /// Fail the record (and its dependents) without running it.
    async fn fail_permanently(&self, cause: WeftError) -> Result<RunReport, StoreError> {
        error!(error = %cause, "cannot run work, failing it");

        let mut tx = self.store.begin().await?;
        let report = match tx.get_state(self.id).await? {
            Some(WorkState::Enqueued) => {
                let failed = cascade_failure(&mut *tx, self.id).await?;
                tx.commit().await?;
                debug!(failed = failed.len(), "failure cascaded");
                self.resolve(false, false, RunEnd::PermanentFailure).await
            }
            Some(state) => {
                tx.commit().await?;
                self.resolve_observed(state, RunEnd::NotEnqueued(state)).await
            }
            None => {
                tx.commit().await?;
                self.resolve(false, false, RunEnd::Absent).await
            }
        };
        self.notify_schedulers();
        Ok(report)
    }

    async fn resolve_interrupted(&self) -> Result<RunReport, StoreError> {
        let tx = self.store.begin().await?;
        let state = tx.get_state(self.id).await?;
        tx.commit().await?;

        info!(cancelled = self.stop.was_cancelled(), "work interrupted");
        Ok(match state {
            Some(state) => self.resolve_observed(state, RunEnd::Interrupted(state)).await,
            None => self.resolve(false, false, RunEnd::Absent).await,
        })
    }

    /// Report a state observed without changing it.
    async fn resolve_observed(&self, state: WorkState, end: RunEnd) -> RunReport {
        self.resolve(state == WorkState::Succeeded, !state.is_finished(), end)
            .await
    }

    async fn resolve(&self, successful: bool, needs_reschedule: bool, end: RunEnd) -> RunReport {
        self.notify_listener(successful, needs_reschedule).await;
        RunReport::new(successful, needs_reschedule, end)
    }

    /// Tell the listener, after checking whether any work is left at all.
    /// Must not be called with a transaction open.
    async fn notify_listener(&self, successful: bool, needs_reschedule: bool) {
        match self.unfinished_work_count().await {
            Ok(0) => {
                debug!("no unfinished work left, disabling reschedule trigger");
                self.config.reschedule_trigger().set_enabled(false);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "could not check for unfinished work"),
        }
        self.post_listener(successful, needs_reschedule);
    }

    async fn unfinished_work_count(&self) -> Result<usize, StoreError> {
        let tx = self.store.begin().await?;
        let ids = tx.unfinished_work_ids().await?;
        tx.commit().await?;
        Ok(ids.len())
    }

    fn post_listener(&self, successful: bool, needs_reschedule: bool) {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("listener already notified for this run");
            return;
        }
        let Some(listener) = self.listener.clone() else {
            return;
        };
        let id = self.id;
        self.config.delivery().post(Box::new(move || {
            listener.on_executed(id, successful, needs_reschedule)
        }));
    }

    fn notify_schedulers(&self) {
        for scheduler in &self.schedulers {
            scheduler.on_work_potentially_eligible();
        }
    }
}

/// Rewrite a finished periodic record for its next period.
async fn reset_periodic(tx: &mut dyn StoreTransaction, record: &WorkRecord) -> Result<(), StoreError> {
    tx.set_period_start_time(record.id, record.next_period_start())
        .await?;
    tx.reset_run_attempt_count(record.id).await?;
    tx.mark_schedule_state(record.id, None).await?;
    tx.set_state(WorkState::Enqueued, record.id).await?;
    Ok(())
}

/// `Work [ id=work-…, tags={ a, b } ]`, for log lines.
pub fn describe_work(id: WorkId, tags: &[String]) -> String {
    format!("Work [ id={id}, tags={{ {} }} ]", tags.join(", "))
}
