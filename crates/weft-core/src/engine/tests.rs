use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rstest::rstest;
use serde_json::json;
use tokio::sync::oneshot;

use super::*;
use crate::app::Configuration;
use crate::domain::{
    Data, RuntimeExtras, StoreError, WeftError, WorkId, WorkResult, WorkResultKind, WorkState,
    WorkerError,
};
use crate::impls::InlineDelivery;
use crate::merge::{ARRAY_CREATING, REJECTING};
use crate::ports::{
    Clock, ExecutionListener, FixedClock, RescheduleTrigger, Scheduler, StoreTransaction, WorkStore,
};
use crate::store::{InMemoryWorkStore, WorkRecord};
use crate::typed::{Worker, WorkerParameters};

#[derive(Default)]
struct RecordingListener {
    calls: Mutex<Vec<(WorkId, bool, bool)>>,
}

impl RecordingListener {
    fn calls(&self) -> Vec<(WorkId, bool, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ExecutionListener for RecordingListener {
    fn on_executed(&self, id: WorkId, successful: bool, needs_reschedule: bool) {
        self.calls
            .lock()
            .unwrap()
            .push((id, successful, needs_reschedule));
    }
}

#[derive(Default)]
struct CountingScheduler {
    calls: AtomicUsize,
}

impl CountingScheduler {
    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Scheduler for CountingScheduler {
    fn on_work_potentially_eligible(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingTrigger {
    calls: Mutex<Vec<bool>>,
}

impl RescheduleTrigger for RecordingTrigger {
    fn set_enabled(&self, enabled: bool) {
        self.calls.lock().unwrap().push(enabled);
    }
}

/// Returns a fixed result and remembers what it was given.
struct ScriptedWorker {
    result: WorkResult,
    seen: Mutex<Vec<WorkerParameters>>,
}

impl ScriptedWorker {
    fn new(result: WorkResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last(&self) -> WorkerParameters {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        self.seen.lock().unwrap().push(params);
        Ok(self.result.clone())
    }
}

struct FaultyWorker;

#[async_trait]
impl Worker for FaultyWorker {
    async fn start_work(&self, _params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        Err(WorkerError::fault("disk on fire"))
    }
}

struct PanickingWorker;

#[async_trait]
impl Worker for PanickingWorker {
    async fn start_work(&self, _params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        panic!("worker bug");
    }
}

/// Blocks until stopped, then reports whether the stop was a cancel.
struct WaitingWorker {
    started: Mutex<Option<oneshot::Sender<()>>>,
    finished: Mutex<Option<oneshot::Sender<bool>>>,
}

#[async_trait]
impl Worker for WaitingWorker {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        let started = self.started.lock().unwrap().take();
        if let Some(tx) = started {
            let _ = tx.send(());
        }
        params.stop.stopped().await;
        let finished = self.finished.lock().unwrap().take();
        if let Some(tx) = finished {
            let _ = tx.send(params.stop.was_cancelled());
        }
        Ok(WorkResult::Retry)
    }
}

/// Ignores the stop signal and finishes on its own schedule.
#[derive(Default)]
struct StubbornWorker {
    started: Mutex<Option<oneshot::Sender<()>>>,
    finished: AtomicBool,
}

#[async_trait]
impl Worker for StubbornWorker {
    async fn start_work(&self, _params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        let started = self.started.lock().unwrap().take();
        if let Some(tx) = started {
            let _ = tx.send(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(WorkResult::success())
    }
}

/// Fails exactly one `begin` (1-based) and delegates the rest.
struct FlakyStore {
    inner: InMemoryWorkStore,
    fail_on: usize,
    begins: AtomicUsize,
}

#[async_trait]
impl WorkStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let n = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.begin().await
    }
}

/// Cancels its own record through the store while running.
struct SelfCancellingWorker {
    store: InMemoryWorkStore,
}

#[async_trait]
impl Worker for SelfCancellingWorker {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        self.store
            .cancel_work(params.id)
            .await
            .map_err(|e| WorkerError::fault(e.to_string()))?;
        Ok(WorkResult::Success(Data::new().with("y", 1)))
    }
}

struct Harness {
    store: InMemoryWorkStore,
    config: Configuration,
    clock: Arc<FixedClock>,
    listener: Arc<RecordingListener>,
    scheduler: Arc<CountingScheduler>,
    trigger: Arc<RecordingTrigger>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::at_millis(100_000));
        let trigger = Arc::new(RecordingTrigger::default());
        let config = Configuration::builder()
            .shared_clock(clock.clone())
            .delivery(InlineDelivery)
            .reschedule_trigger(trigger.clone())
            .build()
            .unwrap();
        Self {
            store: InMemoryWorkStore::new(),
            config,
            clock,
            listener: Arc::new(RecordingListener::default()),
            scheduler: Arc::new(CountingScheduler::default()),
            trigger,
        }
    }

    fn builder(&self, id: WorkId) -> WorkRunnerBuilder {
        WorkRunner::builder()
            .configuration(self.config.clone())
            .store(Arc::new(self.store.clone()))
            .work_id(id)
            .listener(self.listener.clone())
            .scheduler(self.scheduler.clone())
    }

    fn runner(&self, id: WorkId, worker: Arc<dyn Worker>) -> WorkRunner {
        self.builder(id).worker(worker).build().unwrap()
    }

    async fn insert(&self, record: WorkRecord) -> WorkId {
        self.store.insert_work(record).await.unwrap()
    }

    async fn record(&self, id: WorkId) -> WorkRecord {
        self.store.get_record(id).await.unwrap()
    }

    fn trigger_calls(&self) -> Vec<bool> {
        self.trigger.calls.lock().unwrap().clone()
    }
}

fn blocked(name: &str) -> WorkRecord {
    WorkRecord::new(name).with_state(WorkState::Blocked)
}

fn epoch_plus(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(seconds)
}

#[tokio::test]
async fn one_shot_success_persists_output() {
    let h = Harness::new();
    let a = h
        .insert(WorkRecord::new("a").with_input(Data::new().with("x", 1)))
        .await;
    let worker = ScriptedWorker::new(WorkResult::Success(Data::new().with("y", 2)));

    let report = h.runner(a, worker.clone()).run().await.unwrap();

    assert_eq!(
        report,
        RunReport::new(true, false, RunEnd::Completed(WorkResultKind::Success))
    );
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Succeeded);
    assert_eq!(record.output, Data::new().with("y", 2));
    assert_eq!(record.run_attempt_count, 1);
    assert_eq!(worker.last().input.get_as::<i64>("x"), Some(1));
    assert_eq!(h.listener.calls(), vec![(a, true, false)]);
    assert_eq!(h.scheduler.count(), 1);
}

#[tokio::test]
async fn success_unblocks_and_failure_cascades_down_the_chain() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let b = h
        .insert(blocked("b").with_input(Data::new().with("own", true)))
        .await;
    let c = h.insert(blocked("c")).await;
    h.store.insert_dependency(b, a).await.unwrap();
    h.store.insert_dependency(c, b).await.unwrap();
    h.clock.advance(TimeDelta::seconds(5));

    let succeed = ScriptedWorker::new(WorkResult::Success(Data::new().with("from", "a")));
    h.runner(a, succeed).run().await.unwrap();

    let record_b = h.record(b).await;
    assert_eq!(record_b.state, WorkState::Enqueued);
    assert_eq!(record_b.period_start_time, h.clock.now());
    assert_eq!(h.record(c).await.state, WorkState::Blocked);

    let fail = ScriptedWorker::new(WorkResult::failure());
    let report = h.runner(b, fail.clone()).run().await.unwrap();
    assert_eq!(report.reported(), Some((false, false)));

    let input = fail.last().input;
    assert_eq!(input.get_as::<bool>("own"), Some(true));
    assert_eq!(input.get_as::<String>("from").as_deref(), Some("a"));

    assert_eq!(h.record(a).await.state, WorkState::Succeeded);
    assert_eq!(h.record(b).await.state, WorkState::Failed);
    assert_eq!(h.record(c).await.state, WorkState::Failed);
    assert_eq!(h.listener.calls(), vec![(a, true, false), (b, false, false)]);
}

#[tokio::test]
async fn cascade_never_overwrites_cancelled() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let b = h.insert(blocked("b")).await;
    let c = h.insert(blocked("c")).await;
    h.store.insert_dependency(b, a).await.unwrap();
    h.store.insert_dependency(c, b).await.unwrap();
    h.store.cancel_work(b).await.unwrap();

    let failing = ScriptedWorker::new(WorkResult::Failure(Some(Data::new().with("reason", "bad"))));
    h.runner(a, failing).run().await.unwrap();

    let record_a = h.record(a).await;
    assert_eq!(record_a.state, WorkState::Failed);
    assert_eq!(record_a.output.get_as::<String>("reason").as_deref(), Some("bad"));
    assert_eq!(h.record(b).await.state, WorkState::Cancelled);
    assert_eq!(h.record(c).await.state, WorkState::Failed);
}

#[rstest]
#[case(WorkResult::Success(Data::new().with("y", 2)), true)]
#[case(WorkResult::failure(), false)]
#[tokio::test]
async fn periodic_work_is_never_terminal(#[case] result: WorkResult, #[case] successful: bool) {
    let h = Harness::new();
    let mut periodic = WorkRecord::new("tick").periodic(Duration::from_secs(3600));
    periodic.schedule_requested_at = Some(h.clock.now());
    let id = h.insert(periodic).await;

    let report = h.runner(id, ScriptedWorker::new(result)).run().await.unwrap();

    assert_eq!(report.reported(), Some((successful, false)));
    let record = h.record(id).await;
    assert_eq!(record.state, WorkState::Enqueued);
    assert_eq!(record.period_start_time, epoch_plus(3600));
    assert_eq!(record.run_attempt_count, 0);
    assert_eq!(record.schedule_requested_at, None);
    assert!(record.output.is_empty());
}

#[tokio::test]
async fn periodic_work_uses_own_input_without_merging() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a").with_state(WorkState::Succeeded)).await;
    let tick = h
        .insert(
            WorkRecord::new("tick")
                .periodic(Duration::from_secs(60))
                .with_input_merger("no.such.merger")
                .with_input(Data::new().with("n", 7)),
        )
        .await;
    h.store.insert_dependency(tick, a).await.unwrap();

    let worker = ScriptedWorker::new(WorkResult::success());
    h.runner(tick, worker.clone()).run().await.unwrap();

    assert_eq!(worker.last().input, Data::new().with("n", 7));
}

#[tokio::test]
async fn interrupt_before_claim_skips_the_worker() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = ScriptedWorker::new(WorkResult::success());

    let runner = h.runner(a, worker.clone());
    runner.interrupt(true);
    let report = runner.run().await.unwrap();

    assert_eq!(
        report,
        RunReport::new(false, true, RunEnd::Interrupted(WorkState::Enqueued))
    );
    assert_eq!(worker.calls(), 0);
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Enqueued);
    assert_eq!(record.run_attempt_count, 0);
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[tokio::test]
async fn unresolvable_merger_fails_without_running() {
    let h = Harness::new();
    let a = h
        .insert(WorkRecord::new("a").with_input_merger("com.example.NoSuchMerger"))
        .await;
    let d = h.insert(blocked("d")).await;
    h.store.insert_dependency(d, a).await.unwrap();
    let worker = ScriptedWorker::new(WorkResult::success());

    let report = h.runner(a, worker.clone()).run().await.unwrap();

    assert_eq!(report, RunReport::new(false, false, RunEnd::PermanentFailure));
    assert_eq!(worker.calls(), 0);
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Failed);
    assert_eq!(record.run_attempt_count, 0);
    assert_eq!(h.record(d).await.state, WorkState::Failed);
    assert_eq!(h.listener.calls(), vec![(a, false, false)]);
    assert_eq!(h.scheduler.count(), 1);
}

#[tokio::test]
async fn unknown_worker_type_fails_permanently() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("nobody.registered.this")).await;

    let report = h.builder(a).build().unwrap().run().await.unwrap();

    assert_eq!(report.end(), Some(RunEnd::PermanentFailure));
    assert_eq!(h.record(a).await.state, WorkState::Failed);
}

#[rstest]
#[case(WorkState::Succeeded, true, false)]
#[case(WorkState::Failed, false, false)]
#[case(WorkState::Cancelled, false, false)]
#[case(WorkState::Running, false, true)]
#[case(WorkState::Blocked, false, true)]
#[tokio::test]
async fn non_enqueued_record_is_left_alone(
    #[case] state: WorkState,
    #[case] successful: bool,
    #[case] needs_reschedule: bool,
) {
    let h = Harness::new();
    let id = h.insert(WorkRecord::new("a").with_state(state)).await;
    let before = h.record(id).await;
    let worker = ScriptedWorker::new(WorkResult::success());

    let report = h.runner(id, worker.clone()).run().await.unwrap();

    assert_eq!(
        report,
        RunReport::new(successful, needs_reschedule, RunEnd::NotEnqueued(state))
    );
    assert_eq!(worker.calls(), 0);
    assert_eq!(h.record(id).await, before);
    assert_eq!(h.listener.calls(), vec![(id, successful, needs_reschedule)]);
}

#[tokio::test]
async fn absent_record_is_a_benign_completion() {
    let h = Harness::new();
    let id = WorkId::new();
    let report = h
        .runner(id, ScriptedWorker::new(WorkResult::success()))
        .run()
        .await
        .unwrap();

    assert_eq!(report, RunReport::new(false, false, RunEnd::Absent));
    assert_eq!(h.listener.calls(), vec![(id, false, false)]);
}

#[tokio::test]
async fn retry_requeues_with_fresh_period_start_and_keeps_marker() {
    let h = Harness::new();
    let mut record = WorkRecord::new("a");
    record.schedule_requested_at = Some(epoch_plus(1));
    let a = h.insert(record).await;
    h.clock.advance(TimeDelta::seconds(30));

    let report = h
        .runner(a, ScriptedWorker::new(WorkResult::Retry))
        .run()
        .await
        .unwrap();

    assert_eq!(
        report,
        RunReport::new(false, true, RunEnd::Completed(WorkResultKind::Retry))
    );
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Enqueued);
    assert_eq!(record.period_start_time, h.clock.now());
    assert_eq!(record.schedule_requested_at, Some(epoch_plus(1)));
    assert_eq!(record.run_attempt_count, 1);
    assert_eq!(h.scheduler.count(), 1);
}

#[tokio::test]
async fn retried_work_counts_attempts() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    for _ in 0..2 {
        h.runner(a, ScriptedWorker::new(WorkResult::Retry))
            .run()
            .await
            .unwrap();
    }
    let worker = ScriptedWorker::new(WorkResult::success());
    h.runner(a, worker.clone()).run().await.unwrap();

    assert_eq!(worker.last().run_attempt_count, 3);
    assert_eq!(h.record(a).await.run_attempt_count, 3);
}

#[tokio::test]
async fn dependent_waits_for_all_prerequisites() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let b = h.insert(WorkRecord::new("b")).await;
    let d = h.insert(blocked("d")).await;
    h.store.insert_dependency(d, a).await.unwrap();
    h.store.insert_dependency(d, b).await.unwrap();

    h.runner(a, ScriptedWorker::new(WorkResult::success()))
        .run()
        .await
        .unwrap();
    assert_eq!(h.record(d).await.state, WorkState::Blocked);

    h.runner(b, ScriptedWorker::new(WorkResult::success()))
        .run()
        .await
        .unwrap();
    assert_eq!(h.record(d).await.state, WorkState::Enqueued);
}

#[tokio::test]
async fn array_creating_merger_collects_prerequisite_outputs() {
    let h = Harness::new();
    let mut a = WorkRecord::new("a").with_state(WorkState::Succeeded);
    a.output = Data::new().with("k", 1);
    let mut b = WorkRecord::new("b").with_state(WorkState::Succeeded);
    b.output = Data::new().with("k", 2);
    let a = h.insert(a).await;
    let b = h.insert(b).await;
    let d = h
        .insert(
            WorkRecord::new("d")
                .with_input_merger(ARRAY_CREATING)
                .with_input(Data::new().with("k", 0)),
        )
        .await;
    h.store.insert_dependency(d, a).await.unwrap();
    h.store.insert_dependency(d, b).await.unwrap();

    let worker = ScriptedWorker::new(WorkResult::success());
    h.runner(d, worker.clone()).run().await.unwrap();

    assert_eq!(worker.last().input.get("k"), Some(&json!([0, 1, 2])));
}

#[tokio::test]
async fn tags_and_extras_reach_the_worker() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    h.store.insert_tag(a, "nightly").await.unwrap();
    let worker = ScriptedWorker::new(WorkResult::success());

    h.builder(a)
        .worker(worker.clone())
        .runtime_extras(RuntimeExtras::new().with_network("wifi"))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let params = worker.last();
    assert_eq!(params.id, a);
    assert_eq!(params.tags, vec!["nightly".to_string()]);
    assert_eq!(params.extras.network.as_deref(), Some("wifi"));
    assert_eq!(params.run_attempt_count, 1);
    assert!(!params.stop.is_stopped());
}

#[rstest]
#[case::fault(Arc::new(FaultyWorker) as Arc<dyn Worker>)]
#[case::panic(Arc::new(PanickingWorker) as Arc<dyn Worker>)]
#[tokio::test]
async fn worker_faults_become_failures(#[case] worker: Arc<dyn Worker>) {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let d = h.insert(blocked("d")).await;
    h.store.insert_dependency(d, a).await.unwrap();

    let report = h.runner(a, worker).run().await.unwrap();

    assert_eq!(
        report,
        RunReport::new(false, false, RunEnd::Completed(WorkResultKind::Failure))
    );
    assert_eq!(h.record(a).await.state, WorkState::Failed);
    assert_eq!(h.record(d).await.state, WorkState::Failed);
}

#[tokio::test]
async fn interrupt_while_running_stops_the_worker() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let (started_tx, started_rx) = oneshot::channel();
    let (finished_tx, finished_rx) = oneshot::channel();
    let worker = Arc::new(WaitingWorker {
        started: Mutex::new(Some(started_tx)),
        finished: Mutex::new(Some(finished_tx)),
    });

    let runner = Arc::new(h.runner(a, worker));
    let task = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.run().await }
    });
    started_rx.await.unwrap();
    runner.interrupt(false);

    let report = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        report,
        RunReport::new(false, true, RunEnd::Interrupted(WorkState::Running))
    );
    let was_cancelled = tokio::time::timeout(Duration::from_secs(1), finished_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(!was_cancelled);

    // stored state is untouched by the interrupt
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Running);
    assert_eq!(record.run_attempt_count, 1);
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[tokio::test]
async fn interrupt_waits_for_a_worker_that_ignores_the_stop() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let (started_tx, started_rx) = oneshot::channel();
    let worker = Arc::new(StubbornWorker {
        started: Mutex::new(Some(started_tx)),
        ..Default::default()
    });

    let runner = Arc::new(h.runner(a, worker.clone()));
    let task = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.run().await }
    });
    started_rx.await.unwrap();
    runner.interrupt(false);

    let report = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(worker.finished.load(Ordering::SeqCst));
    assert_eq!(
        report,
        RunReport::new(false, true, RunEnd::Interrupted(WorkState::Running))
    );
    // the late success is not applied
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Running);
    assert!(record.output.is_empty());
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[tokio::test]
async fn concurrent_runners_claim_once() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = ScriptedWorker::new(WorkResult::success());
    let first = h.runner(a, worker.clone());
    let second = h.runner(a, worker.clone());

    let (r1, r2) = tokio::join!(first.run(), second.run());
    let ends = [r1.unwrap().end(), r2.unwrap().end()];

    assert_eq!(worker.calls(), 1);
    assert_eq!(
        ends.iter()
            .filter(|end| **end == Some(RunEnd::Completed(WorkResultKind::Success)))
            .count(),
        1
    );
    assert!(
        ends.iter()
            .any(|end| matches!(end, Some(RunEnd::NotEnqueued(_))))
    );
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Succeeded);
    assert_eq!(record.run_attempt_count, 1);
}

#[tokio::test]
async fn merge_conflict_fails_without_running() {
    let h = Harness::new();
    let mut a = WorkRecord::new("a").with_state(WorkState::Succeeded);
    a.output = Data::new().with("k", 1);
    let mut b = WorkRecord::new("b").with_state(WorkState::Succeeded);
    b.output = Data::new().with("k", 2);
    let a = h.insert(a).await;
    let b = h.insert(b).await;
    let d = h.insert(WorkRecord::new("d").with_input_merger(REJECTING)).await;
    let e = h.insert(blocked("e")).await;
    h.store.insert_dependency(d, a).await.unwrap();
    h.store.insert_dependency(d, b).await.unwrap();
    h.store.insert_dependency(e, d).await.unwrap();
    let worker = ScriptedWorker::new(WorkResult::success());

    let report = h.runner(d, worker.clone()).run().await.unwrap();

    assert_eq!(report, RunReport::new(false, false, RunEnd::PermanentFailure));
    assert_eq!(worker.calls(), 0);
    assert_eq!(h.record(d).await.state, WorkState::Failed);
    assert_eq!(h.record(e).await.state, WorkState::Failed);
    assert_eq!(h.record(a).await.state, WorkState::Succeeded);
    assert_eq!(h.listener.calls(), vec![(d, false, false)]);
}

#[tokio::test]
async fn claim_lost_during_execution_drops_the_result() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = Arc::new(SelfCancellingWorker {
        store: h.store.clone(),
    });

    let report = h.runner(a, worker).run().await.unwrap();

    assert_eq!(
        report,
        RunReport::new(false, false, RunEnd::NotRunning(WorkState::Cancelled))
    );
    let record = h.record(a).await;
    assert_eq!(record.state, WorkState::Cancelled);
    assert!(record.output.is_empty());
    assert_eq!(h.scheduler.count(), 1);
}

#[tokio::test]
async fn runner_runs_at_most_once() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = ScriptedWorker::new(WorkResult::Retry);
    let runner = h.runner(a, worker.clone());

    runner.run().await.unwrap();
    let second = runner.run().await.unwrap();

    assert_eq!(second, RunReport::AlreadyStarted);
    assert_eq!(worker.calls(), 1);
    assert_eq!(h.listener.calls().len(), 1);
}

#[tokio::test]
async fn trigger_is_disabled_once_nothing_is_left() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let b = h.insert(WorkRecord::new("b")).await;

    h.runner(a, ScriptedWorker::new(WorkResult::success()))
        .run()
        .await
        .unwrap();
    assert!(h.trigger_calls().is_empty());

    h.runner(b, ScriptedWorker::new(WorkResult::success()))
        .run()
        .await
        .unwrap();
    assert_eq!(h.trigger_calls(), vec![false]);
}

#[tokio::test]
async fn store_failure_aborts_and_still_notifies() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = ScriptedWorker::new(WorkResult::success());
    h.store.fail_after_begins(0);

    let err = h.runner(a, worker.clone()).run().await.unwrap_err();

    assert!(matches!(err, WeftError::Store(StoreError::Backend(_))));
    assert_eq!(worker.calls(), 0);
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[tokio::test]
async fn store_failure_after_execution_keeps_the_claim() {
    let h = Harness::new();
    let a = h.insert(WorkRecord::new("a")).await;
    let worker = ScriptedWorker::new(WorkResult::success());
    // claim check, prerequisite read and claim succeed; result write fails
    h.store.fail_after_begins(3);

    let result = h.runner(a, worker.clone()).run().await;

    assert!(result.is_err());
    assert_eq!(worker.calls(), 1);
    assert_eq!(h.record(a).await.state, WorkState::Running);
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[tokio::test]
async fn transient_store_failure_still_checks_for_unfinished_work() {
    let h = Harness::new();
    let a = h
        .insert(WorkRecord::new("a").with_state(WorkState::Succeeded))
        .await;
    let store = Arc::new(FlakyStore {
        inner: h.store.clone(),
        fail_on: 1,
        begins: AtomicUsize::new(0),
    });
    let worker = ScriptedWorker::new(WorkResult::success());
    let runner = h.builder(a).store(store).worker(worker.clone()).build().unwrap();

    let err = runner.run().await.unwrap_err();

    assert!(matches!(err, WeftError::Store(StoreError::Backend(_))));
    assert_eq!(worker.calls(), 0);
    assert_eq!(h.trigger_calls(), vec![false]);
    assert_eq!(h.listener.calls(), vec![(a, false, true)]);
}

#[test]
fn work_description_lists_tags() {
    let id = WorkId::new();
    assert_eq!(
        describe_work(id, &["nightly".to_string(), "sync".to_string()]),
        format!("Work [ id={id}, tags={{ nightly, sync }} ]")
    );
    assert_eq!(describe_work(id, &[]), format!("Work [ id={id}, tags={{  }} ]"));
}
