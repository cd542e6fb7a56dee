//! Processor - 実行中の runner を work id ごとに管理する
//!
//! - 同じ id の runner は同時に 1 つだけ
//! - stop / cancel は runner の interrupt(false / true) に変換
//! - runner の完了通知を受けて管理表から外し、登録済み listener へ転送

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::app::Configuration;
use crate::domain::{BuildError, RuntimeExtras, WorkId};
use crate::engine::WorkRunner;
use crate::ports::{ExecutionListener, Scheduler, WorkStore};

/// Front-end that starts, stops and tracks runners.
///
/// Must be used inside a tokio runtime; each run is a spawned task.
pub struct Processor {
    config: Configuration,
    store: Arc<dyn WorkStore>,
    schedulers: Vec<Arc<dyn Scheduler>>,
    running: Mutex<HashMap<WorkId, Arc<WorkRunner>>>,
    listeners: Mutex<Vec<Arc<dyn ExecutionListener>>>,
    idle: Notify,
    this: Weak<Processor>,
}

impl Processor {
    pub fn new(
        config: Configuration,
        store: Arc<dyn WorkStore>,
        schedulers: Vec<Arc<dyn Scheduler>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            store,
            schedulers,
            running: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            idle: Notify::new(),
            this: this.clone(),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ExecutionListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Start running `id`. Returns `false` if it is already in flight.
    pub fn start_work(&self, id: WorkId, extras: RuntimeExtras) -> Result<bool, BuildError> {
        let mut running = lock(&self.running);
        if running.contains_key(&id) {
            debug!(work_id = %id, "work is already being processed");
            return Ok(false);
        }

        let mut builder = WorkRunner::builder()
            .configuration(self.config.clone())
            .store(Arc::clone(&self.store))
            .work_id(id)
            .schedulers(self.schedulers.clone())
            .runtime_extras(extras);
        if let Some(this) = self.this.upgrade() {
            builder = builder.listener(this);
        }
        let runner = Arc::new(builder.build()?);
        running.insert(id, Arc::clone(&runner));
        drop(running);

        tokio::spawn(async move {
            if let Err(err) = runner.run().await {
                error!(work_id = %runner.work_id(), error = %err, "run aborted");
            }
        });
        info!(work_id = %id, "work started");
        Ok(true)
    }

    /// Preempt `id`; the outer scheduler will run it again.
    pub fn stop_work(&self, id: WorkId) -> bool {
        self.interrupt(id, false)
    }

    /// Stop `id` because it was cancelled.
    pub fn cancel_work(&self, id: WorkId) -> bool {
        self.interrupt(id, true)
    }

    fn interrupt(&self, id: WorkId, cancelled: bool) -> bool {
        let runner = lock(&self.running).get(&id).cloned();
        match runner {
            Some(runner) => {
                info!(work_id = %id, cancelled, "interrupting work");
                runner.interrupt(cancelled);
                true
            }
            None => {
                debug!(work_id = %id, "nothing to interrupt");
                false
            }
        }
    }

    /// Interrupt everything in flight (shutdown).
    pub fn stop_all(&self) {
        let runners: Vec<Arc<WorkRunner>> = lock(&self.running).values().cloned().collect();
        for runner in runners {
            runner.interrupt(false);
        }
    }

    pub fn is_enqueued(&self, id: WorkId) -> bool {
        lock(&self.running).contains_key(&id)
    }

    pub fn has_work(&self) -> bool {
        !lock(&self.running).is_empty()
    }

    /// Wait until no runner is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.has_work() {
                return;
            }
            notified.await;
        }
    }
}

impl ExecutionListener for Processor {
    fn on_executed(&self, id: WorkId, successful: bool, needs_reschedule: bool) {
        let now_idle = {
            let mut running = lock(&self.running);
            running.remove(&id);
            running.is_empty()
        };
        debug!(work_id = %id, successful, needs_reschedule, "work executed");

        let listeners: Vec<Arc<dyn ExecutionListener>> = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_executed(id, successful, needs_reschedule);
        }
        if now_idle {
            self.idle.notify_waiters();
        }
    }
}

// A poisoned map is still consistent: every update is a single insert/remove.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
