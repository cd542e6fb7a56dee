use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::runner::WorkRunner;
use crate::app::Configuration;
use crate::domain::{BuildError, RuntimeExtras, WorkId};
use crate::ports::{ExecutionListener, Scheduler, WorkStore};
use crate::typed::{StopHandle, Worker};

/// Builder for a `WorkRunner`.
///
/// `configuration`, `store` and `work_id` are required; `build` fails fast
/// without them and never touches the store.
#[derive(Default)]
pub struct WorkRunnerBuilder {
    configuration: Option<Configuration>,
    store: Option<Arc<dyn WorkStore>>,
    work_id: Option<WorkId>,
    listener: Option<Arc<dyn ExecutionListener>>,
    schedulers: Vec<Arc<dyn Scheduler>>,
    runtime_extras: RuntimeExtras,
    worker: Option<Arc<dyn Worker>>,
}

impl WorkRunnerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn store(mut self, store: Arc<dyn WorkStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn work_id(mut self, id: WorkId) -> Self {
        self.work_id = Some(id);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.schedulers.push(scheduler);
        self
    }

    pub fn schedulers(mut self, schedulers: Vec<Arc<dyn Scheduler>>) -> Self {
        self.schedulers = schedulers;
        self
    }

    pub fn runtime_extras(mut self, extras: RuntimeExtras) -> Self {
        self.runtime_extras = extras;
        self
    }

    /// Use this worker instead of resolving the record's worker type.
    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn build(self) -> Result<WorkRunner, BuildError> {
        let config = self
            .configuration
            .ok_or(BuildError::MissingDependency("configuration"))?;
        let store = self.store.ok_or(BuildError::MissingDependency("store"))?;
        let id = self.work_id.ok_or(BuildError::MissingDependency("work_id"))?;

        Ok(WorkRunner {
            id,
            config,
            store,
            listener: self.listener,
            schedulers: self.schedulers,
            extras: self.runtime_extras,
            worker: self.worker,
            stop: StopHandle::new(),
            interrupted: AtomicBool::new(false),
            started: AtomicBool::new(false),
            resolved: AtomicBool::new(false),
        })
    }
}
