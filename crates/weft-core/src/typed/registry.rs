//! WorkerRegistry - Worker の登録と生成
//!
//! # 学習ポイント
//! - HashMap での型消去されたファクトリの管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{TypedWorker, TypedWorkerAdapter};
use super::task::WorkInput;
use super::worker::Worker;
use crate::domain::{RegistryError, WorkerError};

/// Builds a worker instance for one run.
pub type WorkerFactory = Arc<dyn Fn() -> Result<Arc<dyn Worker>, WorkerError> + Send + Sync>;

/// WorkerRegistry は worker_type ごとのファクトリを管理
///
/// # 使用例
/// ```ignore
/// let mut registry = WorkerRegistry::new();
/// registry.register::<Resize, _>(ResizeWorker)?;
///
/// let worker = registry.create("media.resize.v1")?;
/// ```
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    factories: HashMap<String, WorkerFactory>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed worker under `T::WORKER_TYPE`; every run shares it.
    pub fn register<T: WorkInput, W: TypedWorker<T> + 'static>(
        &mut self,
        worker: W,
    ) -> Result<(), RegistryError> {
        let worker: Arc<dyn Worker> = Arc::new(TypedWorkerAdapter::new(worker));
        self.insert(T::WORKER_TYPE.to_string(), Arc::new(move || Ok(Arc::clone(&worker))))
    }

    /// Register an untyped worker instance under `name`.
    pub fn register_worker(
        &mut self,
        name: impl Into<String>,
        worker: impl Worker + 'static,
    ) -> Result<(), RegistryError> {
        let worker: Arc<dyn Worker> = Arc::new(worker);
        self.insert(name.into(), Arc::new(move || Ok(Arc::clone(&worker))))
    }

    /// Register a factory that builds a fresh worker per run and may fail.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Result<Arc<dyn Worker>, WorkerError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(factory))
    }

    fn insert(&mut self, name: String, factory: WorkerFactory) -> Result<(), RegistryError> {
        if self.factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Construct the worker for `worker_type`.
    pub fn create(&self, worker_type: &str) -> Result<Arc<dyn Worker>, WorkerError> {
        let factory = self
            .factories
            .get(worker_type)
            .ok_or_else(|| WorkerError::UnknownWorkerType(worker_type.to_string()))?;
        factory()
    }

    pub fn contains(&self, worker_type: &str) -> bool {
        self.factories.contains_key(worker_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}
