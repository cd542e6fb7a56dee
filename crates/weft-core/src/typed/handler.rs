//! TypedWorker trait - 型付き入力を受け取る Worker
//!
//! # 学習ポイント
//! - ジェネリック trait (TypedWorker<T>)
//! - Type erasure パターン (TypedWorkerAdapter<T, W> → dyn Worker)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::WorkInput;
use super::worker::{Worker, WorkerParameters};
use crate::domain::{WorkResult, WorkerError};

/// A worker that receives its merged input already decoded as `T`.
///
/// `TypedWorker<Resize>` can only ever be registered under
/// `Resize::WORKER_TYPE`.
#[async_trait]
pub trait TypedWorker<T: WorkInput>: Send + Sync {
    async fn work(&self, input: T, params: &WorkerParameters) -> Result<WorkResult, WorkerError>;
}

/// Erases `T` so typed workers fit into the registry.
pub struct TypedWorkerAdapter<T: WorkInput, W: TypedWorker<T>> {
    worker: W,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WorkInput, W: TypedWorker<T>> TypedWorkerAdapter<T, W> {
    pub fn new(worker: W) -> Self {
        Self {
            worker,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: WorkInput, W: TypedWorker<T>> Worker for TypedWorkerAdapter<T, W> {
    async fn start_work(&self, params: WorkerParameters) -> Result<WorkResult, WorkerError> {
        let input: T = serde_json::from_value(params.input.to_json())
            .map_err(|e| WorkerError::Input(format!("{}: {e}", T::WORKER_TYPE)))?;
        self.worker.work(input, &params).await
    }
}
