//! ConfigurationBuilder - 実行環境の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 既定値の注入（Clock, DeliveryExecutor, RescheduleTrigger）

use std::sync::Arc;

use crate::domain::{BuildError, RegistryError, WorkerError};
use crate::impls::{InlineDelivery, TokioDelivery};
use crate::merge::{InputMerger, MergerRegistry};
use crate::ports::{
    Clock, DeliveryExecutor, NoopRescheduleTrigger, RescheduleTrigger, SystemClock,
};
use crate::typed::{TypedWorker, WorkInput, Worker, WorkerRegistry};

/// Immutable bundle shared by every runner of a process.
#[derive(Clone)]
pub struct Configuration {
    workers: WorkerRegistry,
    mergers: MergerRegistry,
    clock: Arc<dyn Clock>,
    delivery: Arc<dyn DeliveryExecutor>,
    reschedule_trigger: Arc<dyn RescheduleTrigger>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub fn mergers(&self) -> &MergerRegistry {
        &self.mergers
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn delivery(&self) -> &Arc<dyn DeliveryExecutor> {
        &self.delivery
    }

    pub fn reschedule_trigger(&self) -> &Arc<dyn RescheduleTrigger> {
        &self.reschedule_trigger
    }
}

/// ConfigurationBuilder は Configuration を構築
///
/// # 使用例
/// ```ignore
/// let config = Configuration::builder()
///     .register::<Resize, _>(ResizeWorker)?
///     .expect_workers(&["media.resize.v1"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_workers() で期待される worker_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError::MissingWorkerTypes を返す
pub struct ConfigurationBuilder {
    workers: WorkerRegistry,
    mergers: MergerRegistry,
    expected_workers: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock>>,
    delivery: Option<Arc<dyn DeliveryExecutor>>,
    reschedule_trigger: Option<Arc<dyn RescheduleTrigger>>,
}

impl ConfigurationBuilder {
    /// 組み込みの merger だけが登録された builder
    pub fn new() -> Self {
        Self {
            workers: WorkerRegistry::new(),
            mergers: MergerRegistry::with_defaults(),
            expected_workers: None,
            clock: None,
            delivery: None,
            reschedule_trigger: None,
        }
    }

    /// 型付き Worker を登録
    pub fn register<T: WorkInput, W: TypedWorker<T> + 'static>(
        mut self,
        worker: W,
    ) -> Result<Self, RegistryError> {
        self.workers.register::<T, W>(worker)?;
        Ok(self)
    }

    pub fn register_worker(
        mut self,
        name: impl Into<String>,
        worker: impl Worker + 'static,
    ) -> Result<Self, RegistryError> {
        self.workers.register_worker(name, worker)?;
        Ok(self)
    }

    pub fn register_factory<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn() -> Result<Arc<dyn Worker>, WorkerError> + Send + Sync + 'static,
    {
        self.workers.register_factory(name, factory)?;
        Ok(self)
    }

    pub fn register_merger(
        mut self,
        name: impl Into<String>,
        merger: impl InputMerger + 'static,
    ) -> Result<Self, RegistryError> {
        self.mergers.register(name, merger)?;
        Ok(self)
    }

    /// 期待される worker_type のリストを設定
    pub fn expect_workers(mut self, worker_types: &[&str]) -> Self {
        self.expected_workers = Some(worker_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Share a clock the caller keeps a handle to (tests move it by hand).
    pub fn shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn delivery(mut self, delivery: impl DeliveryExecutor + 'static) -> Self {
        self.delivery = Some(Arc::new(delivery));
        self
    }

    pub fn reschedule_trigger(mut self, trigger: Arc<dyn RescheduleTrigger>) -> Self {
        self.reschedule_trigger = Some(trigger);
        self
    }

    /// Configuration を構築
    ///
    /// # 検証
    /// - expect_workers() で設定された worker_type が全て登録されているかチェック
    ///
    /// # 既定値
    /// - clock: SystemClock
    /// - delivery: tokio ランタイム内なら TokioDelivery、外なら InlineDelivery
    /// - reschedule_trigger: NoopRescheduleTrigger
    pub fn build(self) -> Result<Configuration, BuildError> {
        if let Some(expected) = &self.expected_workers {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.workers.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingWorkerTypes(missing));
            }
        }

        let delivery: Arc<dyn DeliveryExecutor> = match self.delivery {
            Some(delivery) => delivery,
            None if tokio::runtime::Handle::try_current().is_ok() => Arc::new(TokioDelivery::new()),
            None => Arc::new(InlineDelivery),
        };

        Ok(Configuration {
            workers: self.workers,
            mergers: self.mergers,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            delivery,
            reschedule_trigger: self
                .reschedule_trigger
                .unwrap_or_else(|| Arc::new(NoopRescheduleTrigger)),
        })
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
