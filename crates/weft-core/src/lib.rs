//! weft-core
//!
//! Execution core of a persistent, dependency-aware job scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, data, outcome, extras, errors）
//! - **ports**: 抽象化レイヤー（WorkStore, Clock, DeliveryExecutor, ExecutionListener, Scheduler）
//! - **store**: WorkRecord, DependencyGraph, InMemoryWorkStore
//! - **merge**: InputMerger と MergerRegistry
//! - **typed**: 型付き Worker API（WorkInput, TypedWorker, WorkerRegistry）
//! - **app**: Configuration と ConfigurationBuilder
//! - **engine**: WorkRunner（claim → execute → 結果の反映）と依存解決
//! - **processor**: 実行中の runner の管理
//! - **impls**: 配送の実装（TokioDelivery, InlineDelivery）

pub mod app;
pub mod domain;
pub mod engine;
pub mod impls;
pub mod merge;
pub mod ports;
pub mod processor;
pub mod store;
pub mod typed;

pub use app::{Configuration, ConfigurationBuilder};
pub use domain::{Data, RuntimeExtras, WeftError, WorkId, WorkResult, WorkState};
pub use engine::{RunEnd, RunReport, WorkRunner};
pub use processor::Processor;
pub use store::{InMemoryWorkStore, WorkRecord};
pub use typed::{StopHandle, TypedWorker, WorkInput, Worker, WorkerParameters};
