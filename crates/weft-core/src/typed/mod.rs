//! Typed - 型付き Worker API
//!
//! このモジュールは worker_type の typo を型で排除し、
//! 入力型と Worker の対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `WorkInput` trait, `TypedWorker<T>` trait - 型安全
//! - **内部（Dyn）**: `Worker` trait - object-safe, runner が呼び出す
//!
//! 名前から Worker を作る処理は `WorkerRegistry` に集約され、
//! 未登録の名前は `WorkerError::UnknownWorkerType`（恒久的失敗）になります。

pub mod handler;
pub mod registry;
pub mod task;
pub mod worker;

pub use self::handler::{TypedWorker, TypedWorkerAdapter};
pub use self::registry::{WorkerFactory, WorkerRegistry};
pub use self::task::WorkInput;
pub use self::worker::{StopHandle, Worker, WorkerParameters};
