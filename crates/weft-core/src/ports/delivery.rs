//! DeliveryExecutor port - リスナー通知を実行するコンテキスト
//!
//! 通知は runner のタスクとは別のコンテキストで実行します。
//! 実装は impls::delivery を参照（TokioDelivery, InlineDelivery）。

/// A unit of notification work.
pub type DeliveryTask = Box<dyn FnOnce() + Send + 'static>;

/// Executes notification callbacks off the runner's task.
///
/// Tasks posted from one thread run in posting order. A failing task must not
/// affect later ones; nothing is retried.
pub trait DeliveryExecutor: Send + Sync {
    fn post(&self, task: DeliveryTask);
}
