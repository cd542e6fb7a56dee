//! Ports - 抽象化レイヤー
//!
//! このモジュールは runner が外部に要求するインターフェースを定義します。
//! 各 trait の実装は store（InMemoryWorkStore）や impls に置きます。
//!
//! # 設計原則
//! - WorkStore が source of truth（正本）
//! - 通知（listener / scheduler）はコミット後、別コンテキストで行う

pub mod clock;
pub mod delivery;
pub mod listener;
pub mod scheduler;
pub mod work_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery::{DeliveryExecutor, DeliveryTask};
pub use self::listener::ExecutionListener;
pub use self::scheduler::{NoopRescheduleTrigger, RescheduleTrigger, Scheduler};
pub use self::work_store::{StoreTransaction, WorkStore};
