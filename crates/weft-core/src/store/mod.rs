//! Store - WorkStore の実装と永続化モデル
//!
//! # 含まれるもの
//! - **record**: WorkRecord（作業レコード）
//! - **dependency**: DependencyGraph（前提 -> 依存、循環は挿入時に拒否）
//! - **memory**: InMemoryWorkStore（開発・テスト用のトランザクショナルストア）

pub mod dependency;
pub mod memory;
pub mod record;

pub use self::dependency::DependencyGraph;
pub use self::memory::{InMemoryWorkStore, StateCounts};
pub use self::record::WorkRecord;
