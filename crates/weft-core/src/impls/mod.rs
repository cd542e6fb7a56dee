//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TokioDelivery**: 専用タスクでリスナー通知を配送
//! - **InlineDelivery**: 呼び出し元で即時実行（テスト用）
//!
//! WorkStore の実装は store モジュール（InMemoryWorkStore）にあります。

pub mod delivery;

pub use self::delivery::{InlineDelivery, TokioDelivery};
