//! App - アプリケーション層
//!
//! このモジュールは、ports と registry を組み合わせて実行環境を構築します。
//!
//! # 主要コンポーネント
//! - **ConfigurationBuilder**: Worker / Merger の登録、既定値の注入、起動時検証
//! - **Configuration**: 全 runner で共有される不変の設定

pub mod builder;

pub use self::builder::{Configuration, ConfigurationBuilder};
