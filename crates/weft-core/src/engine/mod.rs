//! Engine - 作業レコードの実行エンジン
//!
//! # 含まれるもの
//! - **runner**: WorkRunner（claim → execute → 結果の反映）
//! - **resolver**: 連鎖失敗と依存解放（トランザクション内で実行）
//! - **report**: RunReport（listener に伝えた内容と終了フェーズ）

pub mod builder;
pub mod report;
pub mod resolver;
pub mod runner;

#[cfg(test)]
mod tests;

pub use self::builder::WorkRunnerBuilder;
pub use self::report::{RunEnd, RunReport};
pub use self::resolver::{cascade_failure, unblock_ready};
pub use self::runner::{WorkRunner, describe_work};
