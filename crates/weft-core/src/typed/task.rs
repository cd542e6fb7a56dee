//! WorkInput trait - worker_type と入力型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const WORKER_TYPE`)
//! - Trait bounds の組み合わせ (DeserializeOwned + Send + Sync + 'static)

use serde::de::DeserializeOwned;

/// WorkInput は worker_type と入力型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct Resize {
///     width: u32,
/// }
///
/// impl WorkInput for Resize {
///     const WORKER_TYPE: &'static str = "media.resize.v1";
/// }
/// ```
///
/// The merged input `Data` is decoded into `Self` as a JSON object, so field
/// names are input keys.
pub trait WorkInput: DeserializeOwned + Send + Sync + 'static {
    /// 命名規約: `{domain}.{action}.v{major}`
    const WORKER_TYPE: &'static str;
}
