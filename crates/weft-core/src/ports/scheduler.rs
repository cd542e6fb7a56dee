//! Scheduler port - プラットフォーム側スケジューラとの接点
//!
//! - Scheduler: コミット後に「実行可能な作業があるかもしれない」と通知
//! - RescheduleTrigger: 再起動後の再開トリガーの有効/無効

/// A platform scheduler (timer service, OS job scheduler, ...).
///
/// Fired after every committed transition. Delivery is at-least-once, so
/// implementations must tolerate spurious calls.
pub trait Scheduler: Send + Sync {
    fn on_work_potentially_eligible(&self);
}

/// Standing "resume after reboot" trigger of the host platform.
pub trait RescheduleTrigger: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

/// Trigger for hosts that have nothing to resume.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRescheduleTrigger;

impl RescheduleTrigger for NoopRescheduleTrigger {
    fn set_enabled(&self, _enabled: bool) {}
}
