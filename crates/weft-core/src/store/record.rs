//! Work record: the persisted state of one job instance.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Data, WorkId, WorkState};
use crate::merge::OVERWRITING;

/// Persisted state of a single work item.
///
/// Design:
/// - The store owns these; a runner only ever holds a snapshot for one run.
/// - All mutation goes through `StoreTransaction`, never through this struct
///   directly once it has been inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: WorkId,
    pub state: WorkState,

    /// Registry key of the worker that runs this record.
    pub worker_type: String,

    /// Registry key of the input merger (ignored for periodic work).
    pub input_merger: String,

    pub input: Data,

    /// Empty until the record reaches a terminal state.
    pub output: Data,

    /// `Duration::ZERO` for one-shot work.
    pub interval_duration: Duration,

    pub period_start_time: DateTime<Utc>,

    /// Incremented on every claim, reset on periodic completion.
    pub run_attempt_count: u32,

    /// Marker used by platform schedulers; `None` means not requested yet.
    pub schedule_requested_at: Option<DateTime<Utc>>,
}

impl WorkRecord {
    /// One-shot, enqueued record with an empty input.
    pub fn new(worker_type: impl Into<String>) -> Self {
        Self {
            id: WorkId::new(),
            state: WorkState::Enqueued,
            worker_type: worker_type.into(),
            input_merger: OVERWRITING.to_string(),
            input: Data::new(),
            output: Data::new(),
            interval_duration: Duration::ZERO,
            period_start_time: DateTime::<Utc>::UNIX_EPOCH,
            run_attempt_count: 0,
            schedule_requested_at: None,
        }
    }

    pub fn with_id(mut self, id: WorkId) -> Self {
        self.id = id;
        self
    }

    pub fn with_input(mut self, input: Data) -> Self {
        self.input = input;
        self
    }

    pub fn with_input_merger(mut self, name: impl Into<String>) -> Self {
        self.input_merger = name.into();
        self
    }

    pub fn with_state(mut self, state: WorkState) -> Self {
        self.state = state;
        self
    }

    /// Make this record recur every `interval`.
    pub fn periodic(mut self, interval: Duration) -> Self {
        self.interval_duration = interval;
        self
    }

    pub fn with_period_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.period_start_time = at;
        self
    }

    pub fn is_periodic(&self) -> bool {
        !self.interval_duration.is_zero()
    }

    /// Start of the next period; saturates instead of overflowing.
    pub fn next_period_start(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.interval_duration)
            .ok()
            .and_then(|delta| self.period_start_time.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_one_shot_and_enqueued() {
        let record = WorkRecord::new("hello");
        assert_eq!(record.state, WorkState::Enqueued);
        assert!(!record.is_periodic());
        assert_eq!(record.run_attempt_count, 0);
        assert_eq!(record.input_merger, OVERWRITING);
        assert!(record.output.is_empty());
    }

    #[test]
    fn next_period_start_adds_interval() {
        let record = WorkRecord::new("tick").periodic(Duration::from_secs(3600));
        assert!(record.is_periodic());
        assert_eq!(
            record.next_period_start(),
            DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(3600)
        );
    }

    #[test]
    fn next_period_start_saturates() {
        let record = WorkRecord::new("tick")
            .periodic(Duration::from_secs(u64::MAX))
            .with_period_start_time(Utc::now());
        assert_eq!(record.next_period_start(), DateTime::<Utc>::MAX_UTC);
    }
}
