//! In-memory transactional work store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{DependencyGraph, WorkRecord};
use crate::domain::{Data, StoreError, WorkId, WorkState};
use crate::ports::{StoreTransaction, WorkStore};

/// Number of records per state, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub enqueued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

/// Everything the store holds. Cloned into a working copy per transaction.
#[derive(Debug, Clone, Default)]
struct StoreState {
    /// All work records (single source of truth).
    records: HashMap<WorkId, WorkRecord>,

    tags: HashMap<WorkId, Vec<String>>,

    graph: DependencyGraph,
}

impl StoreState {
    fn record_mut(&mut self, id: WorkId) -> Option<&mut WorkRecord> {
        self.records.get_mut(&id)
    }

    /// Apply `f` to the record if it exists; returns rows touched.
    fn update(&mut self, id: WorkId, f: impl FnOnce(&mut WorkRecord)) -> usize {
        match self.record_mut(id) {
            Some(record) => {
                f(record);
                1
            }
            None => 0,
        }
    }

    fn counts_by_state(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for record in self.records.values() {
            match record.state {
                WorkState::Enqueued => counts.enqueued += 1,
                WorkState::Running => counts.running += 1,
                WorkState::Succeeded => counts.succeeded += 1,
                WorkState::Failed => counts.failed += 1,
                WorkState::Blocked => counts.blocked += 1,
                WorkState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

/// Work store kept in process memory.
///
/// Transactions are fully serialised: `begin` takes the store lock and
/// holds it until the transaction is committed or dropped. Writes go to a
/// working copy that replaces the shared state only on commit.
///
/// Every `begin` clones the whole state, read-only transactions included, so
/// each transaction costs O(records). Meant for tests and as a reference
/// implementation of the store contract, not for production volumes.
#[derive(Clone)]
pub struct InMemoryWorkStore {
    state: Arc<Mutex<StoreState>>,

    /// Number of `begin` calls left before the store starts failing.
    begins_left: Arc<AtomicUsize>,
}

impl InMemoryWorkStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            begins_left: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Insert a new record as handed over by an enqueue API.
    pub async fn insert_work(&self, record: WorkRecord) -> Result<WorkId, StoreError> {
        let mut state = self.state.lock().await;
        let id = record.id;
        if state.records.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        state.records.insert(id, record);
        Ok(id)
    }

    /// Record that `dependent` waits for `prerequisite`.
    pub async fn insert_dependency(
        &self,
        dependent: WorkId,
        prerequisite: WorkId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for id in [dependent, prerequisite] {
            if !state.records.contains_key(&id) {
                return Err(StoreError::NotFound(id));
            }
        }
        match state.graph.add_dependency(dependent, prerequisite) {
            Some(cycle) => Err(StoreError::Cycle(cycle)),
            None => Ok(()),
        }
    }

    pub async fn insert_tag(&self, id: WorkId, tag: impl Into<String>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let tag = tag.into();
        let tags = state.tags.entry(id).or_default();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        Ok(())
    }

    /// Cancel a record that has not finished yet. Returns whether it changed.
    pub async fn cancel_work(&self, id: WorkId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(id).ok_or(StoreError::NotFound(id))?;
        if record.state.is_finished() {
            return Ok(false);
        }
        record.state = WorkState::Cancelled;
        Ok(true)
    }

    /// Remove a record and its edges and tags (external pruning).
    pub async fn delete_work(&self, id: WorkId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.records.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state.tags.remove(&id);
        for prerequisite in state.graph.prerequisites_of(id) {
            state.graph.remove_dependency(id, prerequisite);
        }
        for dependent in state.graph.dependents_of(id) {
            state.graph.remove_dependency(dependent, id);
        }
        Ok(())
    }

    pub async fn get_record(&self, id: WorkId) -> Option<WorkRecord> {
        self.state.lock().await.records.get(&id).cloned()
    }

    pub async fn get_state(&self, id: WorkId) -> Option<WorkState> {
        self.state.lock().await.records.get(&id).map(|r| r.state)
    }

    pub async fn get_output(&self, id: WorkId) -> Option<Data> {
        self.state
            .lock()
            .await
            .records
            .get(&id)
            .map(|r| r.output.clone())
    }

    /// Snapshot of every record in `state`, oldest id first.
    pub async fn records_in_state(&self, state: WorkState) -> Vec<WorkRecord> {
        let mut records: Vec<WorkRecord> = self
            .state
            .lock()
            .await
            .records
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub async fn counts_by_state(&self) -> StateCounts {
        self.state.lock().await.counts_by_state()
    }

    /// Make every `begin` after the next `n` fail with a backend error.
    pub fn fail_after_begins(&self, n: usize) {
        self.begins_left.store(n, Ordering::SeqCst);
    }

    fn take_begin_permit(&self) -> Result<(), StoreError> {
        self.begins_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                if left == usize::MAX {
                    Some(left)
                } else {
                    left.checked_sub(1)
                }
            })
            .map(|_| ())
            .map_err(|_| StoreError::Backend("store unavailable".to_string()))
    }
}

impl Default for InMemoryWorkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkStore for InMemoryWorkStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.take_begin_permit()?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }
}

/// Holds the store lock for its whole lifetime.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_record(&self, id: WorkId) -> Result<Option<WorkRecord>, StoreError> {
        Ok(self.working.records.get(&id).cloned())
    }

    async fn get_state(&self, id: WorkId) -> Result<Option<WorkState>, StoreError> {
        Ok(self.working.records.get(&id).map(|r| r.state))
    }

    async fn set_state(&mut self, state: WorkState, id: WorkId) -> Result<usize, StoreError> {
        Ok(self.working.update(id, |r| r.state = state))
    }

    async fn increment_run_attempt_count(&mut self, id: WorkId) -> Result<usize, StoreError> {
        Ok(self
            .working
            .update(id, |r| r.run_attempt_count = r.run_attempt_count.saturating_add(1)))
    }

    async fn reset_run_attempt_count(&mut self, id: WorkId) -> Result<usize, StoreError> {
        Ok(self.working.update(id, |r| r.run_attempt_count = 0))
    }

    async fn set_output(&mut self, id: WorkId, output: Data) -> Result<usize, StoreError> {
        Ok(self.working.update(id, |r| r.output = output))
    }

    async fn set_period_start_time(
        &mut self,
        id: WorkId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self.working.update(id, |r| r.period_start_time = at))
    }

    async fn mark_schedule_state(
        &mut self,
        id: WorkId,
        requested_at: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError> {
        Ok(self
            .working
            .update(id, |r| r.schedule_requested_at = requested_at))
    }

    async fn tags_for(&self, id: WorkId) -> Result<Vec<String>, StoreError> {
        Ok(self.working.tags.get(&id).cloned().unwrap_or_default())
    }

    async fn dependent_ids(&self, id: WorkId) -> Result<Vec<WorkId>, StoreError> {
        Ok(self.working.graph.dependents_of(id))
    }

    async fn prerequisite_ids(&self, id: WorkId) -> Result<Vec<WorkId>, StoreError> {
        Ok(self.working.graph.prerequisites_of(id))
    }

    async fn has_completed_all_prerequisites(&self, id: WorkId) -> Result<bool, StoreError> {
        Ok(self.working.graph.prerequisites_of(id).iter().all(|p| {
            self.working
                .records
                .get(p)
                .is_some_and(|r| r.state == WorkState::Succeeded)
        }))
    }

    async fn unfinished_work_ids(&self) -> Result<Vec<WorkId>, StoreError> {
        let mut ids: Vec<WorkId> = self
            .working
            .records
            .values()
            .filter(|r| !r.state.is_finished())
            .map(|r| r.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn prerequisite_outputs(&self, id: WorkId) -> Result<Vec<Data>, StoreError> {
        Ok(self
            .working
            .graph
            .prerequisites_of(id)
            .iter()
            .filter_map(|p| self.working.records.get(p))
            .filter(|r| r.state.is_finished())
            .map(|r| r.output.clone())
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
